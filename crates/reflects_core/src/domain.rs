//! crates/reflects_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Accounts
//=========================================================================================

/// The two roles a user account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a stored or submitted tag does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub email: String,
    pub hashed_password: String,
    pub role: Role,
}

/// The identity resolved from a valid auth session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }
}

//=========================================================================================
// Curriculum hierarchy: Subject -> Chapter -> Reflection -> Feedback
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub obsolete: bool,
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
    pub obsolete: bool,
}

/// A student's video reflection on one chapter.
#[derive(Debug, Clone)]
pub struct Reflection {
    pub id: i64,
    pub chapter_id: i64,
    pub user_id: i64,
    pub video_ref: String,
    pub text_summary: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub obsolete: bool,
}

/// The teacher's verdict on a reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackStatus {
    Understood,
    NeedsReview,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Understood => "understood",
            FeedbackStatus::NeedsReview => "needs_review",
        }
    }
}

impl FromStr for FeedbackStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "understood" => Ok(FeedbackStatus::Understood),
            "needs_review" => Ok(FeedbackStatus::NeedsReview),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// At most one per reflection.
#[derive(Debug, Clone)]
pub struct Feedback {
    pub id: i64,
    pub reflection_id: i64,
    pub teacher_id: i64,
    pub status: FeedbackStatus,
    pub comment: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub obsolete: bool,
}

//=========================================================================================
// Read models
//=========================================================================================

/// Obsolete flags of a row and of every ancestor above it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lineage {
    pub own: bool,
    pub chapter: bool,
    pub subject: bool,
}

impl Lineage {
    /// A row is live only when neither it nor any ancestor is obsolete.
    pub fn is_live(&self) -> bool {
        !(self.own || self.chapter || self.subject)
    }
}

/// A reflection as shown to the student who submitted it.
#[derive(Debug, Clone)]
pub struct StudentReflection {
    pub id: i64,
    pub chapter_id: i64,
    pub chapter_name: String,
    pub video_ref: String,
    pub text_summary: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// A reflection as shown in the teacher's audit listing, which keeps obsolete rows.
#[derive(Debug, Clone)]
pub struct ReflectionAudit {
    pub id: i64,
    pub student_email: String,
    pub chapter_id: i64,
    pub video_ref: String,
    pub text_summary: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub lineage: Lineage,
    pub feedback_status: Option<FeedbackStatus>,
    pub feedback_comment: Option<String>,
}

/// A feedback row joined with the reflection and student it belongs to.
#[derive(Debug, Clone)]
pub struct FeedbackView {
    pub feedback_id: i64,
    pub student_email: String,
    pub chapter_id: i64,
    pub video_ref: String,
    pub status: FeedbackStatus,
    pub comment: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReflectionFilter {
    pub chapter_id: Option<i64>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub email: Option<String>,
    pub chapter_id: Option<i64>,
    pub status: Option<FeedbackStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_is_live_only_without_obsolete_ancestors() {
        assert!(Lineage::default().is_live());
        assert!(!Lineage { own: true, ..Default::default() }.is_live());
        assert!(!Lineage { chapter: true, ..Default::default() }.is_live());
        assert!(!Lineage { subject: true, ..Default::default() }.is_live());
    }

    #[test]
    fn status_and_role_tags_parse() {
        assert_eq!("needs_review".parse::<FeedbackStatus>(), Ok(FeedbackStatus::NeedsReview));
        assert_eq!("teacher".parse::<Role>(), Ok(Role::Teacher));
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(FeedbackStatus::Understood.as_str(), "understood");
    }
}
