//! crates/reflects_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or caches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cascade::CascadePlan;
use crate::domain::{
    AuthUser, Chapter, Feedback, FeedbackFilter, FeedbackStatus, FeedbackView, Reflection,
    ReflectionAudit, ReflectionFilter, Role, StudentReflection, Subject, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    /// The backing store could not be reached. Never a policy decision.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: i64) -> PortResult<User>;

    async fn update_user(
        &self,
        user_id: i64,
        name: Option<&str>,
        hashed_password: Option<&str>,
    ) -> PortResult<()>;

    async fn list_student_emails(&self) -> PortResult<Vec<String>>;

    /// Physically removes a student account together with its reflections, the
    /// feedback on them and its auth sessions, in one transaction. Returns the
    /// video refs of the removed reflections.
    async fn delete_student(&self, email: &str) -> PortResult<Vec<String>>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Curriculum ---
    async fn create_subject(&self, name: &str) -> PortResult<Subject>;

    /// Fails with `NotFound` when the subject is missing or obsolete.
    async fn create_chapter(&self, subject_id: i64, name: &str) -> PortResult<Chapter>;

    async fn list_subjects(&self) -> PortResult<Vec<Subject>>;

    async fn list_chapters(&self, subject_id: Option<i64>) -> PortResult<Vec<Chapter>>;

    /// Applies every step of the plan in a single transaction: all steps commit
    /// together or none do.
    async fn apply_cascade(&self, plan: &CascadePlan) -> PortResult<()>;

    // --- Reflections ---
    /// Fails with `NotFound` for a missing or obsolete chapter and with
    /// `Conflict` when the user already submitted for the chapter.
    async fn create_reflection(
        &self,
        user_id: i64,
        chapter_id: i64,
        video_ref: &str,
        text_summary: Option<&str>,
    ) -> PortResult<Reflection>;

    async fn list_reflections_for_user(&self, user_id: i64) -> PortResult<Vec<StudentReflection>>;

    async fn list_all_reflections(
        &self,
        filter: &ReflectionFilter,
    ) -> PortResult<Vec<ReflectionAudit>>;

    // --- Feedback ---
    /// Inserts or replaces the feedback of a live reflection.
    async fn upsert_feedback(
        &self,
        teacher_id: i64,
        reflection_id: i64,
        status: FeedbackStatus,
        comment: Option<&str>,
    ) -> PortResult<Feedback>;

    async fn list_feedback_for_teacher(
        &self,
        teacher_id: i64,
        filter: &FeedbackFilter,
    ) -> PortResult<Vec<FeedbackView>>;
}

/// Key-value counter primitives the rate limiter is built on.
///
/// Each method must be atomic on its own; adapters batch the commands of one
/// method into a single round-trip.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Reads a plain counter. Missing keys read as `None`.
    async fn get_count(&self, key: &str) -> PortResult<Option<u64>>;

    /// Increments a counter by one, (re)sets its expiry and returns the new value.
    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> PortResult<u64>;

    /// Drops every event scored strictly below `cutoff_millis` and returns how
    /// many remain.
    async fn trim_and_count(&self, key: &str, cutoff_millis: i64) -> PortResult<u64>;

    /// Records one event in the sorted set and (re)sets the set's expiry.
    async fn add_event(
        &self,
        key: &str,
        member: &str,
        score_millis: i64,
        ttl_secs: u64,
    ) -> PortResult<()>;
}

/// Blob storage for uploaded videos.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, object_name: &str, data: &[u8]) -> PortResult<()>;

    /// Removes an object. Missing objects are not an error.
    async fn delete(&self, object_name: &str) -> PortResult<()>;

    /// Resolves a stored object name to a URL a browser can fetch.
    fn url_for(&self, object_name: &str) -> String;
}
