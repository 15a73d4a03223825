//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Inserts under the curriculum hierarchy take `FOR SHARE` locks on the live
//! ancestors they attach to, so a concurrent cascade either sees the new row or
//! makes the insert find no live parent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reflects_core::cascade::{CascadePlan, CascadeStep};
use reflects_core::domain::{
    AuthUser, Chapter, Feedback, FeedbackFilter, FeedbackStatus, FeedbackView, Lineage,
    Reflection, ReflectionAudit, ReflectionFilter, Role, StudentReflection, Subject, User,
    UserCredentials,
};
use reflects_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps driver errors onto the port taxonomy. Connection-level failures are
/// reported as `Unavailable` so callers can tell them apart from bad requests.
fn port_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => PortError::Unavailable(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn violated_constraint(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|db| db.constraint())
        .map(str::to_string)
}

fn parse_role(raw: &str) -> PortResult<Role> {
    raw.parse::<Role>()
        .map_err(|e| PortError::Unexpected(format!("stored role: {}", e)))
}

fn parse_status(raw: &str) -> PortResult<FeedbackStatus> {
    raw.parse::<FeedbackStatus>()
        .map_err(|e| PortError::Unexpected(format!("stored feedback status: {}", e)))
}

/// The single UPDATE statement for one cascade step and the id it binds.
fn cascade_statement(step: &CascadeStep) -> (&'static str, i64) {
    match *step {
        CascadeStep::Subject { subject_id } => (
            "UPDATE subjects SET obsolete = TRUE WHERE id = $1 AND NOT obsolete",
            subject_id,
        ),
        CascadeStep::ChaptersOfSubject { subject_id } => (
            "UPDATE chapters SET obsolete = TRUE WHERE subject_id = $1 AND NOT obsolete",
            subject_id,
        ),
        CascadeStep::ReflectionsOfSubject { subject_id } => (
            "UPDATE reflections SET obsolete = TRUE
             WHERE NOT obsolete
               AND chapter_id IN (SELECT id FROM chapters WHERE subject_id = $1)",
            subject_id,
        ),
        CascadeStep::FeedbackOfSubject { subject_id } => (
            "UPDATE feedback SET obsolete = TRUE
             WHERE NOT obsolete
               AND reflection_id IN (
                   SELECT r.id FROM reflections r
                   JOIN chapters c ON c.id = r.chapter_id
                   WHERE c.subject_id = $1
               )",
            subject_id,
        ),
        CascadeStep::Chapter { chapter_id } => (
            "UPDATE chapters SET obsolete = TRUE WHERE id = $1 AND NOT obsolete",
            chapter_id,
        ),
        CascadeStep::ReflectionsOfChapter { chapter_id } => (
            "UPDATE reflections SET obsolete = TRUE WHERE chapter_id = $1 AND NOT obsolete",
            chapter_id,
        ),
        CascadeStep::FeedbackOfChapter { chapter_id } => (
            "UPDATE feedback SET obsolete = TRUE
             WHERE NOT obsolete
               AND reflection_id IN (SELECT id FROM reflections WHERE chapter_id = $1)",
            chapter_id,
        ),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    name: String,
    email: String,
    role: String,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: parse_role(&self.role)?,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: i64,
    email: String,
    hashed_password: String,
    role: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> PortResult<UserCredentials> {
        Ok(UserCredentials {
            id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
            role: parse_role(&self.role)?,
        })
    }
}

#[derive(FromRow)]
struct AuthUserRecord {
    user_id: i64,
    role: String,
}

#[derive(FromRow)]
struct SubjectRecord {
    id: i64,
    name: String,
    obsolete: bool,
}
impl SubjectRecord {
    fn to_domain(self) -> Subject {
        Subject {
            id: self.id,
            name: self.name,
            obsolete: self.obsolete,
        }
    }
}

#[derive(FromRow)]
struct ChapterRecord {
    id: i64,
    subject_id: i64,
    name: String,
    obsolete: bool,
}
impl ChapterRecord {
    fn to_domain(self) -> Chapter {
        Chapter {
            id: self.id,
            subject_id: self.subject_id,
            name: self.name,
            obsolete: self.obsolete,
        }
    }
}

#[derive(FromRow)]
struct ReflectionRecord {
    id: i64,
    chapter_id: i64,
    user_id: i64,
    video_ref: String,
    text_summary: Option<String>,
    submitted_at: DateTime<Utc>,
    obsolete: bool,
}
impl ReflectionRecord {
    fn to_domain(self) -> Reflection {
        Reflection {
            id: self.id,
            chapter_id: self.chapter_id,
            user_id: self.user_id,
            video_ref: self.video_ref,
            text_summary: self.text_summary,
            submitted_at: self.submitted_at,
            obsolete: self.obsolete,
        }
    }
}

#[derive(FromRow)]
struct StudentReflectionRecord {
    id: i64,
    chapter_id: i64,
    chapter_name: String,
    video_ref: String,
    text_summary: Option<String>,
    submitted_at: DateTime<Utc>,
}
impl StudentReflectionRecord {
    fn to_domain(self) -> StudentReflection {
        StudentReflection {
            id: self.id,
            chapter_id: self.chapter_id,
            chapter_name: self.chapter_name,
            video_ref: self.video_ref,
            text_summary: self.text_summary,
            submitted_at: self.submitted_at,
        }
    }
}

#[derive(FromRow)]
struct ReflectionAuditRecord {
    id: i64,
    student_email: String,
    chapter_id: i64,
    video_ref: String,
    text_summary: Option<String>,
    submitted_at: DateTime<Utc>,
    obsolete: bool,
    chapter_obsolete: bool,
    subject_obsolete: bool,
    feedback_status: Option<String>,
    feedback_comment: Option<String>,
}
impl ReflectionAuditRecord {
    fn to_domain(self) -> PortResult<ReflectionAudit> {
        let feedback_status = self.feedback_status.as_deref().map(parse_status).transpose()?;
        Ok(ReflectionAudit {
            id: self.id,
            student_email: self.student_email,
            chapter_id: self.chapter_id,
            video_ref: self.video_ref,
            text_summary: self.text_summary,
            submitted_at: self.submitted_at,
            lineage: Lineage {
                own: self.obsolete,
                chapter: self.chapter_obsolete,
                subject: self.subject_obsolete,
            },
            feedback_status,
            feedback_comment: self.feedback_comment,
        })
    }
}

#[derive(FromRow)]
struct FeedbackRecord {
    id: i64,
    reflection_id: i64,
    teacher_id: i64,
    status: String,
    comment: Option<String>,
    updated_at: DateTime<Utc>,
    obsolete: bool,
}
impl FeedbackRecord {
    fn to_domain(self) -> PortResult<Feedback> {
        Ok(Feedback {
            id: self.id,
            reflection_id: self.reflection_id,
            teacher_id: self.teacher_id,
            status: parse_status(&self.status)?,
            comment: self.comment,
            updated_at: self.updated_at,
            obsolete: self.obsolete,
        })
    }
}

#[derive(FromRow)]
struct FeedbackViewRecord {
    feedback_id: i64,
    student_email: String,
    chapter_id: i64,
    video_ref: String,
    status: String,
    comment: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}
impl FeedbackViewRecord {
    fn to_domain(self) -> PortResult<FeedbackView> {
        Ok(FeedbackView {
            feedback_id: self.feedback_id,
            student_email: self.student_email,
            chapter_id: self.chapter_id,
            video_ref: self.video_ref,
            status: parse_status(&self.status)?,
            comment: self.comment,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (name, email, password, role) VALUES ($1, $2, $3, $4)
             RETURNING id, name, email, role",
        )
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match violated_constraint(&e).as_deref() {
            Some("users_email_key") => PortError::Conflict(format!("Email {} is already registered", email)),
            _ => port_error(e),
        })?;

        record.to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password AS hashed_password, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;

        record.to_domain()
    }

    async fn get_user_by_id(&self, user_id: i64) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, role FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;

        record.to_domain()
    }

    async fn update_user(
        &self,
        user_id: i64,
        name: Option<&str>,
        hashed_password: Option<&str>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET name = COALESCE($1, name), password = COALESCE($2, password)
             WHERE id = $3",
        )
        .bind(name)
        .bind(hashed_password)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn list_student_emails(&self) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT email FROM users WHERE role = 'student' ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)
    }

    async fn delete_student(&self, email: &str) -> PortResult<Vec<String>> {
        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        let user_id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM users WHERE email = $1 AND role = 'student' FOR UPDATE",
        )
        .bind(email)
        .fetch_optional(&mut *tx)
        .await
        .map_err(port_error)?
        .ok_or_else(|| PortError::NotFound(format!("Student {} not found", email)))?;

        sqlx::query(
            "DELETE FROM feedback WHERE reflection_id IN (SELECT id FROM reflections WHERE user_id = $1)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(port_error)?;

        let video_refs = sqlx::query_scalar::<_, String>(
            "DELETE FROM reflections WHERE user_id = $1 RETURNING video_url",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(port_error)?;

        for statement in [
            "DELETE FROM auth_sessions WHERE user_id = $1",
            "DELETE FROM users WHERE id = $1",
        ] {
            sqlx::query(statement)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(port_error)?;
        }

        tx.commit().await.map_err(port_error)?;
        Ok(video_refs)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser> {
        let record = sqlx::query_as::<_, AuthUserRecord>(
            "SELECT u.id AS user_id, u.role
             FROM auth_sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        .ok_or(PortError::Unauthorized)?;

        Ok(AuthUser {
            user_id: record.user_id,
            role: parse_role(&record.role)?,
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn create_subject(&self, name: &str) -> PortResult<Subject> {
        let record = sqlx::query_as::<_, SubjectRecord>(
            "INSERT INTO subjects (name) VALUES ($1) RETURNING id, name, obsolete",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.to_domain())
    }

    async fn create_chapter(&self, subject_id: i64, name: &str) -> PortResult<Chapter> {
        let record = sqlx::query_as::<_, ChapterRecord>(
            "INSERT INTO chapters (subject_id, name)
             SELECT s.id, $2 FROM subjects s WHERE s.id = $1 AND NOT s.obsolete FOR SHARE
             RETURNING id, subject_id, name, obsolete",
        )
        .bind(subject_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        .ok_or_else(|| PortError::NotFound(format!("Subject {} not found", subject_id)))?;
        Ok(record.to_domain())
    }

    async fn list_subjects(&self) -> PortResult<Vec<Subject>> {
        let records = sqlx::query_as::<_, SubjectRecord>(
            "SELECT id, name, obsolete FROM subjects WHERE NOT obsolete ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_chapters(&self, subject_id: Option<i64>) -> PortResult<Vec<Chapter>> {
        let records = sqlx::query_as::<_, ChapterRecord>(
            "SELECT c.id, c.subject_id, c.name, c.obsolete
             FROM chapters c
             JOIN subjects s ON s.id = c.subject_id
             WHERE NOT c.obsolete AND NOT s.obsolete
               AND ($1::BIGINT IS NULL OR c.subject_id = $1)
             ORDER BY c.id",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn apply_cascade(&self, plan: &CascadePlan) -> PortResult<()> {
        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        for step in plan.steps() {
            let (statement, id) = cascade_statement(step);
            let result = sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(port_error)?;
            debug!(step = ?step, rows = result.rows_affected(), "Cascade step applied");
        }

        tx.commit().await.map_err(port_error)?;
        Ok(())
    }

    async fn create_reflection(
        &self,
        user_id: i64,
        chapter_id: i64,
        video_ref: &str,
        text_summary: Option<&str>,
    ) -> PortResult<Reflection> {
        let record = sqlx::query_as::<_, ReflectionRecord>(
            "INSERT INTO reflections (user_id, chapter_id, video_url, text_summary, submitted_at)
             SELECT $1, c.id, $3, $4, $5
             FROM chapters c
             JOIN subjects s ON s.id = c.subject_id
             WHERE c.id = $2 AND NOT c.obsolete AND NOT s.obsolete
             FOR SHARE OF c, s
             RETURNING id, chapter_id, user_id, video_url AS video_ref, text_summary,
                       submitted_at, obsolete",
        )
        .bind(user_id)
        .bind(chapter_id)
        .bind(video_ref)
        .bind(text_summary)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match violated_constraint(&e).as_deref() {
            Some("unique_user_chapter") => {
                PortError::Conflict(format!("Reflection for chapter {} already exists", chapter_id))
            }
            _ => port_error(e),
        })?
        .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found", chapter_id)))?;
        Ok(record.to_domain())
    }

    async fn list_reflections_for_user(&self, user_id: i64) -> PortResult<Vec<StudentReflection>> {
        let records = sqlx::query_as::<_, StudentReflectionRecord>(
            "SELECT r.id, r.chapter_id, c.name AS chapter_name, r.video_url AS video_ref,
                    r.text_summary, r.submitted_at
             FROM reflections r
             JOIN chapters c ON c.id = r.chapter_id
             JOIN subjects s ON s.id = c.subject_id
             WHERE r.user_id = $1 AND NOT r.obsolete AND NOT c.obsolete AND NOT s.obsolete
             ORDER BY r.submitted_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_all_reflections(
        &self,
        filter: &ReflectionFilter,
    ) -> PortResult<Vec<ReflectionAudit>> {
        let records = sqlx::query_as::<_, ReflectionAuditRecord>(
            "SELECT r.id, u.email AS student_email, r.chapter_id, r.video_url AS video_ref,
                    r.text_summary, r.submitted_at, r.obsolete,
                    c.obsolete AS chapter_obsolete, s.obsolete AS subject_obsolete,
                    f.status AS feedback_status, f.comment AS feedback_comment
             FROM reflections r
             JOIN users u ON u.id = r.user_id
             JOIN chapters c ON c.id = r.chapter_id
             JOIN subjects s ON s.id = c.subject_id
             LEFT JOIN feedback f ON f.reflection_id = r.id
             WHERE ($1::BIGINT IS NULL OR r.chapter_id = $1)
               AND ($2::TEXT IS NULL OR u.email = $2)
             ORDER BY r.submitted_at DESC",
        )
        .bind(filter.chapter_id)
        .bind(filter.email.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn upsert_feedback(
        &self,
        teacher_id: i64,
        reflection_id: i64,
        status: FeedbackStatus,
        comment: Option<&str>,
    ) -> PortResult<Feedback> {
        let record = sqlx::query_as::<_, FeedbackRecord>(
            "INSERT INTO feedback (reflection_id, teacher_id, status, comment, updated_at)
             SELECT r.id, $2, $3, $4, NOW()
             FROM reflections r
             JOIN chapters c ON c.id = r.chapter_id
             JOIN subjects s ON s.id = c.subject_id
             WHERE r.id = $1 AND NOT r.obsolete AND NOT c.obsolete AND NOT s.obsolete
             FOR SHARE OF r, c, s
             ON CONFLICT (reflection_id) DO UPDATE
             SET teacher_id = EXCLUDED.teacher_id,
                 status = EXCLUDED.status,
                 comment = EXCLUDED.comment,
                 updated_at = NOW()
             RETURNING id, reflection_id, teacher_id, status, comment, updated_at, obsolete",
        )
        .bind(reflection_id)
        .bind(teacher_id)
        .bind(status.as_str())
        .bind(comment)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        .ok_or_else(|| PortError::NotFound(format!("Reflection {} not found", reflection_id)))?;

        record.to_domain()
    }

    async fn list_feedback_for_teacher(
        &self,
        teacher_id: i64,
        filter: &FeedbackFilter,
    ) -> PortResult<Vec<FeedbackView>> {
        let records = sqlx::query_as::<_, FeedbackViewRecord>(
            "SELECT f.id AS feedback_id, u.email AS student_email, r.chapter_id,
                    r.video_url AS video_ref, f.status, f.comment, f.updated_at
             FROM feedback f
             JOIN reflections r ON r.id = f.reflection_id
             JOIN users u ON u.id = r.user_id
             JOIN chapters c ON c.id = r.chapter_id
             JOIN subjects s ON s.id = c.subject_id
             WHERE f.teacher_id = $1
               AND NOT f.obsolete AND NOT r.obsolete AND NOT c.obsolete AND NOT s.obsolete
               AND ($2::TEXT IS NULL OR u.email = $2)
               AND ($3::BIGINT IS NULL OR r.chapter_id = $3)
               AND ($4::TEXT IS NULL OR f.status = $4)
             ORDER BY f.updated_at DESC",
        )
        .bind(teacher_id)
        .bind(filter.email.as_deref())
        .bind(filter.chapter_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}
