//! Shared fixtures: an in-process `DatabaseService` and helpers that wire it
//! into an `AppState` without Postgres or Redis.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reflects_api::adapters::{InMemoryCounterStore, LocalObjectStore};
use reflects_api::config::{Config, CounterBackend, DatabaseConfig};
use reflects_api::web::state::AppState;
use reflects_core::cascade::{CascadePlan, CascadeStep, Obsolescence};
use reflects_core::domain::{
    AuthUser, Chapter, Feedback, FeedbackFilter, FeedbackStatus, FeedbackView, Lineage,
    Reflection, ReflectionAudit, ReflectionFilter, Role, StudentReflection, Subject, User,
    UserCredentials,
};
use reflects_core::ports::{CounterStore, DatabaseService, ObjectStore, PortError, PortResult};
use reflects_core::rate_limit::{RateLimitMode, RateLimiter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct UserRow {
    user: User,
    password: String,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<UserRow>,
    sessions: HashMap<String, (i64, DateTime<Utc>)>,
    subjects: Vec<Subject>,
    chapters: Vec<Chapter>,
    reflections: Vec<Reflection>,
    feedback: Vec<Feedback>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn chapter(&self, chapter_id: i64) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    fn subject(&self, subject_id: i64) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == subject_id)
    }

    fn reflection(&self, reflection_id: i64) -> Option<&Reflection> {
        self.reflections.iter().find(|r| r.id == reflection_id)
    }

    fn subject_of_chapter(&self, chapter_id: i64) -> Option<i64> {
        self.chapter(chapter_id).map(|c| c.subject_id)
    }

    fn chapter_is_live(&self, chapter_id: i64) -> bool {
        match self.chapter(chapter_id) {
            Some(c) => !c.obsolete && self.subject(c.subject_id).is_some_and(|s| !s.obsolete),
            None => false,
        }
    }

    fn lineage(&self, reflection: &Reflection) -> Lineage {
        let chapter = self.chapter(reflection.chapter_id);
        Lineage {
            own: reflection.obsolete,
            chapter: chapter.is_some_and(|c| c.obsolete),
            subject: chapter
                .and_then(|c| self.subject(c.subject_id))
                .is_some_and(|s| s.obsolete),
        }
    }

    fn email_of(&self, user_id: i64) -> String {
        self.users
            .iter()
            .find(|u| u.user.id == user_id)
            .map(|u| u.user.email.clone())
            .unwrap_or_default()
    }

    fn apply(&mut self, step: CascadeStep) {
        match step {
            CascadeStep::Subject { subject_id } => {
                for s in self.subjects.iter_mut().filter(|s| s.id == subject_id) {
                    s.obsolete = true;
                }
            }
            CascadeStep::ChaptersOfSubject { subject_id } => {
                for c in self.chapters.iter_mut().filter(|c| c.subject_id == subject_id) {
                    c.obsolete = true;
                }
            }
            CascadeStep::ReflectionsOfSubject { subject_id } => {
                let chapters: Vec<i64> = self
                    .chapters
                    .iter()
                    .filter(|c| c.subject_id == subject_id)
                    .map(|c| c.id)
                    .collect();
                for r in self
                    .reflections
                    .iter_mut()
                    .filter(|r| chapters.contains(&r.chapter_id))
                {
                    r.obsolete = true;
                }
            }
            CascadeStep::FeedbackOfSubject { subject_id } => {
                let reflections: Vec<i64> = self
                    .reflections
                    .iter()
                    .filter(|r| self.subject_of_chapter(r.chapter_id) == Some(subject_id))
                    .map(|r| r.id)
                    .collect();
                for f in self
                    .feedback
                    .iter_mut()
                    .filter(|f| reflections.contains(&f.reflection_id))
                {
                    f.obsolete = true;
                }
            }
            CascadeStep::Chapter { chapter_id } => {
                for c in self.chapters.iter_mut().filter(|c| c.id == chapter_id) {
                    c.obsolete = true;
                }
            }
            CascadeStep::ReflectionsOfChapter { chapter_id } => {
                for r in self
                    .reflections
                    .iter_mut()
                    .filter(|r| r.chapter_id == chapter_id)
                {
                    r.obsolete = true;
                }
            }
            CascadeStep::FeedbackOfChapter { chapter_id } => {
                let reflections: Vec<i64> = self
                    .reflections
                    .iter()
                    .filter(|r| r.chapter_id == chapter_id)
                    .map(|r| r.id)
                    .collect();
                for f in self
                    .feedback
                    .iter_mut()
                    .filter(|f| reflections.contains(&f.reflection_id))
                {
                    f.obsolete = true;
                }
            }
        }
    }
}

/// A `DatabaseService` backed by plain vectors behind one lock.
#[derive(Default)]
pub struct MemoryDb {
    tables: Mutex<Tables>,
    cascades: Mutex<Vec<CascadePlan>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans received by `apply_cascade`, in call order.
    pub fn cascades(&self) -> Vec<CascadePlan> {
        self.cascades.lock().unwrap().clone()
    }

    pub fn subject(&self, id: i64) -> Option<Subject> {
        self.tables.lock().unwrap().subject(id).cloned()
    }

    pub fn chapter(&self, id: i64) -> Option<Chapter> {
        self.tables.lock().unwrap().chapter(id).cloned()
    }

    pub fn reflection(&self, id: i64) -> Option<Reflection> {
        self.tables.lock().unwrap().reflection(id).cloned()
    }

    pub fn feedback_for(&self, reflection_id: i64) -> Option<Feedback> {
        self.tables
            .lock()
            .unwrap()
            .feedback
            .iter()
            .find(|f| f.reflection_id == reflection_id)
            .cloned()
    }

    pub fn reflection_count(&self) -> usize {
        self.tables.lock().unwrap().reflections.len()
    }
}

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User> {
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.user.email == email) {
            return Err(PortError::Conflict(format!("email {}", email)));
        }
        let user = User {
            id: t.next_id(),
            name: name.to_string(),
            email: email.to_string(),
            role,
        };
        t.users.push(UserRow {
            user: user.clone(),
            password: hashed_password.to_string(),
        });
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let t = self.tables.lock().unwrap();
        t.users
            .iter()
            .find(|u| u.user.email == email)
            .map(|u| UserCredentials {
                id: u.user.id,
                email: u.user.email.clone(),
                hashed_password: u.password.clone(),
                role: u.user.role,
            })
            .ok_or_else(|| PortError::NotFound(format!("user {}", email)))
    }

    async fn get_user_by_id(&self, user_id: i64) -> PortResult<User> {
        let t = self.tables.lock().unwrap();
        t.users
            .iter()
            .find(|u| u.user.id == user_id)
            .map(|u| u.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))
    }

    async fn update_user(
        &self,
        user_id: i64,
        name: Option<&str>,
        hashed_password: Option<&str>,
    ) -> PortResult<()> {
        let mut t = self.tables.lock().unwrap();
        let row = t
            .users
            .iter_mut()
            .find(|u| u.user.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        if let Some(name) = name {
            row.user.name = name.to_string();
        }
        if let Some(hash) = hashed_password {
            row.password = hash.to_string();
        }
        Ok(())
    }

    async fn list_student_emails(&self) -> PortResult<Vec<String>> {
        let t = self.tables.lock().unwrap();
        let mut emails: Vec<String> = t
            .users
            .iter()
            .filter(|u| u.user.role == Role::Student)
            .map(|u| u.user.email.clone())
            .collect();
        emails.sort();
        Ok(emails)
    }

    async fn delete_student(&self, email: &str) -> PortResult<Vec<String>> {
        let mut t = self.tables.lock().unwrap();
        let user_id = t
            .users
            .iter()
            .find(|u| u.user.email == email && u.user.role == Role::Student)
            .map(|u| u.user.id)
            .ok_or_else(|| PortError::NotFound(format!("student {}", email)))?;
        let owned: Vec<i64> = t
            .reflections
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.id)
            .collect();
        let video_refs: Vec<String> = t
            .reflections
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.video_ref.clone())
            .collect();
        t.feedback.retain(|f| !owned.contains(&f.reflection_id));
        t.reflections.retain(|r| r.user_id != user_id);
        t.sessions.retain(|_, (uid, _)| *uid != user_id);
        t.users.retain(|u| u.user.id != user_id);
        Ok(video_refs)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser> {
        let t = self.tables.lock().unwrap();
        let (user_id, expires_at) = t
            .sessions
            .get(session_id)
            .copied()
            .ok_or(PortError::Unauthorized)?;
        if expires_at <= Utc::now() {
            return Err(PortError::Unauthorized);
        }
        t.users
            .iter()
            .find(|u| u.user.id == user_id)
            .map(|u| AuthUser {
                user_id,
                role: u.user.role,
            })
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.lock().unwrap().sessions.remove(session_id);
        Ok(())
    }

    async fn create_subject(&self, name: &str) -> PortResult<Subject> {
        let mut t = self.tables.lock().unwrap();
        let subject = Subject {
            id: t.next_id(),
            name: name.to_string(),
            obsolete: false,
        };
        t.subjects.push(subject.clone());
        Ok(subject)
    }

    async fn create_chapter(&self, subject_id: i64, name: &str) -> PortResult<Chapter> {
        let mut t = self.tables.lock().unwrap();
        if !t.subject(subject_id).is_some_and(|s| !s.obsolete) {
            return Err(PortError::NotFound(format!("subject {}", subject_id)));
        }
        let chapter = Chapter {
            id: t.next_id(),
            subject_id,
            name: name.to_string(),
            obsolete: false,
        };
        t.chapters.push(chapter.clone());
        Ok(chapter)
    }

    async fn list_subjects(&self) -> PortResult<Vec<Subject>> {
        let t = self.tables.lock().unwrap();
        Ok(t.subjects.iter().filter(|s| !s.obsolete).cloned().collect())
    }

    async fn list_chapters(&self, subject_id: Option<i64>) -> PortResult<Vec<Chapter>> {
        let t = self.tables.lock().unwrap();
        Ok(t.chapters
            .iter()
            .filter(|c| t.chapter_is_live(c.id))
            .filter(|c| subject_id.map_or(true, |id| c.subject_id == id))
            .cloned()
            .collect())
    }

    async fn apply_cascade(&self, plan: &CascadePlan) -> PortResult<()> {
        let mut t = self.tables.lock().unwrap();
        for step in plan.steps() {
            t.apply(*step);
        }
        self.cascades.lock().unwrap().push(plan.clone());
        Ok(())
    }

    async fn create_reflection(
        &self,
        user_id: i64,
        chapter_id: i64,
        video_ref: &str,
        text_summary: Option<&str>,
    ) -> PortResult<Reflection> {
        let mut t = self.tables.lock().unwrap();
        if !t.chapter_is_live(chapter_id) {
            return Err(PortError::NotFound(format!("chapter {}", chapter_id)));
        }
        if t
            .reflections
            .iter()
            .any(|r| r.user_id == user_id && r.chapter_id == chapter_id)
        {
            return Err(PortError::Conflict("unique_user_chapter".to_string()));
        }
        // Spread submissions apart so newest-first ordering is deterministic.
        let submitted_at = Utc::now() + Duration::milliseconds(t.next_id);
        let reflection = Reflection {
            id: t.next_id(),
            chapter_id,
            user_id,
            video_ref: video_ref.to_string(),
            text_summary: text_summary.map(str::to_string),
            submitted_at,
            obsolete: false,
        };
        t.reflections.push(reflection.clone());
        Ok(reflection)
    }

    async fn list_reflections_for_user(&self, user_id: i64) -> PortResult<Vec<StudentReflection>> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<StudentReflection> = t
            .reflections
            .iter()
            .filter(|r| r.user_id == user_id && t.lineage(r).is_live())
            .map(|r| StudentReflection {
                id: r.id,
                chapter_id: r.chapter_id,
                chapter_name: t.chapter(r.chapter_id).map(|c| c.name.clone()).unwrap_or_default(),
                video_ref: r.video_ref.clone(),
                text_summary: r.text_summary.clone(),
                submitted_at: r.submitted_at,
            })
            .collect();
        rows.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(rows)
    }

    async fn list_all_reflections(
        &self,
        filter: &ReflectionFilter,
    ) -> PortResult<Vec<ReflectionAudit>> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<ReflectionAudit> = t
            .reflections
            .iter()
            .filter(|r| filter.chapter_id.map_or(true, |id| r.chapter_id == id))
            .map(|r| {
                let feedback = t.feedback.iter().find(|f| f.reflection_id == r.id);
                ReflectionAudit {
                    id: r.id,
                    student_email: t.email_of(r.user_id),
                    chapter_id: r.chapter_id,
                    video_ref: r.video_ref.clone(),
                    text_summary: r.text_summary.clone(),
                    submitted_at: r.submitted_at,
                    lineage: t.lineage(r),
                    feedback_status: feedback.map(|f| f.status),
                    feedback_comment: feedback.and_then(|f| f.comment.clone()),
                }
            })
            .filter(|row| {
                filter
                    .email
                    .as_deref()
                    .map_or(true, |email| row.student_email == email)
            })
            .collect();
        rows.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(rows)
    }

    async fn upsert_feedback(
        &self,
        teacher_id: i64,
        reflection_id: i64,
        status: FeedbackStatus,
        comment: Option<&str>,
    ) -> PortResult<Feedback> {
        let mut t = self.tables.lock().unwrap();
        let live = t
            .reflection(reflection_id)
            .is_some_and(|r| t.lineage(r).is_live());
        if !live {
            return Err(PortError::NotFound(format!("reflection {}", reflection_id)));
        }
        let now = Utc::now();
        if let Some(existing) = t
            .feedback
            .iter_mut()
            .find(|f| f.reflection_id == reflection_id)
        {
            existing.teacher_id = teacher_id;
            existing.status = status;
            existing.comment = comment.map(str::to_string);
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let feedback = Feedback {
            id: t.next_id(),
            reflection_id,
            teacher_id,
            status,
            comment: comment.map(str::to_string),
            updated_at: now,
            obsolete: false,
        };
        t.feedback.push(feedback.clone());
        Ok(feedback)
    }

    async fn list_feedback_for_teacher(
        &self,
        teacher_id: i64,
        filter: &FeedbackFilter,
    ) -> PortResult<Vec<FeedbackView>> {
        let t = self.tables.lock().unwrap();
        Ok(t.feedback
            .iter()
            .filter(|f| f.teacher_id == teacher_id && !f.obsolete)
            .filter(|f| filter.status.map_or(true, |s| f.status == s))
            .filter_map(|f| {
                let r = t.reflection(f.reflection_id)?;
                if !t.lineage(r).is_live() {
                    return None;
                }
                Some(FeedbackView {
                    feedback_id: f.id,
                    student_email: t.email_of(r.user_id),
                    chapter_id: r.chapter_id,
                    video_ref: r.video_ref.clone(),
                    status: f.status,
                    comment: f.comment.clone(),
                    updated_at: Some(f.updated_at),
                })
            })
            .filter(|v| filter.chapter_id.map_or(true, |id| v.chapter_id == id))
            .filter(|v| {
                filter
                    .email
                    .as_deref()
                    .map_or(true, |email| v.student_email == email)
            })
            .collect())
    }
}

/// A counter store whose backend is always down.
pub struct FailingCounterStore;

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn get_count(&self, _key: &str) -> PortResult<Option<u64>> {
        Err(PortError::Unavailable("counter store offline".to_string()))
    }

    async fn incr_with_expiry(&self, _key: &str, _ttl_secs: u64) -> PortResult<u64> {
        Err(PortError::Unavailable("counter store offline".to_string()))
    }

    async fn trim_and_count(&self, _key: &str, _cutoff_millis: i64) -> PortResult<u64> {
        Err(PortError::Unavailable("counter store offline".to_string()))
    }

    async fn add_event(
        &self,
        _key: &str,
        _member: &str,
        _score_millis: i64,
        _ttl_secs: u64,
    ) -> PortResult<()> {
        Err(PortError::Unavailable("counter store offline".to_string()))
    }
}

/// Configuration for tests: in-memory counters and a throwaway upload directory.
pub fn test_config(reflection_limit: u32, feedback_limit: u32) -> Config {
    Config {
        bind_address: ([127, 0, 0, 1], 0).into(),
        database: DatabaseConfig::Url("postgres://unused/reflects".to_string()),
        log_level: tracing::Level::DEBUG,
        rate_limit_mode: RateLimitMode::Fixed,
        counter_backend: CounterBackend::Memory,
        reflection_daily_limit: reflection_limit,
        feedback_daily_limit: feedback_limit,
        upload_dir: std::env::temp_dir().join(format!("reflects-test-{}", uuid::Uuid::new_v4())),
        upload_base_url: "/uploads".to_string(),
        cors_origin: "http://localhost:3000".to_string(),
        max_upload_bytes: 10 * 1024 * 1024,
    }
}

pub fn app_state(db: Arc<MemoryDb>, config: Config) -> Arc<AppState> {
    app_state_with_counters(db, config, Arc::new(InMemoryCounterStore::new()))
}

pub fn app_state_with_counters(
    db: Arc<MemoryDb>,
    config: Config,
    counters: Arc<dyn CounterStore>,
) -> Arc<AppState> {
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
        config.upload_dir.clone(),
        config.upload_base_url.clone(),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(counters, config.rate_limit_mode));
    Arc::new(AppState {
        db: db.clone(),
        rate_limiter,
        obsolescence: Arc::new(Obsolescence::new(db, objects.clone())),
        objects,
        config: Arc::new(config),
    })
}

/// Registers a user and opens a session for it, returning `(user_id, token)`.
pub async fn signed_in(db: &MemoryDb, email: &str, role: Role) -> (i64, String) {
    let user = db
        .create_user("Test User", email, "not-a-real-hash", role)
        .await
        .unwrap();
    let token = uuid::Uuid::new_v4().to_string();
    db.create_auth_session(&token, user.id, Utc::now() + Duration::days(1))
        .await
        .unwrap();
    (user.id, token)
}
