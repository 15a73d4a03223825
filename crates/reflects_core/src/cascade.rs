//! crates/reflects_core/src/cascade.rs
//!
//! Soft deletion of curriculum content.
//!
//! Subjects, chapters, reflections and feedback are never removed. Deleting a
//! subject or chapter flips `obsolete` on the row and on every descendant, and
//! that set of updates is handed to the store as one `CascadePlan` that must
//! commit atomically. Flags only ever go from false to true, so replaying a
//! plan is a no-op.
//!
//! Student accounts are the exception: `delete_student` erases the account,
//! its reflections and their uploaded videos outright.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ports::{DatabaseService, ObjectStore, PortResult};

/// One bulk "mark obsolete" update, scoped by an ancestor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    Subject { subject_id: i64 },
    ChaptersOfSubject { subject_id: i64 },
    ReflectionsOfSubject { subject_id: i64 },
    FeedbackOfSubject { subject_id: i64 },
    Chapter { chapter_id: i64 },
    ReflectionsOfChapter { chapter_id: i64 },
    FeedbackOfChapter { chapter_id: i64 },
}

/// The ordered updates for one deletion, root first.
///
/// Descendant steps are scoped by the root id through the parent links rather
/// than by the parents' flags, so a plan marks the same rows whether or not
/// some of them were already obsolete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    steps: Vec<CascadeStep>,
}

impl CascadePlan {
    pub fn for_subject(subject_id: i64) -> Self {
        Self {
            steps: vec![
                CascadeStep::Subject { subject_id },
                CascadeStep::ChaptersOfSubject { subject_id },
                CascadeStep::ReflectionsOfSubject { subject_id },
                CascadeStep::FeedbackOfSubject { subject_id },
            ],
        }
    }

    pub fn for_chapter(chapter_id: i64) -> Self {
        Self {
            steps: vec![
                CascadeStep::Chapter { chapter_id },
                CascadeStep::ReflectionsOfChapter { chapter_id },
                CascadeStep::FeedbackOfChapter { chapter_id },
            ],
        }
    }

    pub fn steps(&self) -> &[CascadeStep] {
        &self.steps
    }
}

/// Entry point for the three delete operations exposed to request handlers.
#[derive(Clone)]
pub struct Obsolescence {
    db: Arc<dyn DatabaseService>,
    objects: Arc<dyn ObjectStore>,
}

impl Obsolescence {
    pub fn new(db: Arc<dyn DatabaseService>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { db, objects }
    }

    /// Marks the subject and everything beneath it obsolete.
    ///
    /// Succeeds for unknown ids and for subjects that are already obsolete.
    pub async fn delete_subject(&self, subject_id: i64) -> PortResult<()> {
        self.db
            .apply_cascade(&CascadePlan::for_subject(subject_id))
            .await?;
        info!(subject_id = subject_id, "Subject marked obsolete");
        Ok(())
    }

    /// Marks the chapter, its reflections and their feedback obsolete.
    pub async fn delete_chapter(&self, chapter_id: i64) -> PortResult<()> {
        self.db
            .apply_cascade(&CascadePlan::for_chapter(chapter_id))
            .await?;
        info!(chapter_id = chapter_id, "Chapter marked obsolete");
        Ok(())
    }

    /// Hard-deletes a student account. Unknown emails yield `NotFound`.
    ///
    /// Videos are removed after the rows are gone; a video that cannot be
    /// removed is logged and left behind.
    pub async fn delete_student(&self, email: &str) -> PortResult<()> {
        let email = email.trim().to_lowercase();
        let video_refs = self.db.delete_student(&email).await?;
        for video_ref in &video_refs {
            if let Err(e) = self.objects.delete(video_ref).await {
                warn!(video_ref = %video_ref, "Failed to remove video of deleted student: {}", e);
            }
        }
        info!(videos = video_refs.len(), "Student account removed");
        Ok(())
    }
}
