//! services/api/src/web/curriculum.rs
//!
//! Subjects and chapters: public listings and teacher-only management,
//! including the soft-delete cascades.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use reflects_core::domain::{AuthUser, Chapter, Subject};
use reflects_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::web::rest::{failure, require_teacher, HandlerError, MessageResponse};
use crate::web::state::AppState;

const TEACHERS_ONLY: &str = "Only teachers can manage the curriculum";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct SubjectResponse {
    pub id: i64,
    pub name: String,
}

impl From<Subject> for SubjectResponse {
    fn from(subject: Subject) -> Self {
        Self {
            id: subject.id,
            name: subject.name,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ChapterResponse {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
}

impl From<Chapter> for ChapterResponse {
    fn from(chapter: Chapter) -> Self {
        Self {
            id: chapter.id,
            subject_id: chapter.subject_id,
            name: chapter.name,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChapterQuery {
    /// Only list chapters of this subject.
    pub subject_id: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSubjectRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateChapterRequest {
    pub subject_id: i64,
    pub name: String,
}

fn curriculum_name(raw: &str) -> Result<String, HandlerError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Name must be between 1 and 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /subjects - Live subjects
#[utoipa::path(
    get,
    path = "/subjects",
    responses((status = 200, description = "Subjects that are not obsolete", body = [SubjectResponse]))
)]
pub async fn list_subjects_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SubjectResponse>>, HandlerError> {
    let subjects = state
        .db
        .list_subjects()
        .await
        .map_err(|e| failure("Failed to list subjects", e))?;
    Ok(Json(subjects.into_iter().map(SubjectResponse::from).collect()))
}

/// GET /chapters - Live chapters, optionally of one subject
#[utoipa::path(
    get,
    path = "/chapters",
    params(ChapterQuery),
    responses((status = 200, description = "Chapters whose subject and self are not obsolete", body = [ChapterResponse]))
)]
pub async fn list_chapters_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChapterQuery>,
) -> Result<Json<Vec<ChapterResponse>>, HandlerError> {
    let chapters = state
        .db
        .list_chapters(query.subject_id)
        .await
        .map_err(|e| failure("Failed to list chapters", e))?;
    Ok(Json(chapters.into_iter().map(ChapterResponse::from).collect()))
}

/// POST /teacher/subjects - Create a subject
#[utoipa::path(
    post,
    path = "/teacher/subjects",
    request_body = CreateSubjectRequest,
    responses(
        (status = 201, description = "Subject created", body = SubjectResponse),
        (status = 403, description = "Caller is not a teacher")
    )
)]
pub async fn create_subject_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_teacher(&auth, TEACHERS_ONLY)?;
    let name = curriculum_name(&req.name)?;

    let subject = state
        .db
        .create_subject(&name)
        .await
        .map_err(|e| failure("Failed to create subject", e))?;
    Ok((StatusCode::CREATED, Json(SubjectResponse::from(subject))))
}

/// POST /teacher/chapters - Create a chapter under a live subject
#[utoipa::path(
    post,
    path = "/teacher/chapters",
    request_body = CreateChapterRequest,
    responses(
        (status = 201, description = "Chapter created", body = ChapterResponse),
        (status = 403, description = "Caller is not a teacher"),
        (status = 404, description = "Subject missing or obsolete")
    )
)]
pub async fn create_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateChapterRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_teacher(&auth, TEACHERS_ONLY)?;
    let name = curriculum_name(&req.name)?;

    let chapter = state
        .db
        .create_chapter(req.subject_id, &name)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Subject not found".to_string()),
            other => failure("Failed to create chapter", other),
        })?;
    Ok((StatusCode::CREATED, Json(ChapterResponse::from(chapter))))
}

/// DELETE /teacher/subjects/{id} - Mark a subject and all its content obsolete
#[utoipa::path(
    delete,
    path = "/teacher/subjects/{id}",
    params(("id" = i64, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Subject deleted", body = MessageResponse),
        (status = 403, description = "Caller is not a teacher")
    )
)]
pub async fn delete_subject_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(subject_id): Path<i64>,
) -> Result<Json<MessageResponse>, HandlerError> {
    require_teacher(&auth, TEACHERS_ONLY)?;
    state
        .obsolescence
        .delete_subject(subject_id)
        .await
        .map_err(|e| failure("Failed to delete subject", e))?;
    Ok(Json(MessageResponse::new("Subject deleted")))
}

/// DELETE /teacher/chapters/{id} - Mark a chapter and its reflections obsolete
#[utoipa::path(
    delete,
    path = "/teacher/chapters/{id}",
    params(("id" = i64, Path, description = "Chapter id")),
    responses(
        (status = 200, description = "Chapter deleted", body = MessageResponse),
        (status = 403, description = "Caller is not a teacher")
    )
)]
pub async fn delete_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(chapter_id): Path<i64>,
) -> Result<Json<MessageResponse>, HandlerError> {
    require_teacher(&auth, TEACHERS_ONLY)?;
    state
        .obsolescence
        .delete_chapter(chapter_id)
        .await
        .map_err(|e| failure("Failed to delete chapter", e))?;
    Ok(Json(MessageResponse::new("Chapter deleted")))
}
