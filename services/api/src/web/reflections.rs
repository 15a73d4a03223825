//! services/api/src/web/reflections.rs
//!
//! Reflection submission and the student and teacher listings over them.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reflects_core::domain::{AuthUser, ReflectionAudit, ReflectionFilter, StudentReflection};
use reflects_core::ports::{ObjectStore, PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::rest::{
    enforce_quota, failure, require_teacher, HandlerError, MessageResponse, REFLECTION_FEATURE,
};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MyReflectionResponse {
    pub id: i64,
    pub chapter_id: i64,
    pub chapter: String,
    pub video_url: String,
    pub summary: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl MyReflectionResponse {
    fn from_domain(reflection: StudentReflection, objects: &dyn ObjectStore) -> Self {
        Self {
            id: reflection.id,
            chapter_id: reflection.chapter_id,
            chapter: reflection.chapter_name,
            video_url: objects.url_for(&reflection.video_ref),
            summary: reflection.text_summary,
            submitted_at: reflection.submitted_at,
        }
    }
}

/// One row of the teacher's audit listing, with the obsolete flags of the row
/// and of its chapter and subject.
#[derive(Serialize, ToSchema)]
pub struct AuditReflectionResponse {
    pub id: i64,
    pub email: String,
    pub chapter_id: i64,
    pub video_url: String,
    pub text_summary: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub status: Option<String>,
    pub comment: Option<String>,
    pub obsolete: bool,
    pub chapter_obsolete: bool,
    pub subject_obsolete: bool,
}

impl AuditReflectionResponse {
    fn from_domain(row: ReflectionAudit, objects: &dyn ObjectStore) -> Self {
        Self {
            id: row.id,
            email: row.student_email,
            chapter_id: row.chapter_id,
            video_url: objects.url_for(&row.video_ref),
            text_summary: row.text_summary,
            submitted_at: row.submitted_at,
            status: row.feedback_status.map(|s| s.as_str().to_string()),
            comment: row.feedback_comment,
            obsolete: row.lineage.own,
            chapter_obsolete: row.lineage.chapter,
            subject_obsolete: row.lineage.subject,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AllReflectionsQuery {
    pub chapter_id: Option<i64>,
    pub email: Option<String>,
    /// Defaults to true; `false` hides rows with any obsolete ancestor.
    pub include_obsolete: Option<bool>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Keeps the last path segment of an uploaded file name and replaces anything
/// outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

/// `{user_id}_{chapter_id}_{unique}_{file name}`: unique per upload so a rejected
/// submission can never replace a stored video.
fn video_object_name(user_id: i64, chapter_id: i64, file_name: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        user_id,
        chapter_id,
        Uuid::new_v4().simple(),
        sanitize_file_name(file_name)
    )
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        format!("Failed to read multipart data: {}", e),
    )
}

struct ReflectionUpload {
    chapter_id: i64,
    text_summary: Option<String>,
    file_name: String,
    video: Bytes,
}

async fn read_upload(mut multipart: Multipart) -> Result<ReflectionUpload, HandlerError> {
    let mut chapter_id = None;
    let mut text_summary = None;
    let mut video = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("chapter_id") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let id = raw.trim().parse::<i64>().map_err(|_| {
                    (StatusCode::BAD_REQUEST, "chapter_id must be an integer".to_string())
                })?;
                chapter_id = Some(id);
            }
            Some("text_summary") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    text_summary = Some(trimmed.to_string());
                }
            }
            Some("video_file") => {
                let file_name = field.file_name().unwrap_or("video").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                video = Some((file_name, data));
            }
            _ => {}
        }
    }

    let chapter_id = chapter_id
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "chapter_id is required".to_string()))?;
    let (file_name, video) = video
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "video_file is required".to_string()))?;

    Ok(ReflectionUpload {
        chapter_id,
        text_summary,
        file_name,
        video,
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /submit-reflection - Upload a video reflection for a chapter
///
/// Multipart fields: `chapter_id`, optional `text_summary`, and `video_file`.
#[utoipa::path(
    post,
    path = "/submit-reflection",
    request_body(content_type = "multipart/form-data", description = "chapter_id, text_summary and video_file"),
    responses(
        (status = 201, description = "Reflection submitted successfully", body = MessageResponse),
        (status = 400, description = "Invalid form or already submitted for this chapter"),
        (status = 403, description = "Caller is not a student"),
        (status = 404, description = "Chapter missing or obsolete"),
        (status = 429, description = "Reflection rate limit reached"),
        (status = 503, description = "Counter or object store unavailable")
    )
)]
pub async fn submit_reflection_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    if auth.is_teacher() {
        return Err((
            StatusCode::FORBIDDEN,
            "Only students can submit reflections".to_string(),
        ));
    }

    let upload = read_upload(multipart).await?;

    enforce_quota(
        &state,
        auth.user_id,
        REFLECTION_FEATURE,
        state.config.reflection_daily_limit,
        "Reflection rate limit reached.",
    )
    .await?;

    let video_ref = video_object_name(auth.user_id, upload.chapter_id, &upload.file_name);
    state
        .objects
        .put(&video_ref, &upload.video)
        .await
        .map_err(|e| failure("Failed to store video", e))?;

    let created = state
        .db
        .create_reflection(
            auth.user_id,
            upload.chapter_id,
            &video_ref,
            upload.text_summary.as_deref(),
        )
        .await;

    let reflection = match created {
        Ok(reflection) => reflection,
        Err(e) => {
            // The row was never written, so nothing refers to this upload.
            if let Err(cleanup) = state.objects.delete(&video_ref).await {
                warn!(video_ref = %video_ref, "Failed to remove rejected upload: {}", cleanup);
            }
            return Err(match e {
                PortError::Conflict(_) => (
                    StatusCode::BAD_REQUEST,
                    "You’ve already submitted for this chapter.".to_string(),
                ),
                PortError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "Chapter not found".to_string())
                }
                other => failure("Failed to submit reflection", other),
            });
        }
    };

    info!(
        reflection_id = reflection.id,
        chapter_id = reflection.chapter_id,
        "Reflection submitted"
    );
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Reflection submitted successfully")),
    ))
}

/// GET /my-reflections - The caller's live reflections, newest first
#[utoipa::path(
    get,
    path = "/my-reflections",
    responses((status = 200, description = "Reflections of the caller", body = [MyReflectionResponse]))
)]
pub async fn my_reflections_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<MyReflectionResponse>>, HandlerError> {
    let reflections = state
        .db
        .list_reflections_for_user(auth.user_id)
        .await
        .map_err(|e| failure("Failed to list reflections", e))?;

    let objects = state.objects.as_ref();
    Ok(Json(
        reflections
            .into_iter()
            .map(|r| MyReflectionResponse::from_domain(r, objects))
            .collect(),
    ))
}

/// GET /all-reflections - Teacher audit listing, including obsolete rows
#[utoipa::path(
    get,
    path = "/all-reflections",
    params(AllReflectionsQuery),
    responses(
        (status = 200, description = "All reflections with obsolete flags", body = [AuditReflectionResponse]),
        (status = 403, description = "Caller is not a teacher")
    )
)]
pub async fn all_reflections_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<AllReflectionsQuery>,
) -> Result<Json<Vec<AuditReflectionResponse>>, HandlerError> {
    require_teacher(&auth, "Access denied")?;

    let filter = ReflectionFilter {
        chapter_id: query.chapter_id,
        email: query.email.map(|e| e.trim().to_lowercase()),
    };
    let rows = state
        .db
        .list_all_reflections(&filter)
        .await
        .map_err(|e| failure("Failed to list reflections", e))?;

    let include_obsolete = query.include_obsolete.unwrap_or(true);
    let objects = state.objects.as_ref();
    Ok(Json(
        rows.into_iter()
            .filter(|row| include_obsolete || row.lineage.is_live())
            .map(|row| AuditReflectionResponse::from_domain(row, objects))
            .collect(),
    ))
}

/// GET /students/emails - Emails of every student account
#[utoipa::path(
    get,
    path = "/students/emails",
    responses(
        (status = 200, description = "Student emails", body = [String]),
        (status = 403, description = "Caller is not a teacher")
    )
)]
pub async fn student_emails_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<String>>, HandlerError> {
    require_teacher(&auth, "Access denied")?;
    let emails = state
        .db
        .list_student_emails()
        .await
        .map_err(|e| failure("Failed to list students", e))?;
    Ok(Json(emails))
}

/// DELETE /teacher/students/{email} - Permanently remove a student account
#[utoipa::path(
    delete,
    path = "/teacher/students/{email}",
    params(("email" = String, Path, description = "Student email")),
    responses(
        (status = 200, description = "Student removed", body = MessageResponse),
        (status = 403, description = "Caller is not a teacher"),
        (status = 404, description = "No student with that email")
    )
)]
pub async fn delete_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(email): Path<String>,
) -> Result<Json<MessageResponse>, HandlerError> {
    require_teacher(&auth, "Access denied")?;
    state
        .obsolescence
        .delete_student(&email)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Student not found".to_string()),
            other => failure("Failed to delete student", other),
        })?;
    Ok(Json(MessageResponse::new("Student deleted")))
}
