//! services/api/src/web/feedback.rs
//!
//! Teacher feedback on student reflections.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use reflects_core::domain::{AuthUser, FeedbackFilter, FeedbackStatus, FeedbackView};
use reflects_core::ports::{ObjectStore, PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::web::rest::{
    enforce_quota, failure, require_teacher, HandlerError, MessageResponse, FEEDBACK_FEATURE,
};
use crate::web::state::AppState;

const MAX_COMMENT_CHARS: usize = 500;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatusDto {
    Understood,
    NeedsReview,
}

impl From<FeedbackStatusDto> for FeedbackStatus {
    fn from(dto: FeedbackStatusDto) -> Self {
        match dto {
            FeedbackStatusDto::Understood => FeedbackStatus::Understood,
            FeedbackStatusDto::NeedsReview => FeedbackStatus::NeedsReview,
        }
    }
}

impl From<FeedbackStatus> for FeedbackStatusDto {
    fn from(status: FeedbackStatus) -> Self {
        match status {
            FeedbackStatus::Understood => FeedbackStatusDto::Understood,
            FeedbackStatus::NeedsReview => FeedbackStatusDto::NeedsReview,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitFeedbackRequest {
    pub reflection_id: i64,
    pub status: FeedbackStatusDto,
    pub comment: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub feedback_id: i64,
    pub student_email: String,
    pub chapter_id: i64,
    pub video_url: String,
    pub status: FeedbackStatusDto,
    pub comment: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FeedbackResponse {
    fn from_domain(view: FeedbackView, objects: &dyn ObjectStore) -> Self {
        Self {
            feedback_id: view.feedback_id,
            student_email: view.student_email,
            chapter_id: view.chapter_id,
            video_url: objects.url_for(&view.video_ref),
            status: view.status.into(),
            comment: view.comment,
            updated_at: view.updated_at,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedbackQuery {
    pub email: Option<String>,
    pub chapter_id: Option<i64>,
    pub status: Option<FeedbackStatusDto>,
}

fn normalize_comment(raw: Option<String>) -> Result<Option<String>, HandlerError> {
    let comment = raw
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(c) = &comment {
        if c.chars().count() > MAX_COMMENT_CHARS {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Comment must be at most {} characters", MAX_COMMENT_CHARS),
            ));
        }
    }
    Ok(comment)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /teacher/feedback - Record or replace the feedback on a reflection
#[utoipa::path(
    post,
    path = "/teacher/feedback",
    request_body = SubmitFeedbackRequest,
    responses(
        (status = 200, description = "Feedback saved", body = MessageResponse),
        (status = 400, description = "Comment too long"),
        (status = 403, description = "Caller is not a teacher"),
        (status = 404, description = "Reflection missing or obsolete"),
        (status = 429, description = "Feedback rate limit reached")
    )
)]
pub async fn submit_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    require_teacher(&auth, "Only teachers can give feedback")?;
    let comment = normalize_comment(req.comment)?;

    enforce_quota(
        &state,
        auth.user_id,
        FEEDBACK_FEATURE,
        state.config.feedback_daily_limit,
        "Feedback rate limit reached.",
    )
    .await?;

    let feedback = state
        .db
        .upsert_feedback(
            auth.user_id,
            req.reflection_id,
            req.status.into(),
            comment.as_deref(),
        )
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "Reflection not found".to_string())
            }
            other => failure("Failed to save feedback", other),
        })?;

    info!(
        feedback_id = feedback.id,
        reflection_id = feedback.reflection_id,
        status = feedback.status.as_str(),
        "Feedback saved"
    );
    Ok(Json(MessageResponse::new("Feedback saved")))
}

/// GET /teacher/feedback - Feedback the caller has given on live reflections
#[utoipa::path(
    get,
    path = "/teacher/feedback",
    params(FeedbackQuery),
    responses(
        (status = 200, description = "Feedback given by the caller", body = [FeedbackResponse]),
        (status = 403, description = "Caller is not a teacher")
    )
)]
pub async fn list_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<FeedbackQuery>,
) -> Result<Json<Vec<FeedbackResponse>>, HandlerError> {
    require_teacher(&auth, "Access denied")?;

    let filter = FeedbackFilter {
        email: query.email.map(|e| e.trim().to_lowercase()),
        chapter_id: query.chapter_id,
        status: query.status.map(FeedbackStatus::from),
    };
    let views = state
        .db
        .list_feedback_for_teacher(auth.user_id, &filter)
        .await
        .map_err(|e| failure("Failed to list feedback", e))?;

    let objects = state.objects.as_ref();
    Ok(Json(
        views
            .into_iter()
            .map(|v| FeedbackResponse::from_domain(v, objects))
            .collect(),
    ))
}
