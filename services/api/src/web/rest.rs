//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI specification and the
//! helpers the REST handlers share for mapping core outcomes onto responses.

use crate::web::state::AppState;
use axum::http::StatusCode;
use reflects_core::domain::AuthUser;
use reflects_core::ports::PortError;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};

/// Feature tag for reflection submissions.
pub const REFLECTION_FEATURE: &str = "reflection";
/// Feature tag for teacher feedback.
pub const FEEDBACK_FEATURE: &str = "feedback";

/// Error half of every handler's return type.
pub type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::create_user_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::auth::me_handler,
        crate::web::auth::update_user_handler,
        crate::web::curriculum::list_subjects_handler,
        crate::web::curriculum::list_chapters_handler,
        crate::web::curriculum::create_subject_handler,
        crate::web::curriculum::create_chapter_handler,
        crate::web::curriculum::delete_subject_handler,
        crate::web::curriculum::delete_chapter_handler,
        crate::web::reflections::submit_reflection_handler,
        crate::web::reflections::my_reflections_handler,
        crate::web::reflections::all_reflections_handler,
        crate::web::reflections::student_emails_handler,
        crate::web::reflections::delete_student_handler,
        crate::web::feedback::submit_feedback_handler,
        crate::web::feedback::list_feedback_handler,
    ),
    components(
        schemas(MessageResponse)
    ),
    tags(
        (name = "Reflects API", description = "Video reflections on curriculum chapters and teacher feedback.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Response Types and Helpers
//=========================================================================================

/// A plain acknowledgment.
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Logs a port failure and maps it onto a coarse client response.
pub fn failure(context: &str, e: PortError) -> HandlerError {
    error!("{}: {:?}", context, e);
    match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found".to_string()),
        PortError::Conflict(_) => (StatusCode::CONFLICT, "Already exists".to_string()),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::Forbidden => (StatusCode::FORBIDDEN, "Access denied".to_string()),
        PortError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable".to_string(),
        ),
        PortError::Unexpected(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            context.to_string(),
        ),
    }
}

/// Rejects callers that are not teachers.
pub fn require_teacher(user: &AuthUser, message: &str) -> Result<(), HandlerError> {
    if user.is_teacher() {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, message.to_string()))
    }
}

/// Consumes one unit of the caller's daily quota for `feature`.
///
/// A full quota yields 429; a counter store failure yields 503 so the two can
/// never be confused.
pub async fn enforce_quota(
    state: &AppState,
    user_id: i64,
    feature: &str,
    limit: u32,
    message: &str,
) -> Result<(), HandlerError> {
    match state.rate_limiter.allow(user_id, feature, limit).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(user_id = user_id, feature = %feature, "Rate limit reached");
            Err((StatusCode::TOO_MANY_REQUESTS, message.to_string()))
        }
        Err(e) => Err(failure("Rate limiter check failed", e)),
    }
}
