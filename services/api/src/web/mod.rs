pub mod auth;
pub mod curriculum;
pub mod feedback;
pub mod middleware;
pub mod reflections;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
use state::AppState;

/// Builds the REST router. Everything except registration, login, logout
/// and the curriculum listings requires an auth session.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/create-user", post(auth::create_user_handler))
        .route("/login", post(auth::login_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/subjects", get(curriculum::list_subjects_handler))
        .route("/chapters", get(curriculum::list_chapters_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(auth::me_handler))
        .route("/update-user", patch(auth::update_user_handler))
        .route("/submit-reflection", post(reflections::submit_reflection_handler))
        .route("/my-reflections", get(reflections::my_reflections_handler))
        .route("/all-reflections", get(reflections::all_reflections_handler))
        .route("/students/emails", get(reflections::student_emails_handler))
        .route(
            "/teacher/students/{email}",
            delete(reflections::delete_student_handler),
        )
        .route("/teacher/subjects", post(curriculum::create_subject_handler))
        .route(
            "/teacher/subjects/{id}",
            delete(curriculum::delete_subject_handler),
        )
        .route("/teacher/chapters", post(curriculum::create_chapter_handler))
        .route(
            "/teacher/chapters/{id}",
            delete(curriculum::delete_chapter_handler),
        )
        .route(
            "/teacher/feedback",
            post(feedback::submit_feedback_handler).get(feedback::list_feedback_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
}
