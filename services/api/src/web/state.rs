//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use reflects_core::cascade::Obsolescence;
use reflects_core::ports::{DatabaseService, ObjectStore};
use reflects_core::rate_limit::RateLimiter;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter>,
    pub obsolescence: Arc<Obsolescence>,
    pub objects: Arc<dyn ObjectStore>,
}
