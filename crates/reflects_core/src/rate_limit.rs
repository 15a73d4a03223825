//! crates/reflects_core/src/rate_limit.rs
//!
//! Per-subject, per-feature daily quotas.
//!
//! Two window algorithms are supported and one of them is chosen for the whole
//! process at startup:
//! - `Fixed`: one counter per UTC calendar day, reset at midnight.
//! - `Sliding`: a log of event timestamps covering the trailing 24 hours.
//!
//! The limiter owns policy only. Counts live in a `CounterStore`, whose atomic
//! primitives are what make concurrent calls for the same key safe. Two racing
//! callers may both pass the check and overshoot the quota by the number of
//! racers minus one; the window resets on its own so this is tolerated.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::ports::{CounterStore, PortResult};

/// Length of both windows, in seconds.
pub const WINDOW_SECS: u64 = 86_400;

//=========================================================================================
// Mode
//=========================================================================================

/// Which window algorithm the process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitMode {
    Fixed,
    Sliding,
}

impl RateLimitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitMode::Fixed => "fixed",
            RateLimitMode::Sliding => "sliding",
        }
    }
}

impl fmt::Display for RateLimitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unrecognized mode string. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rate limit mode '{0}', expected 'fixed' or 'sliding'")]
pub struct RateLimitModeError(pub String);

impl FromStr for RateLimitMode {
    type Err = RateLimitModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fixed" => Ok(RateLimitMode::Fixed),
            "sliding" => Ok(RateLimitMode::Sliding),
            other => Err(RateLimitModeError(other.to_string())),
        }
    }
}

//=========================================================================================
// Keys
//=========================================================================================

/// Counter key for one subject, feature and UTC day.
pub fn fixed_window_key(feature: &str, subject_id: i64, day: NaiveDate) -> String {
    format!("rate:{}:user:{}:{}", feature, subject_id, day.format("%Y-%m-%d"))
}

/// Sorted-set key for one subject and feature.
pub fn sliding_window_key(feature: &str, subject_id: i64) -> String {
    format!("rate:{}:user:{}:sliding", feature, subject_id)
}

//=========================================================================================
// Limiter
//=========================================================================================

/// Admission control over a shared counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    mode: RateLimitMode,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, mode: RateLimitMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> RateLimitMode {
        self.mode
    }

    /// Decides whether `subject_id` may perform one more `feature` action today.
    ///
    /// `Ok(false)` means the quota is used up. `Err` means the counter store
    /// failed and says nothing about the quota.
    pub async fn allow(&self, subject_id: i64, feature: &str, limit: u32) -> PortResult<bool> {
        self.allow_at(subject_id, feature, limit, Utc::now()).await
    }

    /// Same as [`RateLimiter::allow`] with an explicit clock reading.
    pub async fn allow_at(
        &self,
        subject_id: i64,
        feature: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        let allowed = match self.mode {
            RateLimitMode::Fixed => self.check_fixed(subject_id, feature, limit, now).await?,
            RateLimitMode::Sliding => self.check_sliding(subject_id, feature, limit, now).await?,
        };

        debug!(
            subject_id = subject_id,
            feature = %feature,
            limit = limit,
            mode = %self.mode,
            allowed = allowed,
            "Rate limit check"
        );
        Ok(allowed)
    }

    async fn check_fixed(
        &self,
        subject_id: i64,
        feature: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        let key = fixed_window_key(feature, subject_id, now.date_naive());

        if let Some(count) = self.store.get_count(&key).await? {
            if count >= u64::from(limit) {
                return Ok(false);
            }
        }

        self.store.incr_with_expiry(&key, WINDOW_SECS).await?;
        Ok(true)
    }

    async fn check_sliding(
        &self,
        subject_id: i64,
        feature: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        let key = sliding_window_key(feature, subject_id);
        let now_millis = now.timestamp_millis();
        let cutoff = (now - Duration::seconds(WINDOW_SECS as i64)).timestamp_millis();

        let current = self.store.trim_and_count(&key, cutoff).await?;
        if current >= u64::from(limit) {
            return Ok(false);
        }

        // Members must be unique or two events in the same millisecond collapse.
        let member = format!("{}-{}", now_millis, Uuid::new_v4().simple());
        self.store
            .add_event(&key, &member, now_millis, WINDOW_SECS)
            .await?;
        Ok(true)
    }
}
