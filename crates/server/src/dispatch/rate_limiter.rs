//! Fixed-window limiter pacing admin email actions.
//!
//! `burst_limit` requests are allowed per `min_interval_ms` window, measured from the
//! last recorded request. Once the tokens are spent the next request waits for the
//! rest of the window even if the earlier ones were spread out. This deliberately
//! over-approximates the provider's own limit.
//!
//! State is written to a [`StateStore`] after every mutation so a restart does not
//! reset the cooldown.

use crate::config::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Longest single sleep while polling in [`RateLimiter::acquire`].
const POLL_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterState {
    pub last_request_at_ms: i64,
    pub tokens: u32,
}

/// Where limiter state survives restarts.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Option<RateLimiterState>;
    fn save(&self, state: &RateLimiterState);
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<RateLimiterState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Option<RateLimiterState> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, state: &RateLimiterState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(*state);
    }
}

/// Persists the state as a small JSON document. Unreadable files count as empty.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Option<RateLimiterState> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(
                    name = "rate_limiter.state.invalid",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    path = %self.path.display(),
                    error = %e,
                    message = "Ignoring unreadable rate limiter state"
                );
                None
            }
        }
    }

    fn save(&self, state: &RateLimiterState) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_vec(state).map_err(std::io::Error::other)?;
            std::fs::write(&self.path, json)
        };
        if let Err(e) = write() {
            tracing::warn!(
                name = "rate_limiter.state.persist_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                path = %self.path.display(),
                error = %e,
                message = "Failed to persist rate limiter state"
            );
        }
    }
}

/// Snapshot served to the admin UI so it can render a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub wait_ms: u64,
    pub next_allowed_at_ms: i64,
    /// 0 when a wait just started, 1 when ready.
    pub progress: f64,
    pub ready: bool,
}

pub struct RateLimiter {
    min_interval_ms: i64,
    burst_limit: u32,
    state: Mutex<RateLimiterState>,
    store: Box<dyn StateStore>,
}

/// Wall clock in unix milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

impl RateLimiter {
    pub fn new(min_interval: Duration, burst_limit: u32, store: Box<dyn StateStore>) -> Self {
        let burst_limit = burst_limit.max(1);
        let state = store.load().unwrap_or(RateLimiterState {
            last_request_at_ms: 0,
            tokens: burst_limit,
        });
        Self {
            min_interval_ms: min_interval.as_millis() as i64,
            burst_limit,
            state: Mutex::new(state),
            store,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let store: Box<dyn StateStore> = match &config.state_path {
            Some(path) => Box::new(JsonFileStore::new(path)),
            None => Box::new(MemoryStore::new()),
        };
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            config.burst_limit,
            store,
        )
    }

    pub fn in_memory(min_interval: Duration, burst_limit: u32) -> Self {
        Self::new(min_interval, burst_limit, Box::new(MemoryStore::new()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateLimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RateLimiterState {
        *self.lock()
    }

    /// Milliseconds until the next request is permitted.
    pub fn get_wait_ms(&self, now_ms: i64) -> u64 {
        let state = self.lock();
        if state.tokens > 0 {
            return 0;
        }
        let elapsed = now_ms.saturating_sub(state.last_request_at_ms);
        let remaining = self.min_interval_ms.saturating_sub(elapsed);
        remaining.clamp(0, self.min_interval_ms) as u64
    }

    /// Consumes a token, refilling first if the window since the last request elapsed.
    pub fn mark_request(&self, now_ms: i64) {
        let snapshot = {
            let mut state = self.lock();
            if now_ms.saturating_sub(state.last_request_at_ms) >= self.min_interval_ms {
                state.tokens = self.burst_limit;
            }
            state.tokens = state.tokens.saturating_sub(1);
            state.last_request_at_ms = now_ms;
            *state
        };
        self.store.save(&snapshot);
    }

    pub fn next_allowed_at_ms(&self, now_ms: i64) -> i64 {
        now_ms + self.get_wait_ms(now_ms) as i64
    }

    pub fn progress(&self, now_ms: i64) -> f64 {
        let wait = self.get_wait_ms(now_ms);
        if wait == 0 || self.min_interval_ms == 0 {
            return 1.0;
        }
        (1.0 - wait as f64 / self.min_interval_ms as f64).clamp(0.0, 1.0)
    }

    pub fn status(&self, now_ms: i64) -> RateLimitStatus {
        let wait_ms = self.get_wait_ms(now_ms);
        RateLimitStatus {
            wait_ms,
            next_allowed_at_ms: now_ms + wait_ms as i64,
            progress: self.progress(now_ms),
            ready: wait_ms == 0,
        }
    }

    /// Admin override: full token budget, no cooldown.
    pub fn reset(&self) {
        let snapshot = {
            let mut state = self.lock();
            state.last_request_at_ms = 0;
            state.tokens = self.burst_limit;
            *state
        };
        self.store.save(&snapshot);
    }

    /// Waits until a request is permitted, then records it. Returns the time waited.
    pub async fn acquire(&self) -> Duration {
        let started = tokio::time::Instant::now();
        loop {
            let wait = self.get_wait_ms(now_ms());
            if wait == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(wait).min(POLL_STEP)).await;
        }
        self.mark_request(now_ms());
        started.elapsed()
    }
}
