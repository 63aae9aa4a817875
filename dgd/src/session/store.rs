//! In-memory session store
//!
//! Owns every [`Session`] in the process. All mutations go through one
//! mutex, so per-id updates are totally ordered and the cleanup sweep
//! never observes a half-applied change.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::classify::ErrorKind;
use crate::config::SessionConfig;

use super::sweeper::{Clock, SystemClock};
use super::types::{Session, SessionFailure, SessionPatch, SessionRequest, SessionStatus};

/// Errors reported synchronously by store operations
///
/// Only creation and explicit lookups surface errors to callers; once a
/// session is accepted, pipeline failures land on the session itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session capacity reached ({active}/{max})")]
    CapacityExceeded { active: usize, max: usize },

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("illegal transition for session {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: SessionStatus,
        to: SessionStatus,
    },
}

/// Aggregate counters, updated as sessions move through the store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Sessions created (dedup hits excluded)
    pub created: u64,

    /// Create calls answered with an existing session
    pub deduped: u64,

    /// Sessions currently in a non-terminal state
    pub active: u64,

    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,

    /// Running average wall time of terminal sessions
    pub avg_processing_ms: f64,
}

/// What one cleanup pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepOutcome {
    /// Sessions forced to timeout
    pub timed_out: Vec<String>,

    /// Terminal sessions removed entirely
    pub purged: Vec<String>,
}

/// Internal state protected by mutex
struct StoreInner {
    /// Sessions by id
    sessions: HashMap<String, Session>,

    /// Statistics
    stats: StoreStats,
}

impl StoreInner {
    /// Merge a patch into a stored session, enforcing the state machine
    ///
    /// Updates to a terminal session are discarded without error; that is
    /// how stale pipeline work and cancellation races resolve themselves.
    fn apply_patch(&mut self, id: &str, patch: SessionPatch, now: i64) -> Result<Session, StoreError> {
        let Some(session) = self.sessions.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        if session.is_terminal() {
            debug!(session_id = %id, status = %session.status, "SessionStore: stale update discarded");
            return Ok(session.clone());
        }

        if let Some(next) = patch.status {
            if !session.status.can_transition(next) {
                return Err(StoreError::InvalidTransition {
                    id: id.to_string(),
                    from: session.status,
                    to: next,
                });
            }
        }

        let entering_terminal = patch.status.map(|s| s.is_terminal()).unwrap_or(false);
        session.apply(patch, now);
        let snapshot = session.clone();

        if entering_terminal {
            self.record_terminal(&snapshot);
        }

        Ok(snapshot)
    }

    /// Roll aggregate counters when a session reaches a terminal state
    fn record_terminal(&mut self, session: &Session) {
        self.stats.active = self.stats.active.saturating_sub(1);
        match session.status {
            SessionStatus::Completed => self.stats.completed += 1,
            SessionStatus::Failed => self.stats.failed += 1,
            SessionStatus::Timeout => self.stats.timed_out += 1,
            _ => {}
        }

        if let Some(ms) = session.processing_ms {
            let n = self.stats.completed + self.stats.failed + self.stats.timed_out;
            if n > 0 {
                let delta = ms as f64 - self.stats.avg_processing_ms;
                self.stats.avg_processing_ms += delta / n as f64;
            }
        }
    }
}

/// The SessionStore owns session lifecycle: creation with dedup and
/// capacity limits, state-machine enforcement, and timeout sweeping.
pub struct SessionStore {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<StoreInner>,
}

impl SessionStore {
    /// Create a new store with the given configuration
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store driven by an explicit clock
    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        debug!(?config, "SessionStore::new: called");
        Self {
            config,
            clock,
            inner: Mutex::new(StoreInner {
                sessions: HashMap::new(),
                stats: StoreStats::default(),
            }),
        }
    }

    /// Create a session, or return an existing duplicate
    ///
    /// Validation and capacity errors are the only failures a submitter
    /// ever sees; everything after acceptance is recorded on the session.
    pub async fn create(&self, request: SessionRequest) -> Result<Session, StoreError> {
        validate_request(&request, &self.config)?;

        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;

        // Check capacity
        if inner.stats.active as usize >= self.config.max_active {
            debug!(
                active = inner.stats.active,
                max = self.config.max_active,
                "SessionStore::create: capacity reached"
            );
            return Err(StoreError::CapacityExceeded {
                active: inner.stats.active as usize,
                max: self.config.max_active,
            });
        }

        // Duplicate detection: identical request inside the dedup window
        // collapses onto the earliest-started live session.
        let fingerprint = request.fingerprint();
        let window_ms = self.config.dedup_window_ms();
        let duplicate = inner
            .sessions
            .values()
            .filter(|s| !matches!(s.status, SessionStatus::Failed | SessionStatus::Timeout))
            .filter(|s| {
                let start = s.started_at.unwrap_or(s.created_at);
                now - start <= window_ms
            })
            .filter(|s| s.request.fingerprint() == fingerprint)
            .min_by_key(|s| s.started_at.unwrap_or(s.created_at))
            .cloned();

        if let Some(existing) = duplicate {
            inner.stats.deduped += 1;
            debug!(
                session_id = %existing.id,
                "SessionStore::create: duplicate request, reusing session"
            );
            return Ok(existing);
        }

        let session = Session::new(request, now);
        inner.sessions.insert(session.id.clone(), session.clone());
        inner.stats.created += 1;
        inner.stats.active += 1;

        info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Look up a session by id
    pub async fn get(&self, id: &str) -> Option<Session> {
        let inner = self.inner.lock().await;
        inner.sessions.get(id).cloned()
    }

    /// Merge a patch into a session
    ///
    /// Rejects illegal transitions; silently discards updates to sessions
    /// that already went terminal.
    pub async fn update(&self, id: &str, patch: SessionPatch) -> Result<Session, StoreError> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        inner.apply_patch(id, patch, now)
    }

    /// Remove a session entirely
    pub async fn delete(&self, id: &str) -> Result<Session, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.sessions.remove(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        if !session.is_terminal() {
            inner.stats.active = inner.stats.active.saturating_sub(1);
        }

        debug!(session_id = %id, "SessionStore::delete: session removed");
        Ok(session)
    }

    /// Cancel a session
    ///
    /// Flips a non-terminal session to failed immediately. In-flight work
    /// is not aborted; its eventual updates are discarded as stale.
    /// Cancelling an already-terminal session is a no-op.
    pub async fn cancel(&self, id: &str) -> Result<Session, StoreError> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;

        let patch = SessionPatch::new()
            .with_status(SessionStatus::Failed)
            .with_error(SessionFailure::new(
                ErrorKind::System,
                "Session was cancelled before completion",
            ));

        let session = inner.apply_patch(id, patch, now)?;
        info!(session_id = %id, "Session cancelled");
        Ok(session)
    }

    /// All sessions, oldest first
    pub async fn list(&self) -> Vec<Session> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<Session> = inner.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Sessions currently in a non-terminal state
    pub async fn active_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.sessions.values().filter(|s| !s.status.is_terminal()).count()
    }

    /// Snapshot of aggregate counters
    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.lock().await;
        inner.stats.clone()
    }

    /// One cleanup pass over the whole store
    ///
    /// Runs entirely under the store lock so it never interleaves with a
    /// request-driven mutation. Non-terminal sessions older than
    /// `timeout_ms` are forced to timeout; terminal sessions older than
    /// `purge_after_ms` are removed.
    pub async fn sweep(&self, timeout_ms: i64, purge_after_ms: i64) -> SweepOutcome {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;
        let mut outcome = SweepOutcome::default();

        let expired: Vec<(String, i64)> = inner
            .sessions
            .values()
            .filter(|s| !s.is_terminal() && s.age_ms(now) > timeout_ms)
            .map(|s| (s.id.clone(), s.age_ms(now)))
            .collect();

        for (id, age_ms) in expired {
            let patch = SessionPatch::new()
                .with_status(SessionStatus::Timeout)
                .with_error(SessionFailure::timed_out(age_ms));
            // Apply cannot fail here: the session exists and is non-terminal.
            if inner.apply_patch(&id, patch, now).is_ok() {
                debug!(session_id = %id, age_ms, "SessionStore::sweep: session timed out");
                outcome.timed_out.push(id);
            }
        }

        let stale: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.is_terminal() && s.age_ms(now) > purge_after_ms)
            .map(|s| s.id.clone())
            .collect();

        for id in stale {
            inner.sessions.remove(&id);
            debug!(session_id = %id, "SessionStore::sweep: terminal session purged");
            outcome.purged.push(id);
        }

        outcome
    }

    /// Drop every session and zero the counters (test hook)
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.sessions.clear();
        inner.stats = StoreStats::default();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

/// Reject malformed requests before they reach the map
fn validate_request(request: &SessionRequest, config: &SessionConfig) -> Result<(), StoreError> {
    if request.requirement.trim().is_empty() {
        return Err(StoreError::InvalidRequest("requirement must not be empty".to_string()));
    }

    let chars = request.requirement.chars().count();
    if chars > config.max_requirement_chars {
        return Err(StoreError::InvalidRequest(format!(
            "requirement is {chars} characters, maximum is {}",
            config.max_requirement_chars
        )));
    }

    if let Some(product_type) = &request.product_type {
        if product_type.trim().is_empty() {
            return Err(StoreError::InvalidRequest(
                "product_type must not be blank when provided".to_string(),
            ));
        }
    }

    if let Some(implement_type) = &request.implement_type {
        if implement_type.trim().is_empty() {
            return Err(StoreError::InvalidRequest(
                "implement_type must not be blank when provided".to_string(),
            ));
        }
    }

    Ok(())
}
