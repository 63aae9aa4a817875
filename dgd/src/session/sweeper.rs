//! Periodic session cleanup
//!
//! The sweeper forces stuck sessions to timeout and purges terminal
//! sessions once their retention window passes. Time comes from a
//! [`Clock`] so the whole lifecycle can be tested without sleeping.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::SessionConfig;

use super::store::{SessionStore, SweepOutcome};

/// Source of wall-clock time in Unix milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Real time via chrono
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests
#[cfg(test)]
pub struct MockClock {
    now: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl MockClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(now_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now_ms(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// The Sweeper runs cleanup passes over the session store on a fixed
/// interval.
pub struct Sweeper {
    store: Arc<SessionStore>,
    config: SessionConfig,
}

impl Sweeper {
    pub fn new(store: Arc<SessionStore>) -> Self {
        let config = store.config().clone();
        Self { store, config }
    }

    /// Run the sweep loop
    ///
    /// This runs until the task is dropped or aborted.
    pub async fn run(self) {
        info!(
            interval_secs = self.config.sweep_interval_secs,
            timeout_secs = self.config.timeout_secs,
            "Sweeper started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    /// Run a single sweep pass (useful for testing)
    pub async fn sweep_once(&self) -> SweepOutcome {
        let outcome = self
            .store
            .sweep(self.config.timeout_ms(), self.config.purge_after_ms())
            .await;

        if outcome.timed_out.is_empty() && outcome.purged.is_empty() {
            debug!("Sweeper::sweep_once: nothing to clean");
        } else {
            info!(
                timed_out = outcome.timed_out.len(),
                purged = outcome.purged.len(),
                "Sweeper: cleanup pass finished"
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{SessionRequest, SessionStatus};
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
        // sanity: after 2020
        assert!(a > 1_577_836_800_000);
    }

    #[test]
    fn test_mock_clock_advances() {
        let clock = MockClock::new(5_000);
        assert_eq!(clock.now_ms(), 5_000);

        clock.advance(250);
        assert_eq!(clock.now_ms(), 5_250);

        clock.set(1_000);
        assert_eq!(clock.now_ms(), 1_000);
    }

    #[tokio::test]
    async fn test_sweep_once_applies_config_windows() {
        let clock = Arc::new(MockClock::new(0));
        let mut config = SessionConfig::default();
        config.timeout_secs = 10;

        let store = Arc::new(SessionStore::with_clock(config, clock.clone()));
        let session = store.create(SessionRequest::new("stalled work")).await.unwrap();

        let sweeper = Sweeper::new(store.clone());

        // Inside the timeout: untouched
        clock.advance(9_000);
        let outcome = sweeper.sweep_once().await;
        assert!(outcome.timed_out.is_empty());

        // Past the timeout: forced to timeout
        clock.advance(2_000);
        let outcome = sweeper.sweep_once().await;
        assert_eq!(outcome.timed_out, vec![session.id.clone()]);
        assert_eq!(store.get(&session.id).await.unwrap().status, SessionStatus::Timeout);

        // Past twice the timeout: purged
        clock.advance(10_000);
        let outcome = sweeper.sweep_once().await;
        assert_eq!(outcome.purged, vec![session.id.clone()]);
        assert!(store.get(&session.id).await.is_none());
    }
}
