//! Session lifecycle module
//!
//! Sessions move through a linear state machine from pending to a
//! terminal state. The store owns every session and enforces the
//! transitions; the sweeper times out stuck work and purges finished
//! sessions after a retention window.

mod store;
mod sweeper;
mod types;

pub use store::{SessionStore, StoreError, StoreStats, SweepOutcome};
#[cfg(test)]
pub use sweeper::MockClock;
pub use sweeper::{Clock, Sweeper, SystemClock};
pub use types::{
    Progress, RequestOptions, Session, SessionFailure, SessionOutcome, SessionPatch, SessionRequest, SessionStatus,
    generate_session_id,
};
