//! Session domain types
//!
//! A session tracks one diagram-generation request from submission to a
//! terminal state. All timestamps are Unix milliseconds supplied by the
//! caller, so stores and sweepers can run against a test clock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use diagramscript::{DiagramStats, DiagramType};

use crate::classify::ErrorKind;

/// Session lifecycle status
///
/// Progress is strictly forward: pending, processing, generating,
/// validating, then one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepted, not yet picked up
    #[default]
    Pending,
    /// Prompt composition in progress
    Processing,
    /// Waiting on the generation service
    Generating,
    /// Checking the generated diagram
    Validating,
    /// Finished with a usable diagram
    Completed,
    /// Finished without a usable diagram
    Failed,
    /// Forced to a terminal state by the sweeper
    Timeout,
}

impl SessionStatus {
    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }

    /// Whether a transition to `next` is legal
    ///
    /// The happy path is linear; any non-terminal status may fail or
    /// time out. Terminal states accept nothing, which is what makes
    /// stale updates no-ops.
    pub fn can_transition(&self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Timeout => true,
            Self::Processing => *self == Self::Pending,
            Self::Generating => *self == Self::Processing,
            Self::Validating => *self == Self::Generating,
            Self::Completed => *self == Self::Validating,
            Self::Pending => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Generating => write!(f, "generating"),
            Self::Validating => write!(f, "validating"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Per-request knobs beyond the requirement text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Requested diagram type; `None` lets the model choose
    #[serde(default)]
    pub diagram_type: Option<DiagramType>,

    /// Model override for this request
    #[serde(default)]
    pub model: Option<String>,
}

/// What the caller asked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Natural-language requirement to diagram
    pub requirement: String,

    /// Product kind the requirement belongs to (e.g. "web-app")
    #[serde(default)]
    pub product_type: Option<String>,

    /// Implementation shape (e.g. "microservices")
    #[serde(default)]
    pub implement_type: Option<String>,

    #[serde(default)]
    pub options: RequestOptions,
}

impl SessionRequest {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            ..Self::default()
        }
    }

    /// Identity hash for deduplication
    ///
    /// Identity is requirement plus product and implement type; options
    /// are presentation knobs and do not participate. Requirement text
    /// is compared trimmed and case-insensitively.
    pub fn fingerprint(&self) -> String {
        let input = format!(
            "{}:{}:{}",
            self.requirement.trim().to_lowercase(),
            self.product_type.as_deref().unwrap_or(""),
            self.implement_type.as_deref().unwrap_or(""),
        );
        hex::encode(Sha256::digest(input.as_bytes()))
    }
}

/// Where a session currently is, for status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Stage label matching the session status
    pub stage: String,

    /// Rough completion percentage
    pub percent: u8,

    /// Human-readable progress message
    pub message: String,

    /// Stages already finished, in order
    pub completed_steps: Vec<String>,
}

impl Progress {
    pub fn at(stage: impl Into<String>, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            percent: percent.min(100),
            message: message.into(),
            completed_steps: Vec::new(),
        }
    }

    pub fn with_completed(mut self, steps: Vec<String>) -> Self {
        self.completed_steps = steps;
        self
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::at("initializing", 0, "Session created")
    }
}

/// The diagram a completed session produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Normalized diagram source
    pub diagram_source: String,

    /// Detected diagram type
    pub diagram_type: DiagramType,

    /// Structural statistics of the final source
    pub stats: DiagramStats,

    /// True when a canned fallback was served instead of a generation
    #[serde(default)]
    pub degraded: bool,
}

/// Why a session ended without a diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFailure {
    /// Classified failure kind
    pub kind: ErrorKind,

    /// User-facing message
    pub message: String,

    /// Optional internal detail for logs and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SessionFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Failure recorded when the sweeper forces a timeout
    pub fn timed_out(age_ms: i64) -> Self {
        Self::new(ErrorKind::Timeout, ErrorKind::Timeout.user_message())
            .with_detail(format!("session exceeded its deadline after {age_ms}ms"))
    }
}

/// Tracks one diagram-generation request end to end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: String,

    /// Current status
    pub status: SessionStatus,

    /// The originating request
    pub request: SessionRequest,

    /// Polling progress
    pub progress: Progress,

    /// Final diagram, present only on completed sessions
    pub result: Option<SessionOutcome>,

    /// Final failure, present only on failed or timed-out sessions
    pub error: Option<SessionFailure>,

    /// Generation retries spent beyond the first attempt
    pub retry_count: u32,

    /// Milliseconds spent per stage
    pub stage_timings: HashMap<String, u64>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,

    /// When work started (first move off pending)
    pub started_at: Option<i64>,

    /// When a terminal state was reached
    pub ended_at: Option<i64>,

    /// Total wall time from start to terminal state
    pub processing_ms: Option<u64>,
}

impl Session {
    /// Create a new pending session
    pub fn new(request: SessionRequest, now: i64) -> Self {
        Self {
            id: generate_session_id(&request.requirement),
            status: SessionStatus::Pending,
            request,
            progress: Progress::default(),
            result: None,
            error: None,
            retry_count: 0,
            stage_timings: HashMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            processing_ms: None,
        }
    }

    /// Check if the session is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Age since creation
    pub fn age_ms(&self, now: i64) -> i64 {
        now - self.created_at
    }

    /// Apply a patch, stamping timing fields on the transitions it makes
    ///
    /// The caller is responsible for transition legality; the store
    /// checks `can_transition` before calling this.
    pub fn apply(&mut self, patch: SessionPatch, now: i64) {
        if let Some(status) = patch.status {
            if self.started_at.is_none() && status != SessionStatus::Pending {
                self.started_at = Some(now);
            }
            if status.is_terminal() {
                self.ended_at = Some(now);
                let start = self.started_at.unwrap_or(self.created_at);
                self.processing_ms = Some((now - start).max(0) as u64);
            }
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some((stage, ms)) = patch.stage_timing {
            self.stage_timings.insert(stage, ms);
        }
        self.updated_at = now;
    }
}

/// Partial update merged into a session by the store
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub progress: Option<Progress>,
    pub result: Option<SessionOutcome>,
    pub error: Option<SessionFailure>,
    pub retry_count: Option<u32>,
    pub stage_timing: Option<(String, u64)>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_result(mut self, result: SessionOutcome) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: SessionFailure) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_stage_timing(mut self, stage: impl Into<String>, ms: u64) -> Self {
        self.stage_timing = Some((stage.into(), ms));
        self
    }
}

/// Generate a session ID: `{6-char-hex}-sess-{slug}`
pub fn generate_session_id(requirement: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    let slug = slugify(requirement);
    format!("{}-sess-{}", hex_prefix, slug)
}

/// Slugify requirement text for use in IDs, capped at a few words
fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(5)
        .collect::<Vec<_>>()
        .join("-")
}
