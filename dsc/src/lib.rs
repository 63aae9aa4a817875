//! DiagramScript - diagram-text processing toolkit
//!
//! Pure, synchronous routines for working with Mermaid-style diagram
//! sources: pulling diagram code out of free-form model output,
//! validating it, normalizing whitespace, and deriving structural
//! statistics. No I/O, no clocks beyond result timestamps, no network.
//!
//! # Modules
//!
//! - [`extract`] - Diagram-source extraction from raw model responses
//! - [`validate`] - Ordered, short-circuiting validation check groups
//! - [`normalize`] - Idempotent whitespace/indentation canonicalization
//! - [`stats`] - Node/connection counts and complexity tiers
//! - [`optimize`] - Comment stripping and formatting passes
//! - [`syntax`] - Shared low-level scans (brackets, shapes, connectors)

pub mod extract;
pub mod normalize;
pub mod optimize;
pub mod stats;
pub mod syntax;
pub mod types;
pub mod validate;

// Re-export commonly used types
pub use extract::extract_diagram_source;
pub use normalize::normalize;
pub use optimize::{OptimizeOptions, optimize};
pub use stats::analyze;
pub use types::{
    ComplexityTier, DiagramStats, DiagramType, IssueKind, ValidationIssue, ValidationResult,
};
pub use validate::{Limits, Validator};
