//! Ordered diagram validation
//!
//! Checks run in fixed groups and short-circuit between groups: source
//! bounds, delimiter balance, type detection, structure, size limits.
//! Within a group every violation is collected, so one pass reports all
//! unmatched brackets or all exceeded limits at once.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::normalize::normalize;
use crate::stats;
use crate::syntax;
use crate::types::{DiagramType, IssueKind, ValidationIssue, ValidationResult};

/// Hard limits on accepted diagram sources
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_source_len: usize,
    pub max_nodes: usize,
    pub max_connections: usize,
    pub max_subgraphs: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_source_len: 50_000,
            max_nodes: 500,
            max_connections: 1_000,
            max_subgraphs: 50,
        }
    }
}

/// Validates diagram sources against syntax, structure, and size rules
#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: Limits,
}

impl Validator {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Run all check groups against `source`
    ///
    /// `expected` rejects a successfully detected type that differs from
    /// the one requested. Issues keep check order; the normalized source
    /// and stats are only present on a fully valid result.
    pub fn validate(&self, source: &str, expected: Option<DiagramType>) -> ValidationResult {
        debug!("validate: {} chars, expected={:?}", source.len(), expected);

        let detected = DiagramType::detect(source);

        if source.trim().is_empty() {
            return finish(
                detected,
                vec![ValidationIssue::new(IssueKind::EmptySource, "diagram source is empty")],
            );
        }
        let len = source.chars().count();
        if len > self.limits.max_source_len {
            return finish(
                detected,
                vec![ValidationIssue::with_detail(
                    IssueKind::SourceTooLong,
                    format!(
                        "source length {len} exceeds maximum {}",
                        self.limits.max_source_len
                    ),
                    len.to_string(),
                )],
            );
        }

        let delimiter_issues = syntax::scan_delimiters(source);
        if !delimiter_issues.is_empty() {
            return finish(detected, delimiter_issues);
        }

        let detected = match detected {
            Some(ty) => ty,
            None => {
                return finish(
                    None,
                    vec![ValidationIssue::new(
                        IssueKind::UnknownDiagramType,
                        "no known diagram declaration found on the first line",
                    )],
                );
            }
        };
        if let Some(expected) = expected {
            if expected != detected {
                return finish(
                    Some(detected),
                    vec![ValidationIssue::with_detail(
                        IssueKind::TypeMismatch,
                        format!("expected {expected} diagram, detected {detected}"),
                        detected.to_string(),
                    )],
                );
            }
        }

        let mut issues = Vec::new();
        let nodes = syntax::scan_nodes(source);
        for id in &nodes.duplicates {
            issues.push(ValidationIssue::with_detail(
                IssueKind::DuplicateNode,
                format!("node id '{id}' is declared more than once"),
                id.clone(),
            ));
        }
        let connections = syntax::count_connections(source);
        if nodes.distinct_count() > 1 && connections == 0 {
            issues.push(ValidationIssue::new(
                IssueKind::MissingConnections,
                "diagram declares multiple nodes but no connections",
            ));
        }
        if !issues.is_empty() {
            return finish(Some(detected), issues);
        }

        let node_count = nodes.distinct_count();
        let subgraphs = syntax::count_subgraphs(source);
        if node_count > self.limits.max_nodes {
            issues.push(ValidationIssue::with_detail(
                IssueKind::TooManyNodes,
                format!("node count {node_count} exceeds limit {}", self.limits.max_nodes),
                node_count.to_string(),
            ));
        }
        if connections > self.limits.max_connections {
            issues.push(ValidationIssue::with_detail(
                IssueKind::TooManyConnections,
                format!(
                    "connection count {connections} exceeds limit {}",
                    self.limits.max_connections
                ),
                connections.to_string(),
            ));
        }
        if subgraphs > self.limits.max_subgraphs {
            issues.push(ValidationIssue::with_detail(
                IssueKind::TooManySubgraphs,
                format!(
                    "subgraph count {subgraphs} exceeds limit {}",
                    self.limits.max_subgraphs
                ),
                subgraphs.to_string(),
            ));
        }
        if !issues.is_empty() {
            return finish(Some(detected), issues);
        }

        let normalized = normalize(source);
        let diagram_stats = stats::analyze(&normalized);
        debug!(
            "validate: ok, type={detected}, nodes={}, connections={}",
            diagram_stats.node_count, diagram_stats.connection_count
        );
        ValidationResult {
            id: Uuid::now_v7().to_string(),
            is_valid: true,
            detected_type: Some(detected),
            issues: Vec::new(),
            normalized: Some(normalized),
            stats: Some(diagram_stats),
            checked_at: Utc::now().timestamp_millis(),
        }
    }
}

fn finish(detected: Option<DiagramType>, issues: Vec<ValidationIssue>) -> ValidationResult {
    ValidationResult {
        id: Uuid::now_v7().to_string(),
        is_valid: false,
        detected_type: detected,
        issues,
        normalized: None,
        stats: None,
        checked_at: Utc::now().timestamp_millis(),
    }
}
