//! Shared vocabulary for diagram-script processing
//!
//! Diagram type detection, complexity tiers, statistics, and the
//! validation result/issue types returned by the validator.

use serde::{Deserialize, Serialize};

/// Known diagram types, detected from the declaration line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramType {
    Flowchart,
    Sequence,
    Class,
    State,
    Er,
    Gantt,
    Pie,
    Mindmap,
    Journey,
}

/// Declaration keywords in detection order (longer variants before their
/// prefixes, e.g. `stateDiagram-v2` before `stateDiagram`)
pub(crate) const TYPE_KEYWORDS: &[(&str, DiagramType)] = &[
    ("flowchart", DiagramType::Flowchart),
    ("graph", DiagramType::Flowchart),
    ("sequenceDiagram", DiagramType::Sequence),
    ("classDiagram", DiagramType::Class),
    ("stateDiagram-v2", DiagramType::State),
    ("stateDiagram", DiagramType::State),
    ("erDiagram", DiagramType::Er),
    ("gantt", DiagramType::Gantt),
    ("pie", DiagramType::Pie),
    ("mindmap", DiagramType::Mindmap),
    ("journey", DiagramType::Journey),
];

impl DiagramType {
    /// Detect the diagram type from the first meaningful line of `source`
    ///
    /// Skips blank lines and `%%` comment lines. Returns `None` when no
    /// known declaration keyword starts the line.
    pub fn detect(source: &str) -> Option<Self> {
        let line = declaration_line(source)?;
        TYPE_KEYWORDS
            .iter()
            .find(|(kw, _)| {
                line == *kw
                    || line
                        .strip_prefix(kw)
                        .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace()))
            })
            .map(|(_, ty)| *ty)
    }

    /// Primary declaration keyword for this type
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Flowchart => "flowchart",
            Self::Sequence => "sequenceDiagram",
            Self::Class => "classDiagram",
            Self::State => "stateDiagram-v2",
            Self::Er => "erDiagram",
            Self::Gantt => "gantt",
            Self::Pie => "pie",
            Self::Mindmap => "mindmap",
            Self::Journey => "journey",
        }
    }
}

impl std::fmt::Display for DiagramType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flowchart => write!(f, "flowchart"),
            Self::Sequence => write!(f, "sequence"),
            Self::Class => write!(f, "class"),
            Self::State => write!(f, "state"),
            Self::Er => write!(f, "er"),
            Self::Gantt => write!(f, "gantt"),
            Self::Pie => write!(f, "pie"),
            Self::Mindmap => write!(f, "mindmap"),
            Self::Journey => write!(f, "journey"),
        }
    }
}

impl std::str::FromStr for DiagramType {
    type Err = String;

    /// Parses the names produced by [`Display`](std::fmt::Display),
    /// plus `graph` as an alias for flowchart
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flowchart" | "graph" => Ok(Self::Flowchart),
            "sequence" => Ok(Self::Sequence),
            "class" => Ok(Self::Class),
            "state" => Ok(Self::State),
            "er" => Ok(Self::Er),
            "gantt" => Ok(Self::Gantt),
            "pie" => Ok(Self::Pie),
            "mindmap" => Ok(Self::Mindmap),
            "journey" => Ok(Self::Journey),
            _ => Err(format!(
                "unknown diagram type: {}. Use: flowchart, sequence, class, state, er, gantt, pie, mindmap, or journey",
                s
            )),
        }
    }
}

/// First non-blank, non-comment line of a source, trimmed
pub(crate) fn declaration_line(source: &str) -> Option<&str> {
    source
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("%%"))
}

/// Complexity tier derived from node and connection counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Medium,
    Complex,
    VeryComplex,
}

impl ComplexityTier {
    /// Tier for a weighted score of `node_count + connection_count / 2`
    pub fn from_score(score: f64) -> Self {
        if score <= 10.0 {
            Self::Simple
        } else if score <= 30.0 {
            Self::Medium
        } else if score <= 100.0 {
            Self::Complex
        } else {
            Self::VeryComplex
        }
    }
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
            Self::VeryComplex => write!(f, "very_complex"),
        }
    }
}

/// Structural statistics for a diagram source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramStats {
    /// Total line count
    pub line_count: usize,
    /// Distinct shaped node declarations
    pub node_count: usize,
    /// Connector occurrences (arrow, line, dotted, thick)
    pub connection_count: usize,
    /// Any style/classDef/linkStyle directives present
    pub has_styles: bool,
    /// Any subgraph blocks present
    pub has_subgraphs: bool,
    /// Any `|label|` edge labels present
    pub has_labels: bool,
    /// Complexity tier for the weighted node/connection score
    pub complexity: ComplexityTier,
}

/// Kind of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptySource,
    SourceTooLong,
    MalformedSyntax,
    UnknownDiagramType,
    TypeMismatch,
    DuplicateNode,
    MissingConnections,
    TooManyNodes,
    TooManyConnections,
    TooManySubgraphs,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySource => write!(f, "empty_source"),
            Self::SourceTooLong => write!(f, "source_too_long"),
            Self::MalformedSyntax => write!(f, "malformed_syntax"),
            Self::UnknownDiagramType => write!(f, "unknown_diagram_type"),
            Self::TypeMismatch => write!(f, "type_mismatch"),
            Self::DuplicateNode => write!(f, "duplicate_node"),
            Self::MissingConnections => write!(f, "missing_connections"),
            Self::TooManyNodes => write!(f, "too_many_nodes"),
            Self::TooManyConnections => write!(f, "too_many_connections"),
            Self::TooManySubgraphs => write!(f, "too_many_subgraphs"),
        }
    }
}

/// A single structured validation issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Issue category
    pub kind: IssueKind,
    /// Human-readable description
    pub message: String,
    /// Optional machine-oriented detail (position, offending identifier)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(kind: IssueKind, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: Some(detail.into()),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Outcome of a validation run, immutable once returned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Unique id for this validation run
    pub id: String,
    /// True when every check group passed
    pub is_valid: bool,
    /// Diagram type detected from the declaration line, when one was found
    pub detected_type: Option<DiagramType>,
    /// Issues in check order; empty when valid
    pub issues: Vec<ValidationIssue>,
    /// Normalized source, present iff valid
    pub normalized: Option<String>,
    /// Structural statistics, present iff valid
    pub stats: Option<DiagramStats>,
    /// Unix-millisecond timestamp of the run
    pub checked_at: i64,
}

impl ValidationResult {
    /// First issue of the given kind, if any
    pub fn first_issue(&self, kind: IssueKind) -> Option<&ValidationIssue> {
        self.issues.iter().find(|i| i.kind == kind)
    }

    /// Count of issues of the given kind
    pub fn issue_count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}
