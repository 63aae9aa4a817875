//! Structural statistics
//!
//! Counts are derived from the same scans validation uses, so a valid
//! result's stats always agree with its checks.

use crate::syntax;
use crate::types::{ComplexityTier, DiagramStats};

/// Analyze a diagram source into statistics
///
/// Complexity weighs connections at half a node:
/// `score = node_count + connection_count / 2`.
pub fn analyze(source: &str) -> DiagramStats {
    let nodes = syntax::scan_nodes(source);
    let node_count = nodes.distinct_count();
    let connection_count = syntax::count_connections(source);
    let score = node_count as f64 + connection_count as f64 / 2.0;

    DiagramStats {
        line_count: source.lines().count(),
        node_count,
        connection_count,
        has_styles: syntax::has_styles(source),
        has_subgraphs: syntax::count_subgraphs(source) > 0,
        has_labels: syntax::has_edge_labels(source),
        complexity: ComplexityTier::from_score(score),
    }
}
