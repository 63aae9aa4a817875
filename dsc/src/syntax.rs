//! Low-level source scanning
//!
//! Bracket-balance checking plus node, connector, and subgraph pattern
//! extraction. These scans are shared by validation and statistics so
//! both report the same counts for the same source.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{IssueKind, ValidationIssue};

/// Shaped node declarations. Alternation order gives the doubled
/// delimiters precedence over their single forms (circle before
/// rounded, hexagon before diamond).
static NODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"([A-Za-z0-9_]+)",
        r"(?:\(\(([^()]*)\)\)",
        r"|\[([^\[\]]*)\]",
        r"|\{\{([^{}]*)\}\}",
        r"|\(([^()]*)\)",
        r"|\{([^{}]*)\})",
    ))
    .unwrap()
});

/// Connector tokens. Arrow must precede plain line so `--->` counts as
/// an arrow rather than a line followed by a dangling `>`.
static CONNECTOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-\.+->)|(==+>)|(--+>)|(---+)").unwrap());

static EDGE_LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|[^|\n]+\|").unwrap());

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());

/// Scan bracket pairs with a stack, reporting every unmatched opener and
/// orphaned closer in scan order. Positions are 1-based line/column in
/// characters. `%%` comment lines are ignored.
pub fn scan_delimiters(source: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut stack: Vec<(char, usize, usize)> = Vec::new();

    for (line_idx, line) in source.lines().enumerate() {
        if line.trim_start().starts_with("%%") {
            continue;
        }
        for (col_idx, ch) in line.chars().enumerate() {
            match ch {
                '(' | '[' | '{' => stack.push((ch, line_idx + 1, col_idx + 1)),
                ')' | ']' | '}' => match stack.last() {
                    Some(&(open, _, _)) if open == opener_for(ch) => {
                        stack.pop();
                    }
                    Some(&(open, _, _)) => {
                        issues.push(ValidationIssue::with_detail(
                            IssueKind::MalformedSyntax,
                            format!(
                                "mismatched '{}' at line {}, column {} (open '{}' expects '{}')",
                                ch,
                                line_idx + 1,
                                col_idx + 1,
                                open,
                                closer_for(open)
                            ),
                            format!("{}:{}", line_idx + 1, col_idx + 1),
                        ));
                    }
                    None => {
                        issues.push(ValidationIssue::with_detail(
                            IssueKind::MalformedSyntax,
                            format!("unexpected '{}' at line {}, column {}", ch, line_idx + 1, col_idx + 1),
                            format!("{}:{}", line_idx + 1, col_idx + 1),
                        ));
                    }
                },
                _ => {}
            }
        }
    }

    // remaining openers report bottom-to-top, which is scan order
    for (ch, line, col) in stack {
        issues.push(ValidationIssue::with_detail(
            IssueKind::MalformedSyntax,
            format!("unclosed '{ch}' at line {line}, column {col}"),
            format!("{line}:{col}"),
        ));
    }

    issues
}

fn opener_for(closer: char) -> char {
    match closer {
        ')' => '(',
        ']' => '[',
        '}' => '{',
        _ => closer,
    }
}

fn closer_for(opener: char) -> char {
    match opener {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        _ => opener,
    }
}

/// Shaped node declarations found in a source
#[derive(Debug, Clone, Default)]
pub struct NodeScan {
    /// Distinct node ids in first-appearance order
    pub ids: Vec<String>,
    /// Ids declared with a shape more than once, in first-repeat order
    pub duplicates: Vec<String>,
}

impl NodeScan {
    pub fn distinct_count(&self) -> usize {
        self.ids.len()
    }
}

/// Extract shaped node declarations, tracking repeated declarations
pub fn scan_nodes(source: &str) -> NodeScan {
    let mut scan = NodeScan::default();
    for line in source.lines() {
        if line.trim_start().starts_with("%%") {
            continue;
        }
        for caps in NODE_PATTERN.captures_iter(line) {
            let id = caps[1].to_string();
            if scan.ids.contains(&id) {
                if !scan.duplicates.contains(&id) {
                    scan.duplicates.push(id);
                }
            } else {
                scan.ids.push(id);
            }
        }
    }
    scan
}

/// Node declarations with their display labels, in declaration order
///
/// A node declared with an empty shape keeps its id as the label.
/// Repeat declarations are ignored; the first one wins.
pub fn node_labels(source: &str) -> Vec<(String, String)> {
    let mut labels: Vec<(String, String)> = Vec::new();
    for line in source.lines() {
        if line.trim_start().starts_with("%%") {
            continue;
        }
        for caps in NODE_PATTERN.captures_iter(line) {
            let id = &caps[1];
            if labels.iter().any(|(existing, _)| existing.as_str() == id) {
                continue;
            }
            let label = (2..=6)
                .filter_map(|i| caps.get(i))
                .map(|m| m.as_str().trim())
                .find(|s| !s.is_empty())
                .unwrap_or(id)
                .to_string();
            labels.push((id.to_string(), label));
        }
    }
    labels
}

/// Directed `(from, to)` pairs for every connector occurrence
///
/// Each fragment between connectors contributes its leading identifier,
/// so chains like `A --> B --> C` yield two pairs. Connectors with a
/// missing endpoint are skipped.
pub fn edge_pairs(source: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in source.lines() {
        if line.trim_start().starts_with("%%") {
            continue;
        }
        let line = EDGE_LABEL_PATTERN.replace_all(line, " ");
        let fragments: Vec<&str> = CONNECTOR_PATTERN.split(&line).collect();
        for window in fragments.windows(2) {
            let from = ID_PATTERN.find(window[0]);
            let to = ID_PATTERN.find(window[1]);
            if let (Some(from), Some(to)) = (from, to) {
                pairs.push((from.as_str().to_string(), to.as_str().to_string()));
            }
        }
    }
    pairs
}

/// Count connector occurrences across all four connector styles
pub fn count_connections(source: &str) -> usize {
    source
        .lines()
        .filter(|l| !l.trim_start().starts_with("%%"))
        .map(|l| CONNECTOR_PATTERN.find_iter(l).count())
        .sum()
}

/// Count `subgraph` block openers
pub fn count_subgraphs(source: &str) -> usize {
    source
        .lines()
        .map(str::trim)
        .filter(|l| *l == "subgraph" || l.starts_with("subgraph "))
        .count()
}

/// Any style, classDef, or linkStyle directive present
pub fn has_styles(source: &str) -> bool {
    source.lines().map(str::trim).any(|l| {
        l.starts_with("style ")
            || l.starts_with("classDef ")
            || l.starts_with("linkStyle ")
            || l.contains(":::")
    })
}

/// Any `|label|` edge label present
pub fn has_edge_labels(source: &str) -> bool {
    EDGE_LABEL_PATTERN.is_match(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_source_has_no_issues() {
        let src = "flowchart TD\n  A[Start] --> B((Mid))\n  B --> C{Choice}";
        assert!(scan_delimiters(src).is_empty());
    }

    #[test]
    fn test_unclosed_opener_cites_position() {
        let src = "flowchart TD\n  A[Start --> B[End]";
        let issues = scan_delimiters(src);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::MalformedSyntax);
        assert!(issues[0].message.contains("line 2, column 4"));
        assert_eq!(issues[0].detail.as_deref(), Some("2:4"));
    }

    #[test]
    fn test_each_unmatched_delimiter_reported() {
        let src = "graph TD\n  A[x\n  B(y\n  C{z";
        let issues = scan_delimiters(src);
        assert_eq!(issues.len(), 3);
        assert!(issues[0].message.contains("'['"));
        assert!(issues[1].message.contains("'('"));
        assert!(issues[2].message.contains("'{'"));
    }

    #[test]
    fn test_orphan_closer_reported() {
        let issues = scan_delimiters("graph TD\n  A] --> B");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("unexpected ']'"));
    }

    #[test]
    fn test_comment_lines_skipped() {
        let src = "flowchart TD\n%% [not a bracket\n  A[ok]";
        assert!(scan_delimiters(src).is_empty());
    }

    #[test]
    fn test_all_five_shapes_counted() {
        let src = "flowchart TD\n  A[Rect]\n  B(Round)\n  C((Circle))\n  D{Diamond}\n  E{{Hex}}";
        let scan = scan_nodes(src);
        assert_eq!(scan.distinct_count(), 5);
        assert!(scan.duplicates.is_empty());
    }

    #[test]
    fn test_doubled_delimiters_take_precedence() {
        let scan = scan_nodes("A((Circle)) --> B{{Hex}}");
        assert_eq!(scan.ids, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_duplicate_declaration_detected() {
        let src = "flowchart TD\n  A[First]\n  A[Again]\n  B[Ok]";
        let scan = scan_nodes(src);
        assert_eq!(scan.distinct_count(), 2);
        assert_eq!(scan.duplicates, vec!["A".to_string()]);
    }

    #[test]
    fn test_reference_without_shape_is_not_a_declaration() {
        let src = "flowchart TD\n  A[Start] --> B[End]\n  A --> B";
        let scan = scan_nodes(src);
        assert_eq!(scan.distinct_count(), 2);
        assert!(scan.duplicates.is_empty());
    }

    #[test]
    fn test_node_labels_in_declaration_order() {
        let src = "flowchart TD\n  A[Start] --> B((Mid))\n  B --> C{Choice}";
        let labels = node_labels(src);
        assert_eq!(
            labels,
            vec![
                ("A".to_string(), "Start".to_string()),
                ("B".to_string(), "Mid".to_string()),
                ("C".to_string(), "Choice".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_label_falls_back_to_id() {
        let labels = node_labels("A[] --> B[ ]");
        assert_eq!(labels[0], ("A".to_string(), "A".to_string()));
        assert_eq!(labels[1], ("B".to_string(), "B".to_string()));
    }

    #[test]
    fn test_edge_pairs_from_chain() {
        let pairs = edge_pairs("flowchart TD\n  A --> B --> C");
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "B".to_string()),
                ("B".to_string(), "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_edge_pairs_with_shapes_and_labels() {
        let pairs = edge_pairs("A[Login] -->|ok| B[Orders]\nB -.-> C\nC ==> D");
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("A".to_string(), "B".to_string()));
        assert_eq!(pairs[1], ("B".to_string(), "C".to_string()));
        assert_eq!(pairs[2], ("C".to_string(), "D".to_string()));
    }

    #[test]
    fn test_edge_pairs_skip_incomplete_connectors() {
        assert!(edge_pairs("flowchart TD\n  -->").is_empty());
        assert!(edge_pairs("no connectors here").is_empty());
    }

    #[test]
    fn test_connector_styles_counted() {
        let src = "A --> B\nB --- C\nC -.-> D\nD ==> E";
        assert_eq!(count_connections(src), 4);
    }

    #[test]
    fn test_long_arrow_counts_once() {
        assert_eq!(count_connections("A ---> B"), 1);
        assert_eq!(count_connections("A -- label --> B"), 1);
    }

    #[test]
    fn test_subgraph_count() {
        let src = "flowchart TD\n  subgraph One\n  A --> B\n  end\n  subgraph Two\n  end";
        assert_eq!(count_subgraphs(src), 2);
    }

    #[test]
    fn test_style_detection() {
        assert!(has_styles("flowchart TD\n  style A fill:#f9f"));
        assert!(has_styles("flowchart TD\n  A:::warn --> B"));
        assert!(!has_styles("flowchart TD\n  A --> B"));
    }

    #[test]
    fn test_edge_label_detection() {
        assert!(has_edge_labels("A -->|yes| B"));
        assert!(!has_edge_labels("A --> B"));
    }
}
