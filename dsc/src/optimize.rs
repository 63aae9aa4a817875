//! Source cleanup for rendering
//!
//! Optional passes applied before a source is handed to a renderer:
//! comment stripping, blank-line collapsing, and indentation formatting.
//! None of the passes change node or connection counts.

use crate::normalize::normalize;

/// Which cleanup passes to apply
#[derive(Debug, Clone, Copy)]
pub struct OptimizeOptions {
    /// Drop `%%` comment lines
    pub strip_comments: bool,
    /// Re-derive indentation (implies blank-line collapsing)
    pub format_indent: bool,
    /// Collapse runs of blank lines to one
    pub collapse_blank_lines: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            strip_comments: true,
            format_indent: true,
            collapse_blank_lines: true,
        }
    }
}

/// Apply the selected cleanup passes to a diagram source
pub fn optimize(source: &str, opts: &OptimizeOptions) -> String {
    let unified = source.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = unified.lines().map(|l| l.trim_end()).collect();

    if opts.strip_comments {
        lines.retain(|l| !l.trim_start().starts_with("%%"));
    }

    if opts.collapse_blank_lines && !opts.format_indent {
        let mut collapsed: Vec<&str> = Vec::with_capacity(lines.len());
        for line in lines {
            if line.trim().is_empty() && collapsed.last().is_some_and(|p| p.trim().is_empty()) {
                continue;
            }
            collapsed.push(line);
        }
        while collapsed.first().is_some_and(|l| l.trim().is_empty()) {
            collapsed.remove(0);
        }
        while collapsed.last().is_some_and(|l| l.trim().is_empty()) {
            collapsed.pop();
        }
        lines = collapsed;
    }

    let joined = lines.join("\n");
    if opts.format_indent {
        normalize(&joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::analyze;

    #[test]
    fn test_strip_comments_preserves_counts() {
        let src = "flowchart TD\n%% layout note\n  A[Start] --> B[End]\n%% done";
        let before = analyze(src);
        let out = optimize(src, &OptimizeOptions::default());
        let after = analyze(&out);
        assert!(!out.contains("%%"));
        assert_eq!(before.node_count, after.node_count);
        assert_eq!(before.connection_count, after.connection_count);
    }

    #[test]
    fn test_collapse_without_reindent() {
        let opts = OptimizeOptions {
            strip_comments: false,
            format_indent: false,
            collapse_blank_lines: true,
        };
        let src = "flowchart TD\n\n\n    A --> B\n\n";
        assert_eq!(optimize(src, &opts), "flowchart TD\n\n    A --> B");
    }

    #[test]
    fn test_all_passes_disabled_keeps_structure() {
        let opts = OptimizeOptions {
            strip_comments: false,
            format_indent: false,
            collapse_blank_lines: false,
        };
        let src = "flowchart TD\n%% keep me\n    A --> B";
        assert_eq!(optimize(src, &opts), src);
    }

    #[test]
    fn test_format_indent_normalizes() {
        let opts = OptimizeOptions {
            strip_comments: true,
            format_indent: true,
            collapse_blank_lines: true,
        };
        let src = "flowchart TD\n      A[Start] --> B[End]";
        assert_eq!(optimize(src, &opts), "flowchart TD\n  A[Start] --> B[End]");
    }
}
