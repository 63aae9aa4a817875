//! Diagram-source extraction from free-form model output
//!
//! Model responses wrap diagram code in markdown fences, prose, or both.
//! Extraction tries three strategies in order: first fenced code block,
//! then a slice starting at the first diagram-declaration line, then the
//! whole input verbatim.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::TYPE_KEYWORDS;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap());

/// Pull the diagram source out of a raw model response
///
/// Deterministic and side-effect free; always returns trimmed text, which
/// may still fail validation downstream.
pub fn extract_diagram_source(raw: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(raw) {
        return caps[1].trim().to_string();
    }

    if let Some(idx) = raw.lines().position(|l| is_declaration(l.trim())) {
        let slice: Vec<&str> = raw
            .lines()
            .skip(idx)
            .take_while(|l| {
                let t = l.trim();
                !t.is_empty() && !t.starts_with('#') && !t.starts_with("```")
            })
            .collect();
        return slice.join("\n").trim().to_string();
    }

    raw.trim().to_string()
}

fn is_declaration(line: &str) -> bool {
    TYPE_KEYWORDS.iter().any(|(kw, _)| {
        line == *kw
            || line
                .strip_prefix(kw)
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace()))
    })
}
