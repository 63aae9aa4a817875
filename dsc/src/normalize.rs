//! Whitespace normalization
//!
//! Canonicalizes a diagram source before hashing, caching, or rendering.
//! Normalization is idempotent: applying it to its own output yields the
//! same bytes.

/// Normalize line endings, tabs, blank runs, and indentation
///
/// The first content line keeps indent zero; every following line is
/// re-indented two spaces per subgraph-nesting level below it.
pub fn normalize(source: &str) -> String {
    let unified = source.replace("\r\n", "\n").replace('\r', "\n");

    let mut content: Vec<String> = Vec::new();
    let mut last_blank = false;
    for line in unified.lines() {
        let trimmed = line.replace('\t', "  ").trim().to_string();
        if trimmed.is_empty() {
            // blank runs collapse to one, never before the first content line
            if !content.is_empty() && !last_blank {
                content.push(String::new());
                last_blank = true;
            }
        } else {
            content.push(trimmed);
            last_blank = false;
        }
    }
    while content.last().is_some_and(|l| l.is_empty()) {
        content.pop();
    }

    let mut out: Vec<String> = Vec::with_capacity(content.len());
    let mut depth: usize = 0;
    let mut seen_header = false;
    for line in &content {
        if line.is_empty() {
            out.push(String::new());
            continue;
        }
        if !seen_header {
            seen_header = true;
            out.push(line.clone());
            continue;
        }
        let level = if line == "end" {
            depth = depth.saturating_sub(1);
            1 + depth
        } else if line == "subgraph" || line.starts_with("subgraph ") {
            let opened_at = 1 + depth;
            depth += 1;
            opened_at
        } else {
            1 + depth
        };
        out.push(format!("{}{}", "  ".repeat(level), line));
    }

    out.join("\n")
}
