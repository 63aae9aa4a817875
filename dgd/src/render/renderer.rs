//! Renderer collaborator and the built-in layout builder
//!
//! Byte formats (svg, png, pdf) are delegated to an external renderer
//! behind [`DiagramRenderer`]. The json format never leaves the
//! process: it is a deterministic grid layout derived from the parsed
//! node and edge declarations.

use async_trait::async_trait;

use diagramscript::syntax;

use super::types::{DiagramLayout, LayoutEdge, LayoutNode, RenderError, RenderOptions};

/// Fixed node box size in the built-in layout
const NODE_WIDTH: u32 = 120;
const NODE_HEIGHT: u32 = 40;

/// External renderer collaborator for byte output formats
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Produce artifact bytes for a validated, normalized source
    async fn render_bytes(&self, source: &str, options: &RenderOptions) -> Result<Vec<u8>, RenderError>;
}

/// Place nodes on a grid and carry the edges over
///
/// Same source and options always produce the same layout. Edge
/// endpoints that were never declared with a shape still get a box,
/// labelled with their id.
pub fn build_layout(source: &str, options: &RenderOptions) -> DiagramLayout {
    let mut nodes = syntax::node_labels(source);
    let edges = syntax::edge_pairs(source);

    for (from, to) in &edges {
        for id in [from, to] {
            if !nodes.iter().any(|(existing, _)| existing == id) {
                nodes.push((id.clone(), id.clone()));
            }
        }
    }

    let count = nodes.len();
    let cols = ((count as f64).sqrt().ceil() as u32).max(1);
    let rows = (count.div_ceil(cols as usize) as u32).max(1);
    let cell_w = (options.width / cols).max(NODE_WIDTH);
    let cell_h = (options.height / rows).max(NODE_HEIGHT);

    let nodes = nodes
        .into_iter()
        .enumerate()
        .map(|(i, (id, label))| {
            let col = i as u32 % cols;
            let row = i as u32 / cols;
            LayoutNode {
                id,
                label,
                x: col * cell_w + (cell_w - NODE_WIDTH) / 2,
                y: row * cell_h + (cell_h - NODE_HEIGHT) / 2,
                width: NODE_WIDTH,
                height: NODE_HEIGHT,
            }
        })
        .collect();

    DiagramLayout {
        nodes,
        edges: edges.into_iter().map(|(from, to)| LayoutEdge { from, to }).collect(),
        width: options.width,
        height: options.height,
    }
}

#[cfg(test)]
pub mod mock {
    //! Deterministic renderer for tests

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    pub struct MockRenderer {
        fail_marker: Option<String>,
        calls: AtomicUsize,
    }

    impl MockRenderer {
        /// A renderer that always succeeds with deterministic bytes
        pub fn new() -> Self {
            Self {
                fail_marker: None,
                calls: AtomicUsize::new(0),
            }
        }

        /// A renderer that fails for sources containing `marker`
        pub fn failing_on(marker: impl Into<String>) -> Self {
            Self {
                fail_marker: Some(marker.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DiagramRenderer for MockRenderer {
        async fn render_bytes(&self, source: &str, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(marker) = &self.fail_marker {
                if source.contains(marker.as_str()) {
                    return Err(RenderError::Renderer(format!("mock renderer refused {marker:?}")));
                }
            }

            Ok(format!("{}:{}x{}:{}", options.format, options.width, options.height, source.len()).into_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRenderer;
    use super::*;

    const SOURCE: &str = "flowchart TD\n  A[Start] --> B[End]\n  B --> C";

    #[test]
    fn test_layout_positions_are_deterministic() {
        let options = RenderOptions::default();
        let layout = build_layout(SOURCE, &options);

        // three nodes on a 2x2 grid of 400x300 cells
        assert_eq!(layout.nodes.len(), 3);
        let a = &layout.nodes[0];
        assert_eq!((a.id.as_str(), a.x, a.y), ("A", 140, 130));
        let b = &layout.nodes[1];
        assert_eq!((b.id.as_str(), b.x, b.y), ("B", 540, 130));
        let c = &layout.nodes[2];
        assert_eq!((c.id.as_str(), c.x, c.y), ("C", 140, 430));

        assert_eq!(build_layout(SOURCE, &options), layout);
    }

    #[test]
    fn test_layout_keeps_labels_and_edges() {
        let layout = build_layout(SOURCE, &RenderOptions::default());

        assert_eq!(layout.nodes[0].label, "Start");
        // C was never declared with a shape, its id is the label
        assert_eq!(layout.nodes[2].label, "C");

        assert_eq!(layout.edges.len(), 2);
        assert_eq!(layout.edges[0], LayoutEdge {
            from: "A".to_string(),
            to: "B".to_string()
        });
    }

    #[test]
    fn test_layout_of_empty_source() {
        let layout = build_layout("flowchart TD", &RenderOptions::default());
        assert!(layout.nodes.is_empty());
        assert!(layout.edges.is_empty());
        assert_eq!(layout.width, 800);
    }

    #[tokio::test]
    async fn test_mock_renderer_bytes() {
        let renderer = MockRenderer::new();
        let bytes = renderer.render_bytes(SOURCE, &RenderOptions::default()).await.unwrap();

        assert!(String::from_utf8(bytes).unwrap().starts_with("svg:800x600:"));
        assert_eq!(renderer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_renderer_failure() {
        let renderer = MockRenderer::failing_on("poison");
        let err = renderer
            .render_bytes("flowchart TD\n  poison --> B", &RenderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Renderer(_)));
    }
}
