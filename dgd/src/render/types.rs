//! Render request and artifact types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RenderConfig;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    /// Vector output from the external renderer
    #[default]
    Svg,
    /// Raster output from the external renderer
    Png,
    /// Document output from the external renderer
    Pdf,
    /// Built-in deterministic layout, no external renderer involved
    Json,
}

impl std::fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Svg => write!(f, "svg"),
            Self::Png => write!(f, "png"),
            Self::Pdf => write!(f, "pdf"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for RenderFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "pdf" => Ok(Self::Pdf),
            "json" => Ok(Self::Json),
            other => Err(RenderError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Options that affect visual output
///
/// These are exactly the fields that participate in the cache key; two
/// renders with equal options and source share an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub theme: String,
    pub format: RenderFormat,
    pub width: u32,
    pub height: u32,
}

impl RenderOptions {
    /// Build options from daemon configuration
    pub fn from_config(config: &RenderConfig) -> Result<Self, RenderError> {
        Ok(Self {
            theme: config.theme.clone(),
            format: config.format.parse()?,
            width: config.width,
            height: config.height,
        })
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            format: RenderFormat::Svg,
            width: 800,
            height: 600,
        }
    }
}

/// A node placed by the built-in layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: String,
    pub label: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A directed edge between placed nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub from: String,
    pub to: String,
}

/// Deterministic grid layout for structured output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramLayout {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    pub width: u32,
    pub height: u32,
}

/// What a render produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPayload {
    /// Raw bytes from the external renderer
    Bytes(Vec<u8>),
    /// Structured layout for json output
    Layout(DiagramLayout),
}

impl RenderPayload {
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Layout(layout) => layout.nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A finished render, possibly served from cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderArtifact {
    pub format: RenderFormat,
    pub payload: RenderPayload,
    /// True when served from the cache rather than rendered
    pub cached: bool,
    /// Wall time this artifact took to produce (zero on cache hits)
    pub elapsed_ms: u64,
}

/// Failures in the render path
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer failed: {0}")]
    Renderer(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_round_trip() {
        for format in [RenderFormat::Svg, RenderFormat::Png, RenderFormat::Pdf, RenderFormat::Json] {
            let parsed: RenderFormat = format.to_string().parse().unwrap();
            assert_eq!(parsed, format);
        }
        assert!(" SVG ".parse::<RenderFormat>().is_ok());
        assert!("bmp".parse::<RenderFormat>().is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = RenderConfig::default();
        let options = RenderOptions::from_config(&config).unwrap();
        assert_eq!(options, RenderOptions::default());

        let mut bad = RenderConfig::default();
        bad.format = "tiff".to_string();
        assert!(RenderOptions::from_config(&bad).is_err());
    }

    #[test]
    fn test_layout_serializes_to_json() {
        let layout = DiagramLayout {
            nodes: vec![LayoutNode {
                id: "A".to_string(),
                label: "Start".to_string(),
                x: 40,
                y: 30,
                width: 120,
                height: 40,
            }],
            edges: vec![],
            width: 800,
            height: 600,
        };

        let json = serde_json::to_value(&layout).unwrap();
        assert_eq!(json["nodes"][0]["id"], "A");
        assert_eq!(json["width"], 800);
    }
}
