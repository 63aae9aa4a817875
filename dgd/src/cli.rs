//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use diagramscript::DiagramType;

use crate::render::RenderFormat;

/// DiagramDaemon - session-orchestrated diagram generation
#[derive(Parser)]
#[command(
    name = "dgd",
    about = "Generates, validates, and renders diagrams from natural-language requirements",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a diagram from a requirement (runs one session to completion)
    Generate {
        /// Requirement text; omit when reading from --file
        requirement: Option<String>,

        /// Read the requirement from a document instead
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Diagram type to request (flowchart, sequence, class, ...)
        #[arg(short = 't', long = "diagram-type")]
        diagram_type: Option<DiagramType>,

        /// Product context included in the prompt
        #[arg(long)]
        product: Option<String>,

        /// Implementation context included in the prompt
        #[arg(long)]
        implement: Option<String>,

        /// Model override for this request
        #[arg(short, long)]
        model: Option<String>,

        /// Print session and retry counters after the run
        #[arg(long)]
        stats: bool,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate diagram source from a file or stdin (offline)
    Validate {
        /// Source file; omit or pass '-' to read stdin
        file: Option<PathBuf>,

        /// Diagram type the source must declare
        #[arg(short = 't', long = "diagram-type")]
        diagram_type: Option<DiagramType>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Render a validated diagram source to an artifact
    Render {
        /// Source file to render
        file: PathBuf,

        /// Artifact format (svg, png, pdf, json)
        #[arg(short, long, default_value = "json")]
        format: RenderFormat,

        /// Render theme override
        #[arg(long)]
        theme: Option<String>,

        /// Output width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Output height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Write the artifact here instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Show daemon statistics counters
    Stats {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("diagramdaemon")
        .join("logs")
        .join("diagramdaemon.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Output format for report/stats commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
