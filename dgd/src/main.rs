//! DiagramDaemon - diagram generation orchestrator
//!
//! CLI entry point for generating, validating, and rendering diagrams.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use diagramdaemon::cli::{Cli, Command, OutputFormat};
use diagramdaemon::config::Config;
use diagramdaemon::ingest;
use diagramdaemon::llm::create_client;
use diagramdaemon::pipeline::Pipeline;
use diagramdaemon::render::{
    DiagramRenderer, RenderError, RenderFormat, RenderOptions, RenderPayload, RenderService,
};
use diagramdaemon::retry::RetryExecutor;
use diagramdaemon::session::{
    RequestOptions, Session, SessionRequest, SessionStatus, SessionStore, Sweeper,
};
use diagramscript::{DiagramType, Validator, extract_diagram_source};

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = diagramdaemon::cli::get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > default (INFO)
    let level = if let Some(s) = cli_log_level {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        }
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "DiagramDaemon loaded config: provider={} model={}",
        config.generation.provider, config.generation.model
    );

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Generate {
            requirement,
            file,
            diagram_type,
            product,
            implement,
            model,
            stats,
            format,
        } => {
            debug!(?file, ?diagram_type, stats, "main: matched Generate command");
            let run = GenerateRun {
                requirement,
                file,
                diagram_type,
                product,
                implement,
                model,
                show_stats: stats,
                format,
            };
            cmd_generate(&config, run).await
        }
        Command::Validate {
            file,
            diagram_type,
            format,
        } => {
            debug!(?file, ?diagram_type, "main: matched Validate command");
            cmd_validate(file, diagram_type, format).await
        }
        Command::Render {
            file,
            format,
            theme,
            width,
            height,
            output,
        } => {
            debug!(?file, %format, "main: matched Render command");
            cmd_render(&config, file, format, theme, width, height, output).await
        }
        Command::Stats { format } => {
            debug!(?format, "main: matched Stats command");
            cmd_stats(&config, format).await
        }
    }
}

/// Everything a generate run needs beyond the config
struct GenerateRun {
    requirement: Option<String>,
    file: Option<PathBuf>,
    diagram_type: Option<DiagramType>,
    product: Option<String>,
    implement: Option<String>,
    model: Option<String>,
    show_stats: bool,
    format: OutputFormat,
}

/// Run one generation session to completion (batch mode)
async fn cmd_generate(config: &Config, run: GenerateRun) -> Result<()> {
    debug!("cmd_generate: called");

    let requirement = match (run.requirement, run.file) {
        (Some(text), None) => text,
        (None, Some(path)) => read_requirement(&path)?,
        (Some(_), Some(_)) => {
            return Err(eyre::eyre!("Provide a requirement or --file, not both"));
        }
        (None, None) => {
            return Err(eyre::eyre!("Provide a requirement (or --file PATH to read one)"));
        }
    };

    // Validate config early for a clear message before any work starts
    config.validate().context("Configuration is not usable")?;

    let mut request = SessionRequest::new(requirement);
    request.product_type = run.product;
    request.implement_type = run.implement;
    request.options = RequestOptions {
        diagram_type: run.diagram_type,
        model: run.model,
    };

    let store = Arc::new(SessionStore::new(config.session.clone()));
    let client = create_client(&config.generation).context("Failed to create generation client")?;
    let executor = Arc::new(RetryExecutor::new(config.retry.clone()));
    let pipeline = Arc::new(Pipeline::new(store.clone(), client, executor.clone()));

    // The sweeper enforces the session deadline while we poll
    let sweeper = Sweeper::new(store.clone());
    let sweeper_handle = tokio::spawn(async move { sweeper.run().await });

    let session = store.create(request).await?;
    println!("Session {} created", session.id);
    info!(session_id = %session.id, "cmd_generate: session accepted");

    let runner = pipeline.clone();
    let session_id = session.id.clone();
    let pipeline_handle = tokio::spawn(async move { runner.run(&session_id).await });

    let final_session = poll_to_terminal(&store, &session.id).await?;
    pipeline_handle.abort();
    sweeper_handle.abort();

    match run.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&final_session)?);
        }
        OutputFormat::Text => print_session_outcome(&final_session),
    }

    if run.show_stats {
        println!();
        print_run_stats(&store, &executor).await?;
    }

    if final_session.status != SessionStatus::Completed {
        debug!(status = %final_session.status, "cmd_generate: session did not complete");
        std::process::exit(1);
    }
    Ok(())
}

/// Poll the store until the session reaches a terminal state
async fn poll_to_terminal(store: &SessionStore, session_id: &str) -> Result<Session> {
    debug!(session_id, "poll_to_terminal: called");
    let mut last_stage = String::new();

    loop {
        let session = store
            .get(session_id)
            .await
            .ok_or_else(|| eyre::eyre!("Session {} disappeared from the store", session_id))?;

        if session.progress.stage != last_stage {
            debug!(
                session_id,
                stage = %session.progress.stage,
                percent = session.progress.percent,
                "poll_to_terminal: stage changed"
            );
            println!("  [{:>3}%] {}", session.progress.percent, session.progress.message);
            last_stage = session.progress.stage.clone();
        }

        if session.is_terminal() {
            debug!(session_id, status = %session.status, "poll_to_terminal: terminal");
            return Ok(session);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn print_session_outcome(session: &Session) {
    println!();
    match session.status {
        SessionStatus::Completed => {
            if let Some(outcome) = &session.result {
                if outcome.degraded {
                    println!("⚠ Generation was unavailable; serving a fallback diagram");
                }
                println!(
                    "✓ Diagram generated: {} ({} nodes, {} connections, {} complexity)",
                    outcome.diagram_type,
                    outcome.stats.node_count,
                    outcome.stats.connection_count,
                    outcome.stats.complexity
                );
                if let Some(ms) = session.processing_ms {
                    println!("  Took {} ms ({} retries)", ms, session.retry_count);
                }
                println!();
                println!("{}", outcome.diagram_source);
            } else {
                // Terminal bookkeeping guarantees a result on completed sessions
                warn!(session_id = %session.id, "print_session_outcome: completed session without result");
                println!("✓ Session completed but produced no diagram");
            }
        }
        SessionStatus::Failed | SessionStatus::Timeout => {
            let message = session
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error");
            println!("✗ Generation failed: {}", message);
        }
        _ => {
            println!("Session ended in unexpected state: {}", session.status);
        }
    }
}

async fn print_run_stats(store: &SessionStore, executor: &RetryExecutor) -> Result<()> {
    let store_stats = store.stats().await;
    let retry_stats = executor.stats().await;

    println!("Session counters");
    println!("  Created:   {}", store_stats.created);
    println!("  Deduped:   {}", store_stats.deduped);
    println!("  Completed: {}", store_stats.completed);
    println!("  Failed:    {}", store_stats.failed);
    println!("  Timed out: {}", store_stats.timed_out);
    println!("  Avg processing: {:.0} ms", store_stats.avg_processing_ms);
    println!();
    println!("Retry counters");
    println!("  Attempts:        {}", retry_stats.attempts);
    println!("  Retries:         {}", retry_stats.retries);
    println!("  Retry successes: {}", retry_stats.retry_successes);
    println!("  Exhausted:       {}", retry_stats.exhausted);
    println!("  Non-retryable:   {}", retry_stats.non_retryable);
    Ok(())
}

/// Validate diagram source from a file or stdin
async fn cmd_validate(file: Option<PathBuf>, diagram_type: Option<DiagramType>, format: OutputFormat) -> Result<()> {
    debug!(?file, ?diagram_type, "cmd_validate: called");

    let text = read_source_or_stdin(file.as_deref())?;
    let source = extract_diagram_source(&text);
    let report = Validator::default().validate(&source, diagram_type);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if report.is_valid {
                let detected = report
                    .detected_type
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("✓ Valid {} diagram", detected);
                if let Some(stats) = &report.stats {
                    println!("  Lines:       {}", stats.line_count);
                    println!("  Nodes:       {}", stats.node_count);
                    println!("  Connections: {}", stats.connection_count);
                    println!("  Complexity:  {}", stats.complexity);
                }
            } else {
                println!("✗ Invalid diagram source ({} issues)", report.issues.len());
                for issue in &report.issues {
                    println!("  - {}", issue);
                }
            }
        }
    }

    if !report.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

/// Stand-in for an external rendering engine
///
/// Byte formats need a real renderer wired in; only json layouts are
/// produced in-process.
struct UnconfiguredRenderer;

#[async_trait]
impl DiagramRenderer for UnconfiguredRenderer {
    async fn render_bytes(&self, _source: &str, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Renderer(format!(
            "no external renderer is configured for {} output; use --format json",
            options.format
        )))
    }
}

/// Render a validated diagram source to an artifact
async fn cmd_render(
    config: &Config,
    file: PathBuf,
    format: RenderFormat,
    theme: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    output: Option<PathBuf>,
) -> Result<()> {
    debug!(?file, %format, "cmd_render: called");

    let text = fs::read_to_string(&file).context(format!("Failed to read {}", file.display()))?;
    let source = extract_diagram_source(&text);
    let report = Validator::default().validate(&source, None);

    let Some(normalized) = report.normalized else {
        println!("✗ Source failed validation ({} issues)", report.issues.len());
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        std::process::exit(1);
    };

    let mut options = RenderOptions::from_config(&config.render).context("Invalid render configuration")?;
    options.format = format;
    if let Some(theme) = theme {
        options.theme = theme;
    }
    if let Some(width) = width {
        options.width = width;
    }
    if let Some(height) = height {
        options.height = height;
    }

    let service = RenderService::new(&config.render, Arc::new(UnconfiguredRenderer));
    let artifact = service
        .render_one(&normalized, &options)
        .await
        .map_err(|e| eyre::eyre!("Render failed: {}", e))?;

    debug!(format = %artifact.format, elapsed_ms = artifact.elapsed_ms, "cmd_render: artifact ready");
    match artifact.payload {
        RenderPayload::Layout(layout) => {
            let json = serde_json::to_string_pretty(&layout)?;
            match output {
                Some(path) => {
                    fs::write(&path, &json).context(format!("Failed to write {}", path.display()))?;
                    println!("Layout written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        RenderPayload::Bytes(bytes) => match output {
            Some(path) => {
                fs::write(&path, &bytes).context(format!("Failed to write {}", path.display()))?;
                println!("Artifact written to {} ({} bytes)", path.display(), bytes.len());
            }
            None => {
                return Err(eyre::eyre!("Binary {} output needs --output PATH", artifact.format));
            }
        },
    }
    Ok(())
}

/// Show statistics counters for this process
async fn cmd_stats(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_stats: called");

    let store = SessionStore::new(config.session.clone());
    let executor = RetryExecutor::new(config.retry.clone());
    let service = RenderService::new(&config.render, Arc::new(UnconfiguredRenderer));

    let store_stats = store.stats().await;
    let retry_stats = executor.stats().await;
    let render_stats = service.stats().await;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "sessions": store_stats,
                "retry": retry_stats,
                "render": render_stats,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("DiagramDaemon Statistics");
            println!("------------------------");
            println!("Sessions created: {}", store_stats.created);
            println!("  Deduped:   {}", store_stats.deduped);
            println!("  Active:    {}", store_stats.active);
            println!("  Completed: {}", store_stats.completed);
            println!("  Failed:    {}", store_stats.failed);
            println!("  Timed out: {}", store_stats.timed_out);
            println!();
            println!("Generation attempts: {}", retry_stats.attempts);
            println!("  Retries:   {}", retry_stats.retries);
            println!("  Exhausted: {}", retry_stats.exhausted);
            println!();
            println!("Renders served: {}", render_stats.hits + render_stats.misses);
            println!("  Cache hits: {}", render_stats.hits);
            println!("  Failures:   {}", render_stats.failures);
            println!();
            println!("Counters are per-process and reset when the command exits.");
        }
    }

    Ok(())
}

/// Read requirement text from an uploaded document
fn read_requirement(path: &Path) -> Result<String> {
    debug!(?path, "read_requirement: called");
    let bytes = fs::read(path).context(format!("Failed to read {}", path.display()))?;
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("upload");

    let parser = ingest::parser_for(filename)?;
    Ok(parser.parse(&bytes, filename)?)
}

/// Read diagram source from a file, or stdin for `-`/no path
fn read_source_or_stdin(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            debug!(?path, "read_source_or_stdin: reading file");
            fs::read_to_string(path).context(format!("Failed to read {}", path.display()))
        }
        _ => {
            debug!("read_source_or_stdin: reading stdin");
            std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")
        }
    }
}
