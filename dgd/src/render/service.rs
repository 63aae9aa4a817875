//! Render orchestration over the cache and the renderer collaborator

use std::sync::Arc;

use futures::future;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::session::{Clock, SystemClock};

use super::cache::RenderCache;
use super::renderer::{DiagramRenderer, build_layout};
use super::types::{RenderArtifact, RenderError, RenderFormat, RenderOptions, RenderPayload};

/// Counters kept by the render service
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderStats {
    /// Requests served from the cache
    pub hits: u64,
    /// Requests that had to render
    pub misses: u64,
    /// Renders that failed
    pub failures: u64,
    /// Running average over successful renders, in milliseconds
    pub avg_render_ms: f64,
}

/// Result of a batch render
#[derive(Debug)]
pub struct BatchOutcome {
    /// Per-source results, in input order
    pub results: Vec<Result<RenderArtifact, RenderError>>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Renders validated diagram sources, caching finished artifacts
pub struct RenderService {
    cache: RenderCache,
    renderer: Arc<dyn DiagramRenderer>,
    clock: Arc<dyn Clock>,
    stats: Mutex<RenderStats>,
}

impl RenderService {
    pub fn new(config: &RenderConfig, renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self::with_clock(config, renderer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &RenderConfig,
        renderer: Arc<dyn DiagramRenderer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: RenderCache::with_clock(config.cache_capacity, config.cache_ttl_ms(), clock.clone()),
            renderer,
            clock,
            stats: Mutex::new(RenderStats::default()),
        }
    }

    /// Render one source, serving from the cache when possible
    ///
    /// The json format is produced in-process from the parsed source,
    /// every other format goes through the renderer.
    pub async fn render_one(
        &self,
        source: &str,
        options: &RenderOptions,
    ) -> Result<RenderArtifact, RenderError> {
        let key = RenderCache::key(source, options);

        if let Some(mut artifact) = self.cache.get(&key).await {
            debug!(key = %key, "RenderService::render_one: cache hit");
            self.stats.lock().await.hits += 1;
            artifact.cached = true;
            return Ok(artifact);
        }

        let started = self.clock.now_ms();
        let payload = match options.format {
            RenderFormat::Json => RenderPayload::Layout(build_layout(source, options)),
            _ => match self.renderer.render_bytes(source, options).await {
                Ok(bytes) => RenderPayload::Bytes(bytes),
                Err(e) => {
                    warn!(format = %options.format, error = %e, "RenderService::render_one: render failed");
                    let mut stats = self.stats.lock().await;
                    stats.misses += 1;
                    stats.failures += 1;
                    return Err(e);
                }
            },
        };
        let elapsed_ms = (self.clock.now_ms() - started).max(0) as u64;

        let artifact = RenderArtifact {
            format: options.format,
            payload,
            cached: false,
            elapsed_ms,
        };
        self.cache.put(key, artifact.clone()).await;

        let mut stats = self.stats.lock().await;
        stats.misses += 1;
        let produced = stats.misses - stats.failures;
        stats.avg_render_ms += (elapsed_ms as f64 - stats.avg_render_ms) / produced as f64;

        Ok(artifact)
    }

    /// Render many sources under the same options
    ///
    /// Sources are rendered concurrently and one failure never aborts
    /// the rest.
    pub async fn render_batch(&self, sources: &[String], options: &RenderOptions) -> BatchOutcome {
        let pending = sources.iter().map(|source| self.render_one(source, options));
        let results = future::join_all(pending).await;

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let failed = results.len() - succeeded;
        debug!(total = results.len(), succeeded, failed, "RenderService::render_batch: finished");

        BatchOutcome {
            results,
            succeeded,
            failed,
        }
    }

    pub async fn stats(&self) -> RenderStats {
        self.stats.lock().await.clone()
    }

    /// Number of artifacts currently cached
    pub async fn cached_entries(&self) -> usize {
        self.cache.len().await
    }
}
