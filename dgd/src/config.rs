//! DiagramDaemon configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main DiagramDaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation-service provider configuration
    pub generation: GenerationConfig,

    /// Session lifecycle limits
    pub session: SessionConfig,

    /// Retry policy for generation calls
    pub retry: RetryConfig,

    /// Render output and cache configuration
    pub render: RenderConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks the API key environment variable and numeric bounds. Call
    /// this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.generation.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Generation API key not found. Set the {} environment variable.",
                self.generation.api_key_env
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(eyre::eyre!(
                "retry.backoff-multiplier must be at least 1.0 (got {})",
                self.retry.backoff_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_range) {
            return Err(eyre::eyre!(
                "retry.jitter-range must be between 0.0 and 1.0 (got {})",
                self.retry.jitter_range
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(eyre::eyre!(
                "retry.max-delay-ms ({}) must not be below retry.base-delay-ms ({})",
                self.retry.max_delay_ms,
                self.retry.base_delay_ms
            ));
        }
        if self.session.max_active == 0 {
            return Err(eyre::eyre!("session.max-active must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .diagramdaemon.yml
        let local_config = PathBuf::from(".diagramdaemon.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/diagramdaemon/diagramdaemon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("diagramdaemon").join("diagramdaemon.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Generation-service provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Provider name (currently only "openai" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl GenerationConfig {
    /// Resolve the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("environment variable {} is not set", self.api_key_env))
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_ms: 60_000,
        }
    }
}

/// Session lifecycle limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrently active sessions
    #[serde(rename = "max-active")]
    pub max_active: usize,

    /// Window for deduplicating identical requests, in seconds
    #[serde(rename = "dedup-window-secs")]
    pub dedup_window_secs: u64,

    /// Age at which an in-flight session times out, in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Interval between cleanup sweeps, in seconds
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,

    /// Maximum accepted requirement length, in characters
    #[serde(rename = "max-requirement-chars")]
    pub max_requirement_chars: usize,
}

impl SessionConfig {
    pub fn dedup_window_ms(&self) -> i64 {
        (self.dedup_window_secs * 1000) as i64
    }

    pub fn timeout_ms(&self) -> i64 {
        (self.timeout_secs * 1000) as i64
    }

    /// Terminal sessions are purged once twice the timeout has passed
    pub fn purge_after_ms(&self) -> i64 {
        2 * self.timeout_ms()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_active: 100,
            dedup_window_secs: 30,
            timeout_secs: 300,
            sweep_interval_secs: 60,
            max_requirement_chars: 10_000,
        }
    }
}

/// Retry policy for generation calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Exponential growth factor
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,

    /// Symmetric jitter as a fraction of the computed delay
    #[serde(rename = "jitter-range")]
    pub jitter_range: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_range: 0.25,
        }
    }
}

/// Render output and cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum cached render entries
    #[serde(rename = "cache-capacity")]
    pub cache_capacity: usize,

    /// Cache entry lifetime in seconds
    #[serde(rename = "cache-ttl-secs")]
    pub cache_ttl_secs: u64,

    /// Render theme
    pub theme: String,

    /// Output format (svg or png)
    pub format: String,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,
}

impl RenderConfig {
    pub fn cache_ttl_ms(&self) -> i64 {
        (self.cache_ttl_secs * 1000) as i64
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1_000,
            cache_ttl_secs: 1_800,
            theme: "default".to_string(),
            format: "svg".to_string(),
            width: 800,
            height: 600,
        }
    }
}
