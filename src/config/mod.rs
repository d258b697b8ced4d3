use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::{byte_size, duration};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub resizer: ResizerConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL used to build the handle URLs returned to clients
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Overall deadline for a single resize request
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    /// Maximum accepted request body
    #[serde(default = "default_max_request_size", with = "byte_size")]
    pub max_request_size: u64,
}

/// Resampling filter used by the transformer
///
/// Only a single high-quality filter is supported; the setting exists so the
/// choice is explicit in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// The single configuration surface of the resize pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizerConfig {
    /// Bound on a whole source fetch (connect, headers and body)
    #[serde(default = "default_fetch_timeout", with = "duration")]
    pub fetch_timeout: Duration,
    /// Ceiling on the raw source payload; exceeding it fails the item
    #[serde(default = "default_fetch_size_limit", with = "byte_size")]
    pub fetch_size_limit: u64,
    /// Media type the upstream must declare in its Content-Type header
    #[serde(default = "default_required_content_type")]
    pub required_content_type: String,
    /// Number of transformed images kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub filter: ResizeFilter,
    /// JPEG encoder quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Largest width or height a client may request or a resize may produce
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// Largest source width or height the decoder accepts
    #[serde(default = "default_max_source_dimension")]
    pub max_source_dimension: u32,
    /// Ceiling on decoder allocations for one source image
    #[serde(default = "default_max_decode_alloc", with = "byte_size")]
    pub max_decode_alloc: u64,
    /// Items of a synchronous batch processed concurrently (1 = sequential)
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Asynchronous resizes allowed to run at the same time
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Tasks allowed to wait for a slot; further async misses are rejected
    #[serde(default = "default_max_queued_tasks")]
    pub max_queued_tasks: usize,
    /// How long shutdown waits for background resizes to drain
    #[serde(default = "default_shutdown_grace_period", with = "duration")]
    pub shutdown_grace_period: Duration,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> Duration {
    parse_default_duration(DEFAULT_REQUEST_TIMEOUT)
}

fn default_max_request_size() -> u64 {
    DEFAULT_MAX_REQUEST_SIZE
}

// Resizer defaults
fn default_fetch_timeout() -> Duration {
    parse_default_duration(DEFAULT_FETCH_TIMEOUT)
}

fn default_fetch_size_limit() -> u64 {
    DEFAULT_FETCH_SIZE_LIMIT
}

fn default_required_content_type() -> String {
    DEFAULT_REQUIRED_CONTENT_TYPE.to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_max_source_dimension() -> u32 {
    DEFAULT_MAX_SOURCE_DIMENSION
}

fn default_max_decode_alloc() -> u64 {
    DEFAULT_MAX_DECODE_ALLOC
}

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

// Background defaults
fn default_max_concurrent_tasks() -> usize {
    DEFAULT_MAX_CONCURRENT_TASKS
}

fn default_max_queued_tasks() -> usize {
    DEFAULT_MAX_QUEUED_TASKS
}

fn default_shutdown_grace_period() -> Duration {
    parse_default_duration(DEFAULT_SHUTDOWN_GRACE_PERIOD)
}

fn parse_default_duration(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or(Duration::from_secs(1))
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            max_request_size: default_max_request_size(),
        }
    }
}

impl Default for ResizerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            fetch_size_limit: default_fetch_size_limit(),
            required_content_type: default_required_content_type(),
            cache_capacity: default_cache_capacity(),
            filter: ResizeFilter::default(),
            jpeg_quality: default_jpeg_quality(),
            max_dimension: default_max_dimension(),
            max_source_dimension: default_max_source_dimension(),
            max_decode_alloc: default_max_decode_alloc(),
            batch_concurrency: default_batch_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_queued_tasks: default_max_queued_tasks(),
            shutdown_grace_period: default_shutdown_grace_period(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            resizer: ResizerConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        url::Url::parse(&self.web.base_url).map_err(|e| {
            AppError::configuration(format!("web.base_url '{}' is invalid: {e}", self.web.base_url))
        })?;

        if self.web.request_timeout.is_zero() {
            return Err(AppError::configuration("web.request_timeout must be non-zero"));
        }
        if self.web.max_request_size == 0 {
            return Err(AppError::configuration("web.max_request_size must be non-zero"));
        }

        self.resizer.validate()?;

        if self.background.max_concurrent_tasks == 0 {
            return Err(AppError::configuration(
                "background.max_concurrent_tasks must be at least 1",
            ));
        }

        Ok(())
    }
}

impl ResizerConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.fetch_timeout.is_zero() {
            return Err(AppError::configuration("resizer.fetch_timeout must be non-zero"));
        }
        if self.fetch_size_limit == 0 {
            return Err(AppError::configuration("resizer.fetch_size_limit must be non-zero"));
        }
        if self.required_content_type.trim().is_empty() {
            return Err(AppError::configuration(
                "resizer.required_content_type must not be empty",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(AppError::configuration("resizer.cache_capacity must be at least 1"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::configuration(format!(
                "resizer.jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.max_dimension == 0 {
            return Err(AppError::configuration("resizer.max_dimension must be at least 1"));
        }
        if self.max_source_dimension == 0 || self.max_decode_alloc == 0 {
            return Err(AppError::configuration(
                "resizer.max_source_dimension and resizer.max_decode_alloc must be non-zero",
            ));
        }
        if self.batch_concurrency == 0 {
            return Err(AppError::configuration("resizer.batch_concurrency must be at least 1"));
        }
        Ok(())
    }
}
