//! srlx Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults sized for a single-host extraction run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for worker counts and chunk sizes
pub const MAX_WORKERS: usize = 1024;

/// Upper bound for queue capacities
pub const MAX_QUEUE_CAPACITY: usize = 1 << 24;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Extraction pipeline configuration
    pub pipeline: PipelineConfig,

    /// Uploading sink configuration
    pub sink: SinkConfig,

    /// Index store connection
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Pipeline
        if let Some(workers) = env_parse::<usize>("SRLX_WORKERS")? {
            self.pipeline.workers = workers;
        }
        if let Some(chunk_size) = env_parse::<usize>("SRLX_CHUNK_SIZE")? {
            self.pipeline.chunk_size = chunk_size;
        }
        if let Some(capacity) = env_parse::<usize>("SRLX_QUEUE_CAPACITY")? {
            self.pipeline.queue_capacity = capacity;
        }

        // Sink
        if let Some(workers) = env_parse::<usize>("SRLX_SINK_WORKERS")? {
            self.sink.workers = workers;
        }
        if let Some(capacity) = env_parse::<usize>("SRLX_SINK_QUEUE_CAPACITY")? {
            self.sink.queue_capacity = capacity;
        }

        // Store
        if let Ok(backend) = std::env::var("SRLX_STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("ELASTIC_URL") {
            self.store.url = url;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Reject sizes outside `1..=max` for each stage, and a missing store URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("pipeline.workers", self.pipeline.workers, MAX_WORKERS),
            ("pipeline.chunk_size", self.pipeline.chunk_size, MAX_WORKERS),
            ("pipeline.queue_capacity", self.pipeline.queue_capacity, MAX_QUEUE_CAPACITY),
            ("sink.workers", self.sink.workers, MAX_WORKERS),
            ("sink.queue_capacity", self.sink.queue_capacity, MAX_QUEUE_CAPACITY),
        ];

        for (key, value, max) in checks {
            if value == 0 || value > max {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        if self.store.backend == StoreBackend::Http && self.store.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("store.url".to_string()));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Extraction pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of extraction workers running concurrently
    pub workers: usize,

    /// Number of source batches handed to a worker at a time
    pub chunk_size: usize,

    /// Capacity of the hand-off queue between workers and the consumer
    pub queue_capacity: usize,

    /// How long a worker waits for hand-off space before dropping a record
    pub enqueue_timeout_ms: u64,
}

impl PipelineConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            chunk_size: 8,
            queue_capacity: 10_000,
            enqueue_timeout_ms: 1_000,
        }
    }
}

/// Uploading sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Maximum number of uploads running at once
    pub workers: usize,

    /// Capacity of the sink's internal queue
    pub queue_capacity: usize,

    /// How long `sink_item` waits for queue space before failing
    pub enqueue_timeout_ms: u64,
}

impl SinkConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 10_000,
            enqueue_timeout_ms: 10_000,
        }
    }
}

/// Index store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Which store implementation to use
    pub backend: StoreBackend,

    /// Base URL of the search index (http backend)
    pub url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Http,
            url: "http://localhost:9200".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Supported index store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Http,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "http" | "elastic" | "elasticsearch" => Ok(Self::Http),
            _ => Err(ConfigError::InvalidValue {
                key: "SRLX_STORE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
