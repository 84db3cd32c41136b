//! Runtime configuration.
//!
//! Configuration is built in code, loaded from YAML, or both, and can be
//! overridden by `ATTEST_*` environment variables. Durations are written in
//! humantime form (`"30s"`, `"1h"`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::{CompletionConfig, ResponseFormat};

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid duration for {key}: '{value}'")]
    InvalidDuration { key: String, value: String },

    #[error("Invalid number for {key}: '{value}'")]
    InvalidNumber { key: String, value: String },
}

/// Model settings for one kind of completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
}

/// Provenance cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Maximum cached evidence texts
    pub max_entries: u64,

    #[serde(with = "duration_humantime")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Configuration for the claim verification runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Claim extraction calls
    pub extraction: ModelSettings,

    /// Entailment calls (batch and per-claim)
    pub entailment: ModelSettings,

    pub temperature: f32,

    /// Per-request timeout passed to providers
    #[serde(with = "duration_humantime")]
    pub request_timeout: Duration,

    /// Evidence hits requested per claim
    pub top_k: usize,

    pub cache: CacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            extraction: ModelSettings {
                model: "gpt-4o-mini".to_string(),
                max_tokens: 8000,
            },
            entailment: ModelSettings {
                model: "gpt-4o-mini".to_string(),
                max_tokens: 16_000,
            },
            temperature: 0.0,
            request_timeout: Duration::from_secs(30),
            top_k: 1,
            cache: CacheConfig::default(),
        }
    }
}

mod duration_humantime {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl RuntimeConfig {
    /// Parse configuration from YAML. Missing keys take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `ATTEST_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ATTEST_EXTRACTION_MODEL") {
            self.extraction.model = v;
        }
        if let Some(v) = lookup("ATTEST_EXTRACTION_MAX_TOKENS") {
            self.extraction.max_tokens = parse_number("ATTEST_EXTRACTION_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("ATTEST_ENTAILMENT_MODEL") {
            self.entailment.model = v;
        }
        if let Some(v) = lookup("ATTEST_ENTAILMENT_MAX_TOKENS") {
            self.entailment.max_tokens = parse_number("ATTEST_ENTAILMENT_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("ATTEST_TEMPERATURE") {
            self.temperature = parse_number("ATTEST_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("ATTEST_REQUEST_TIMEOUT") {
            self.request_timeout = parse_duration("ATTEST_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("ATTEST_TOP_K") {
            self.top_k = parse_number("ATTEST_TOP_K", &v)?;
        }
        if let Some(v) = lookup("ATTEST_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_number("ATTEST_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = lookup("ATTEST_CACHE_TTL") {
            self.cache.ttl = parse_duration("ATTEST_CACHE_TTL", &v)?;
        }
        Ok(())
    }

    /// Completion settings for the extraction call.
    pub fn extraction_completion(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.extraction.model.clone(),
            max_tokens: self.extraction.max_tokens,
            temperature: self.temperature,
            timeout: self.request_timeout,
            response_format: ResponseFormat::Text,
        }
    }

    /// Completion settings for entailment calls; the format is set per tier.
    pub fn entailment_completion(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.entailment.model.clone(),
            max_tokens: self.entailment.max_tokens,
            temperature: self.temperature,
            timeout: self.request_timeout,
            response_format: ResponseFormat::Text,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|_| ConfigError::InvalidDuration {
        key: key.to_string(),
        value: value.to_string(),
    })
}
