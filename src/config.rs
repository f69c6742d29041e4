//! Engine configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid config.
//! Load with [`EngineConfig::load`] or [`EngineConfig::from_toml_str`] and
//! call [`EngineConfig::validate`] before building the engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.deps.dev/v3alpha";

const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub client: ClientConfig,
    pub cache: CacheConfig,
    pub consistency: ConsistencyConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Default location: `<config dir>/package-health/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("package-health").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.weights.validate()?;
        self.scoring.grades.validate()?;
        if self.consistency.min_repositories == 0 {
            return Err(ConfigError::Invalid(
                "consistency.min_repositories must be at least 1".into(),
            ));
        }
        if self.orchestrator.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.concurrency must be at least 1".into(),
            ));
        }
        if self.client.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "client.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub grades: GradeThresholds,
}

/// Weights of the five health components. Must be non-negative and sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub scorecard: f64,
    pub maintenance: f64,
    pub security: f64,
    pub freshness: f64,
    pub popularity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            scorecard: 0.30,
            maintenance: 0.25,
            security: 0.25,
            freshness: 0.10,
            popularity: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.scorecard,
            self.maintenance,
            self.security,
            self.freshness,
            self.popularity,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "scoring weights must be finite and non-negative".into(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::Invalid(format!(
                "scoring weights must sum to 1.0 (got {sum:.3})"
            )));
        }
        Ok(())
    }
}

/// Minimum composite score for each grade; below `poor` is Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeThresholds {
    pub excellent: u8,
    pub good: u8,
    pub fair: u8,
    pub poor: u8,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            excellent: 90,
            good: 75,
            fair: 60,
            poor: 40,
        }
    }
}

impl GradeThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.excellent > self.good && self.good > self.fair && self.fair > self.poor;
        if !ordered || self.excellent > 100 {
            return Err(ConfigError::Invalid(format!(
                "grade thresholds must be strictly descending within 0-100 (got {}/{}/{}/{})",
                self.excellent, self.good, self.fair, self.poor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    #[default]
    Sequential,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub mode: ClientMode,
    /// Token bucket size per second; 0 disables rate limiting.
    pub requests_per_second: u32,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: format!("package-health/{}", env!("CARGO_PKG_VERSION")),
            mode: ClientMode::Sequential,
            requests_per_second: 10,
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Persist entries as JSON files here; in-memory only when absent.
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            directory: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Conventional on-disk location under the user cache directory.
    pub fn default_directory() -> Option<PathBuf> {
        dirs::cache_dir().map(|p| p.join("package-health").join("metadata"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub min_repositories: usize,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            min_repositories: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    pub package_timeout_secs: Option<u64>,
    pub low_health_threshold: u8,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            package_timeout_secs: None,
            low_health_threshold: 60,
        }
    }
}
