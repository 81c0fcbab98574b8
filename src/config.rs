//! Configuration management for the generation gate.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::duration::{DurationEstimator, DEFAULT_BUCKETS, DEFAULT_WORDS_PER_MINUTE};
use crate::error::{GateError, Result};
use crate::ratelimit::CooldownPolicy;

/// Prefix for environment overrides, e.g. `DOGTALK_LIMITER__COOLDOWN_SECS`.
pub const ENV_PREFIX: &str = "DOGTALK";

/// Main configuration for the gate service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Generation limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Dialogue duration configuration
    #[serde(default)]
    pub duration: DurationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Generation limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Cooldown between unpaid generations, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Age after which an idle entry is purged, in seconds
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How often the cleanup task runs, in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            retention_secs: default_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    3 * 60 * 60
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_cleanup_interval_secs() -> u64 {
    60 * 60
}

impl LimiterConfig {
    pub fn cooldown_policy(&self) -> Result<CooldownPolicy> {
        CooldownPolicy::new(
            Duration::from_secs(self.cooldown_secs),
            Duration::from_secs(self.retention_secs),
        )
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Dialogue duration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationConfig {
    /// Assumed speaking pace
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: f64,

    /// Permitted video lengths in seconds
    #[serde(default = "default_buckets")]
    pub buckets: Vec<u32>,

    /// Seconds added to every estimate
    #[serde(default)]
    pub buffer_seconds: f64,
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            words_per_minute: default_words_per_minute(),
            buckets: default_buckets(),
            buffer_seconds: 0.0,
        }
    }
}

fn default_words_per_minute() -> f64 {
    DEFAULT_WORDS_PER_MINUTE
}

fn default_buckets() -> Vec<u32> {
    DEFAULT_BUCKETS.to_vec()
}

impl DurationConfig {
    pub fn estimator(&self) -> Result<DurationEstimator> {
        DurationEstimator::new(self.words_per_minute, self.buckets.iter().copied())?
            .with_buffer(self.buffer_seconds)
    }
}

impl GateConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| GateError::Config(format!("Failed to render config: {}", e)))
    }

    /// Write the YAML rendering to `out`, e.g. stdout for `--print-config`.
    pub fn write_yaml<W: Write>(&self, mut out: W) -> Result<()> {
        out.write_all(self.to_yaml()?.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Load configuration from defaults, an optional YAML file and
    /// `DOGTALK_*` environment variables, in increasing precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("duration.buckets")
            .try_parsing(true)
            .source(env);

        let config: GateConfig = builder.add_source(environment).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.limiter.cooldown_policy()?;
        if self.limiter.cleanup_interval_secs == 0 {
            return Err(GateError::Config(
                "cleanup_interval_secs must be positive".to_string(),
            ));
        }
        self.duration.estimator()?;
        Ok(())
    }
}
