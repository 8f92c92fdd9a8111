//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file (`SIGHT_CONFIG`, default `sight.toml`), then `SIGHT_`-prefixed
//! environment variables with `__` between sections, e.g.
//! `SIGHT_TRACKING__MAX_AGE=8`.

use config::{Config, Environment, File};
use serde::Deserialize;
use sight_cv::{CvConfig, DetectionFilterConfig, RenderingConfig, SourceConfig, TrackingConfig};
use sight_store::{RelayConfig, StoreConfig};
use sight_tracker::PipelineConfig;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "sight.toml";

/// Top-level server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub detector: DetectorConfig,
    pub tracking: TrackingConfig,
    pub filter: DetectionFilterConfig,
    pub rendering: RenderingConfig,
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub relay: RelayConfig,
    /// User bound at startup; can be changed later via `/set-user/{uid}`
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Pause between MJPEG parts
    pub stream_pacing_ms: u64,
    /// Allow any origin (development)
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            stream_pacing_ms: 50,
            cors_permissive: true,
        }
    }
}

/// Remote vision model
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub endpoint: String,
    /// Per-request HTTP timeout
    pub timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl AppConfig {
    /// Load from the default file and the environment
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("SIGHT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(env_source())
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults
    #[cfg(test)]
    pub fn from_toml(toml: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.cv_config().validate()?;
        self.pipeline.validate()?;
        self.source.validate()?;
        if self.detector.endpoint.trim().is_empty() {
            anyhow::bail!("detector.endpoint must not be empty");
        }
        if let Some(user) = &self.user_id {
            if user.trim().is_empty() {
                anyhow::bail!("user_id must not be blank");
            }
        }
        Ok(())
    }

    pub fn cv_config(&self) -> CvConfig {
        CvConfig {
            tracking: self.tracking.clone(),
            filter: self.filter.clone(),
            rendering: self.rendering.clone(),
        }
    }

    pub fn stream_pacing(&self) -> Duration {
        Duration::from_millis(self.server.stream_pacing_ms)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector.timeout_ms)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("SIGHT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("filter.classes")
}
