//! TOML configuration with compiled-in defaults.
//!
//! Lookup order: an explicit path, the `PULSEWATCH_CONFIG` environment
//! variable, `/etc/pulsewatch/pulsewatch.toml`, then defaults. Command-line
//! flags are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::{EnsembleRule, ExceedPolicy};

const CONFIG_ENV: &str = "PULSEWATCH_CONFIG";
const SYSTEM_CONFIG_PATH: &str = "/etc/pulsewatch/pulsewatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window must be at least 2, got {0}")]
    Window(usize),
    #[error("baseline must be at least 1")]
    Baseline,
    #[error("threshold_pct must be within 0..=100, got {0}")]
    ThresholdPct(f64),
    #[error("sustain ({sustain}) must be between 1 and sustain_window ({sustain_window})")]
    Sustain { sustain: usize, sustain_window: usize },
    #[error("sample_interval must be a finite, non-negative number of seconds, got {0}")]
    SampleInterval(f64),
    #[error("invalid bind address '{0}'")]
    Bind(String),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration: an explicit path must load; otherwise try the
    /// environment override and the system location before falling back to
    /// defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{CONFIG_ENV} set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.detector.validate()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for HTTP and WebSocket traffic.
    pub bind: String,
    /// Seconds between samples within a session; 0 streams as fast as possible.
    pub sample_interval: f64,
    /// Browser origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            sample_interval: 1.0,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:5174".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sample_interval.max(0.0))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_interval.is_finite() || self.sample_interval < 0.0 {
            return Err(ConfigError::SampleInterval(self.sample_interval));
        }
        if self.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Bind(self.bind.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Attach detection scores to streamed records.
    pub enabled: bool,
    /// Samples per sliding window.
    pub window: usize,
    /// Ensemble scores kept for the adaptive threshold.
    pub baseline: usize,
    /// Percentile of the baseline used as the threshold.
    pub threshold_pct: f64,
    /// Exceed flags required to raise the alarm (`k`).
    pub sustain: usize,
    /// Lookback length for the sustain alarm (`n`).
    pub sustain_window: usize,
    pub ensemble: EnsembleRule,
    pub exceed: ExceedPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 5,
            baseline: 60,
            threshold_pct: 98.0,
            sustain: 6,
            sustain_window: 10,
            ensemble: EnsembleRule::Max,
            exceed: ExceedPolicy::Strict,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window < 2 {
            return Err(ConfigError::Window(self.window));
        }
        if self.baseline == 0 {
            return Err(ConfigError::Baseline);
        }
        if !(0.0..=100.0).contains(&self.threshold_pct) {
            return Err(ConfigError::ThresholdPct(self.threshold_pct));
        }
        if self.sustain == 0 || self.sustain > self.sustain_window {
            return Err(ConfigError::Sustain {
                sustain: self.sustain,
                sustain_window: self.sustain_window,
            });
        }
        Ok(())
    }
}
