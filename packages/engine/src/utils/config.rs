// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! (`SENSORGUARD_CONFIG` or `sensorguard.{toml,yaml,json}` in the working
//! directory), then `SENSORGUARD__SECTION__FIELD` environment overrides.

use crate::interception::sensor::SensorKind;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "SENSORGUARD_CONFIG";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SENSORGUARD";

const DEFAULT_FILE_STEM: &str = "sensorguard";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    pub transform: TransformConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub replay: ReplayConfig,
}

/// Listener registry sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Capacity reserved for the proxy table
    pub initial_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 32,
        }
    }
}

/// Which payload transform the proxies apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Identity,
    Offset,
    Noise,
    /// Offset correction followed by noise
    OffsetNoise,
}

/// Per-kind bias/gain correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindCorrection {
    pub sensor: SensorKind,

    /// Added to each axis after the gain; missing axes get 0.0
    #[serde(default)]
    pub bias: Vec<f32>,

    #[serde(default = "unit_gain")]
    pub gain: f32,
}

fn unit_gain() -> f32 {
    1.0
}

/// Transform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub kind: TransformKind,

    pub corrections: Vec<KindCorrection>,

    /// Maximum absolute jitter added per axis
    pub noise_amplitude: f32,

    pub noise_seed: u64,

    /// Sensor kinds the noise applies to (empty = all kinds)
    pub noise_sensors: Vec<SensorKind>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            kind: TransformKind::OffsetNoise,
            corrections: vec![
                KindCorrection {
                    sensor: SensorKind::Accelerometer,
                    bias: vec![0.042, -0.031, 0.018],
                    gain: 1.0,
                },
                KindCorrection {
                    sensor: SensorKind::Gyroscope,
                    bias: vec![0.0012, -0.0009, 0.0015],
                    gain: 1.0,
                },
            ],
            noise_amplitude: 0.01,
            noise_seed: 0x5e45_06a2,
            noise_sensors: vec![SensorKind::Accelerometer, SensorKind::Gyroscope],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9184".to_string(),
        }
    }
}

/// Replay tooling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Sampling period requested from the producer (microseconds)
    pub sampling_period_us: i32,

    /// When set, registrations use the batched (latency) call shape
    pub max_report_latency_us: Option<i32>,

    /// Bound of the producer dispatch queue
    pub channel_capacity: usize,

    /// Consumer key used for the collecting listener
    pub listener_key: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            sampling_period_us: 20_000,
            max_report_latency_us: None,
            channel_capacity: 1024,
            listener_key: "replay-sink".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, optional file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::build(path.as_deref().map(Path::new), ENV_PREFIX)
    }

    /// Load configuration from an explicit file (environment still applies)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(Some(path.as_ref()), ENV_PREFIX)
    }

    fn build(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(EngineError::ConfigError(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                debug!("Loading configuration from {}", path.display());
                builder.add_source(File::from(path).required(true))
            }
            None => builder.add_source(File::with_name(DEFAULT_FILE_STEM).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let transform = &self.transform;

        if !transform.noise_amplitude.is_finite() || transform.noise_amplitude < 0.0 {
            return Err(EngineError::ConfigError(format!(
                "noise_amplitude must be a non-negative number, got {}",
                transform.noise_amplitude
            )));
        }

        for correction in &transform.corrections {
            if !correction.gain.is_finite() || correction.gain == 0.0 {
                return Err(EngineError::ConfigError(format!(
                    "gain for {} must be finite and non-zero",
                    correction.sensor
                )));
            }
            if correction.bias.len() > correction.sensor.axes() {
                return Err(EngineError::ConfigError(format!(
                    "{} has {} axes but {} bias values were given",
                    correction.sensor,
                    correction.sensor.axes(),
                    correction.bias.len()
                )));
            }
            if correction.bias.iter().any(|b| !b.is_finite()) {
                return Err(EngineError::ConfigError(format!(
                    "bias for {} contains a non-finite value",
                    correction.sensor
                )));
            }
        }

        if self.replay.channel_capacity == 0 {
            return Err(EngineError::ConfigError(
                "replay.channel_capacity must be greater than zero".to_string(),
            ));
        }

        if self.replay.listener_key.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "replay.listener_key must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
