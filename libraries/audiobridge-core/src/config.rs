//! Bridge configuration

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file looked up by [`BridgeConfig::load`]
pub const DEFAULT_CONFIG_FILE: &str = "audiobridge.toml";

/// Environment variable prefix for overrides (`AUDIOBRIDGE_VOLUME__INTERVAL_MS=50`)
pub const ENV_PREFIX: &str = "AUDIOBRIDGE";

/// Top-level configuration; every section falls back to its defaults
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Stage bypass switches
    #[serde(default)]
    pub processing: ProcessingSettings,

    /// Volume renderer
    #[serde(default)]
    pub volume: VolumeSettings,

    /// Multiband renderer
    #[serde(default)]
    pub multiband: MultibandSettings,

    /// Event delivery
    #[serde(default)]
    pub events: EventSettings,
}

/// Per-stage switches for the SDK's processing module
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProcessingSettings {
    /// Skip the capture-post delegate entirely
    #[serde(default)]
    pub bypass_capture_post: bool,

    /// Skip the render-pre delegate entirely
    #[serde(default)]
    pub bypass_render_pre: bool,
}

/// Settings for the volume renderer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolumeSettings {
    /// How often a volume event is emitted
    #[serde(default = "default_volume_interval_ms")]
    pub interval_ms: f64,
}

/// Settings for the multiband renderer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MultibandSettings {
    /// Number of bands to split the spectrum into
    #[serde(default = "default_bands")]
    pub bands: usize,

    /// Lowest frequency considered (Hz)
    #[serde(default = "default_min_frequency")]
    pub min_frequency: f32,

    /// Highest frequency considered (Hz)
    #[serde(default = "default_max_frequency")]
    pub max_frequency: f32,

    /// How often a magnitudes event is emitted
    #[serde(default = "default_multiband_interval_ms")]
    pub interval_ms: f64,
}

/// Settings for the event channel between the audio thread and the application
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventSettings {
    /// Bounded capacity of the event channel; events beyond it are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_volume_interval_ms(),
        }
    }
}

impl Default for MultibandSettings {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            min_frequency: default_min_frequency(),
            max_frequency: default_max_frequency(),
            interval_ms: default_multiband_interval_ms(),
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `audiobridge.toml` (if present) and environment
    pub fn load() -> Result<Self> {
        let path = PathBuf::from(DEFAULT_CONFIG_FILE);
        Self::build(path.exists().then_some(path.as_path()))
    }

    /// Load configuration from an explicit file plus environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BridgeError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path));
        }

        // Override with environment variables (prefixed with AUDIOBRIDGE_)
        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !is_positive(self.volume.interval_ms) {
            return Err(BridgeError::config("volume.interval_ms must be positive"));
        }

        let multiband = &self.multiband;
        if multiband.bands == 0 {
            return Err(BridgeError::config("multiband.bands must be at least 1"));
        }
        let range_ok = multiband.min_frequency >= 0.0 && multiband.max_frequency > multiband.min_frequency;
        if !range_ok {
            return Err(BridgeError::config(format!(
                "multiband frequency range is empty: {}..{} Hz",
                multiband.min_frequency, multiband.max_frequency
            )));
        }
        if !is_positive(multiband.interval_ms) {
            return Err(BridgeError::config("multiband.interval_ms must be positive"));
        }

        if self.events.channel_capacity == 0 {
            return Err(BridgeError::config("events.channel_capacity must be at least 1"));
        }

        Ok(())
    }
}

/// Number of 10 ms frames between two emissions for the given interval
///
/// Always at least 1.
pub fn frames_per_interval(interval_ms: f64) -> usize {
    ((interval_ms / 10.0).round() as usize).max(1)
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

// Default values
fn default_volume_interval_ms() -> f64 {
    30.0
}

fn default_bands() -> usize {
    5
}

fn default_min_frequency() -> f32 {
    1000.0
}

fn default_max_frequency() -> f32 {
    8000.0
}

fn default_multiband_interval_ms() -> f64 {
    40.0
}

fn default_channel_capacity() -> usize {
    256
}
