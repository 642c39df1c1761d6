//! Configuration types for capture and playback sessions.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Trigger byte used when the configured one is out of range.
pub const FALLBACK_TRIGGER_VALUE: u8 = 255;

/// Top-level show configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Pixel count of each physical output, in output order.
    pub pixel_counts: Vec<usize>,
    /// Value of channel 512 on universe 0 that gates recording.
    pub trigger_value: i64,
    /// Directory holding save bundles.
    pub save_dir: PathBuf,
    /// Address the Art-Net listener binds to.
    pub artnet_bind: String,
    /// Strip refresh cadence while recording.
    pub record_refresh_ms: u64,
    /// Strip refresh cadence while playing back.
    pub playback_refresh_ms: u64,
    /// Time allowed for in-flight callbacks before resources are released.
    pub teardown_grace_ms: u64,
    /// External audio playback.
    pub audio: AudioConfig,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            pixel_counts: vec![20],
            trigger_value: 0,
            save_dir: PathBuf::from("./saves"),
            artnet_bind: "0.0.0.0:6454".to_string(),
            record_refresh_ms: 100,
            playback_refresh_ms: 10,
            teardown_grace_ms: 200,
            audio: AudioConfig::default(),
        }
    }
}

/// External audio process settings.
///
/// The process is started as `command... <file> <anchor>` where `anchor` is
/// the shared start time in Unix seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Program and leading arguments. Empty disables audio.
    pub command: Vec<String>,
    /// Audio file used when the bundle does not carry its own.
    pub file: Option<PathBuf>,
}

impl ShowConfig {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn record_refresh(&self) -> Duration {
        Duration::from_millis(self.record_refresh_ms)
    }

    pub fn playback_refresh(&self) -> Duration {
        Duration::from_millis(self.playback_refresh_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}

/// Map a configured trigger value onto a DMX byte.
///
/// Values outside 0-255 fall back to [`FALLBACK_TRIGGER_VALUE`] with a
/// warning instead of failing.
pub fn sanitize_trigger(requested: i64) -> (u8, Option<Correction>) {
    match u8::try_from(requested) {
        Ok(value) => (value, None),
        Err(_) => {
            let correction = Correction::TriggerValueInvalid { requested };
            log::warn!("{correction}");
            (FALLBACK_TRIGGER_VALUE, Some(correction))
        }
    }
}

/// Construction parameter that was corrected rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Correction {
    #[error("Unable to drive {requested} outputs, keeping the first 4")]
    TooManyOutputs { requested: usize },
    #[error("Output {output} asks for {requested} pixels, clamped to 680")]
    PixelCountClamped { output: usize, requested: usize },
    #[error("Record trigger value {requested} is invalid, using 255")]
    TriggerValueInvalid { requested: i64 },
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error parsing config: {0}")]
    Parse(#[from] serde_json::Error),
}
