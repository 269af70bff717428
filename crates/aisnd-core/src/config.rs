use std::env;

use serde::Deserialize;

use crate::registry::DriverId;

/// Default pull limit: one second of stereo 16-bit audio at 48 kHz.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 48000 * crate::driver::FRAME_SIZE;

pub const DEFAULT_NULL_PERIOD_FRAMES: usize = 512;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred driver. `None` picks the highest priority one available.
    pub driver: Option<DriverId>,
    /// Upper bound on bytes pulled from the producer per callback.
    pub max_buffer_size: usize,
    pub stream_name: String,
    /// Callback period of the null driver.
    pub null_period_frames: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            driver: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            stream_name: "aisnd".into(),
            null_period_frames: DEFAULT_NULL_PERIOD_FRAMES,
        }
    }
}

impl Config {
    /// Default configuration overlaid with `AISND_DRIVER` and `AISND_MAX_BUFFER_SIZE`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Config {
        let mut config = Config::default();
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("AISND_DRIVER") {
            match value.parse() {
                Ok(id) => self.driver = Some(id),
                Err(error) => tracing::warn!(%error, "ignoring AISND_DRIVER"),
            }
        }

        if let Some(value) = var("AISND_MAX_BUFFER_SIZE") {
            match value.parse::<usize>() {
                Ok(size) if size >= crate::driver::FRAME_SIZE => self.max_buffer_size = size,
                _ => tracing::warn!(%value, "ignoring AISND_MAX_BUFFER_SIZE"),
            }
        }
    }
}
