//! # Engraver Configuration
//!
//! Device, run, estimate and conversion settings, loaded from a TOML file.
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [device]
//! port = "/dev/ttyUSB0"   # "0" runs a timed simulation instead
//! baud = 9600
//! ack_timeout_ms = 5000
//!
//! [run]
//! multiplier = 2
//! simulated_delay_ms = 100
//!
//! [estimate]
//! lase_time_ms = 100
//! point_overhead_ms = 12
//! step_time_ms = 1
//! mm_per_step = 0.01875
//!
//! [convert]
//! threshold = 10
//! max_width = 300
//! max_height = 300
//! alpha_cutoff = 10
//! ```

// src/config.rs - Single configuration file
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engrave_job::{DeviceTarget, RunOptions};
use crate::script::{TimingModel, AXIS_MAX};

/// Widest (or tallest) image whose pixels all stay inside the axis range.
pub const MAX_CONVERT_SIZE: u32 = AXIS_MAX as u32 + 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub estimate: EstimateConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
}

/// Serial link to the engraver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            simulated_delay_ms: default_simulated_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EstimateConfig {
    #[serde(default = "default_lase_time_ms")]
    pub lase_time_ms: u64,
    #[serde(default = "default_point_overhead_ms")]
    pub point_overhead_ms: u64,
    #[serde(default = "default_step_time_ms")]
    pub step_time_ms: u64,
    #[serde(default = "default_mm_per_step")]
    pub mm_per_step: f64,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            lase_time_ms: default_lase_time_ms(),
            point_overhead_ms: default_point_overhead_ms(),
            step_time_ms: default_step_time_ms(),
            mm_per_step: default_mm_per_step(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConvertConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default = "default_max_size")]
    pub max_width: u32,
    #[serde(default = "default_max_size")]
    pub max_height: u32,
    #[serde(default = "default_alpha_cutoff")]
    pub alpha_cutoff: u8,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_width: default_max_size(),
            max_height: default_max_size(),
            alpha_cutoff: default_alpha_cutoff(),
        }
    }
}

impl ConvertConfig {
    /// Conversion bound with optional overrides, limited to what the device can address.
    pub fn max_size(
        &self,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<(u32, u32), ConfigError> {
        let size = (width.unwrap_or(self.max_width), height.unwrap_or(self.max_height));
        let valid = 1..=MAX_CONVERT_SIZE;
        if !valid.contains(&size.0) || !valid.contains(&size.1) {
            return Err(ConfigError::Invalid(format!(
                "conversion size {}x{} must be between 1 and {} on each axis",
                size.0, size.1, MAX_CONVERT_SIZE
            )));
        }
        Ok(size)
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.multiplier == 0 {
            return Err(ConfigError::Invalid("run.multiplier must be > 0".to_string()));
        }
        if self.device.baud == 0 {
            return Err(ConfigError::Invalid("device.baud must be > 0".to_string()));
        }
        if self.device.ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid("device.ack_timeout_ms must be > 0".to_string()));
        }
        self.convert.max_size(None, None)?;
        if self.estimate.mm_per_step <= 0.0 {
            return Err(ConfigError::Invalid("estimate.mm_per_step must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            multiplier: self.run.multiplier,
            simulated_delay: Duration::from_millis(self.run.simulated_delay_ms),
            ack_timeout: Duration::from_millis(self.device.ack_timeout_ms),
        }
    }

    pub fn device_target(&self) -> DeviceTarget {
        DeviceTarget::from_port_id(&self.device.port, self.device.baud)
    }

    pub fn timing_model(&self) -> TimingModel {
        TimingModel {
            lase_time: Duration::from_millis(self.estimate.lase_time_ms),
            point_overhead: Duration::from_millis(self.estimate.point_overhead_ms),
            step_time: Duration::from_millis(self.estimate.step_time_ms),
        }
    }
}

fn default_port() -> String { "0".to_string() }
fn default_baud() -> u32 { 9600 }
fn default_ack_timeout_ms() -> u64 { 5000 }
fn default_multiplier() -> u32 { 1 }
fn default_simulated_delay_ms() -> u64 { 100 }
fn default_lase_time_ms() -> u64 { 100 }
fn default_point_overhead_ms() -> u64 { 12 }
fn default_step_time_ms() -> u64 { 1 }
fn default_mm_per_step() -> f64 { 0.15 / 8.0 }
fn default_threshold() -> u8 { 10 }
fn default_max_size() -> u32 { 300 }
fn default_alpha_cutoff() -> u8 { 10 }

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
