//! Configuration management for the exchange layer.
//!
//! This module defines the setup structures exchanged between the firmware and the
//! extension, plus the surrounding application configuration. Everything is loaded
//! with `figment`:
//!
//! 1. Library defaults (`ChanTrigConfig::default()`)
//! 2. A TOML file (e.g. `config/chantrig.toml`)
//! 3. Environment variables prefixed with `CHANTRIG_`, using `__` to nest
//!    (e.g. `CHANTRIG_EXTENSION__DIVIDER_FRONTEND=2`)
//!
//! ## Schema
//!
//! - **`log_level`**: logging verbosity ("trace" .. "error").
//! - **`[firmware]`**: buffer lengths granted by the firmware, see [`FirmwareSettings`].
//! - **`[request]`**: optional buffer lengths the extension asks for. The firmware
//!   decides; the extension must rely on the granted `[firmware]` values only.
//! - **`[extension]`**: thresholds, dividers and spike capture, see [`ExtensionInfo`].
//! - **`[routing]`**: which outputs the host routes to the extension.
//! - **`[simulation]`**: parameters of the synthetic firmware used by the CLI.
//!
//! ## Validation
//!
//! `ChanTrigConfig::validate` checks the application-level keys. Setup validation of
//! the firmware/extension pair is done by [`crate::layout::BufferLayout::resolve`]
//! when the exchange layer is configured; a rejected setup means the extension does
//! not run.

use crate::error::{AppResult, ChanTrigError};
use crate::validation::{is_in_range, is_valid_log_level};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Buffer lengths granted by the firmware.
///
/// Lengths are expressed at the full master sample rate. They are fixed before the
/// first data exchange and cannot change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareSettings {
    /// Input sample ring length per group, firmware to extension.
    pub samples_buffer_len: u32,
    /// Spike ring length, firmware to extension.
    pub spikes_buffer_len: u32,
    /// Trigger queue length, extension to firmware.
    pub trigs_buffer_len: u32,
    /// Analog output ring length, extension to firmware.
    pub output_buffer_len: u32,
    /// Upper bound on the bytes all rings may occupy together.
    ///
    /// Without an explicit quota the rings are capped at
    /// [`MAX_EXCHANGE_BYTES`](crate::layout::MAX_EXCHANGE_BYTES).
    pub memory_quota_bytes: Option<u64>,
}

impl Default for FirmwareSettings {
    fn default() -> Self {
        Self {
            samples_buffer_len: 30_000,
            spikes_buffer_len: 4_096,
            trigs_buffer_len: 64,
            output_buffer_len: 30_000,
            memory_quota_bytes: Some(64 * 1024 * 1024),
        }
    }
}

/// Policy declared by the extension during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionInfo {
    /// Sample buffer fill percentage that raises a warning (0 = never).
    pub warn_samples_threshold: u32,
    /// Spike buffer fill percentage that raises a warning (0 = never).
    pub warn_spikes_threshold: u32,
    /// Reserved for future use, must be 0.
    pub reserved: u8,
    /// Front-end divider (0 = disabled, 1 = full rate, N = every Nth sample).
    pub divider_frontend: u32,
    /// Analog-input divider.
    pub divider_analog_input: u32,
    /// Digital-input divider.
    pub divider_digital_input: u32,
    /// Capture spikes. Disabled capture allocates no memory.
    pub spikes: bool,
}

impl Default for ExtensionInfo {
    fn default() -> Self {
        Self {
            warn_samples_threshold: 80,
            warn_spikes_threshold: 80,
            reserved: 0,
            divider_frontend: 1,
            divider_analog_input: 1,
            divider_digital_input: 1,
            spikes: true,
        }
    }
}

/// Outputs the host routes to the extension at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Analog output channels whose trigger source is the extension.
    pub analog_triggers: Vec<u16>,
    /// Digital output bits whose trigger source is the extension.
    pub digital_triggers: Vec<u16>,
    /// Analog output channels that play samples sent by the extension.
    pub analog_streams: Vec<u16>,
}

/// Parameters of the synthetic firmware and reference extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// How long to run.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Extension polling period.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Master ticks the firmware acquires per scheduling quantum.
    pub ticks_per_quantum: u32,
    /// Delay in master ticks between an input proctime and its aligned output.
    pub output_latency_ticks: u32,
    /// Frequency of the synthetic analog-input sine in Hz.
    pub signal_hz: f32,
    /// Amplitude of the synthetic sine.
    pub amplitude: f32,
    /// Standard deviation-like spread of the uniform noise added to every channel.
    pub noise: f32,
    /// Mean spike rate across all channels in Hz.
    pub spike_rate_hz: f32,
    /// Analog-input channel watched by the reference extension.
    pub watch_channel: u16,
    /// Level whose upward crossing fires a trigger.
    pub trigger_level: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            ticks_per_quantum: 300,
            output_latency_ticks: 900,
            signal_hz: 5.0,
            amplitude: 1000.0,
            noise: 25.0,
            spike_rate_hz: 200.0,
            watch_channel: 0,
            trigger_level: 500.0,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanTrigConfig {
    /// Logging verbosity level.
    pub log_level: String,
    /// Buffer lengths granted by the firmware.
    pub firmware: FirmwareSettings,
    /// Buffer lengths requested by the extension, if any.
    pub request: Option<FirmwareSettings>,
    /// Extension policy.
    pub extension: ExtensionInfo,
    /// Initial host routing.
    pub routing: RoutingConfig,
    /// Simulation parameters.
    pub simulation: SimulationConfig,
}

impl Default for ChanTrigConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            firmware: FirmwareSettings::default(),
            request: None,
            extension: ExtensionInfo::default(),
            routing: RoutingConfig {
                analog_triggers: vec![0],
                digital_triggers: vec![0],
                analog_streams: vec![0],
            },
            simulation: SimulationConfig::default(),
        }
    }
}

impl ChanTrigConfig {
    /// Load configuration from `config/chantrig.toml` and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/chantrig.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CHANTRIG_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate application-level keys after loading.
    pub fn validate(&self) -> AppResult<()> {
        is_valid_log_level(&self.log_level).map_err(|e| {
            ChanTrigError::ConfigurationRejected(format!("log_level '{}': {e}", self.log_level))
        })?;

        let sim = &self.simulation;
        if sim.poll_interval.is_zero() {
            return Err(ChanTrigError::ConfigurationRejected(
                "simulation.poll_interval must be greater than 0".into(),
            ));
        }
        is_in_range(sim.ticks_per_quantum, 1..=crate::registry::MAX_SAMPLE_RATE).map_err(|e| {
            ChanTrigError::ConfigurationRejected(format!("simulation.ticks_per_quantum: {e}"))
        })?;
        if usize::from(sim.watch_channel) >= crate::registry::ANALOG_INPUT_COUNT {
            return Err(ChanTrigError::ConfigurationRejected(format!(
                "simulation.watch_channel {} is not an analog input",
                sim.watch_channel
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ChanTrigConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_log_level_rejected() {
        let config = ChanTrigConfig {
            log_level: "loud".into(),
            ..ChanTrigConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level 'loud'"));
    }

    #[test]
    fn watch_channel_must_be_analog_input() {
        let mut config = ChanTrigConfig::default();
        config.simulation.watch_channel = 16;
        assert!(config.validate().is_err());
    }
}
