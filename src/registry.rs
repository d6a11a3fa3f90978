//! Channel registry.
//!
//! Static description of the channel groups exchanged between the firmware and
//! the extension, and of the output index space the trigger dispatcher
//! validates against. Nothing here is configurable at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of front-end channels.
pub const FRONTEND_COUNT: usize = 256;
/// Number of analog-input channels.
pub const ANALOG_INPUT_COUNT: usize = 16;
/// Total number of sampled input channels with spike capability.
pub const INPUT_COUNT: usize = FRONTEND_COUNT + ANALOG_INPUT_COUNT;
/// Number of digital-input ports.
pub const DIGITAL_INPUT_COUNT: usize = 1;
/// Number of analog-output channels.
pub const ANALOG_OUTPUT_COUNT: usize = 6;
/// Number of digital-output ports.
pub const DIGITAL_OUTPUT_PORTS: usize = 1;
/// Bits per digital-output port.
pub const DIGITAL_OUTPUT_BITS_PER_PORT: usize = 16;
/// Addressable digital-output bits (bit 0..=15 is the first port).
pub const DIGITAL_OUTPUT_COUNT: usize = DIGITAL_OUTPUT_PORTS * DIGITAL_OUTPUT_BITS_PER_PORT;
/// Trigger slots per output channel.
pub const TRIGGER_SLOTS: u8 = 8;
/// Points in a captured spike waveform.
pub const SPIKE_WAVEFORM_POINTS: usize = 128;

/// Master sample clock in Hz. Proctime counts ticks of this clock.
pub const MAX_SAMPLE_RATE: u32 = 30_000;

/// Input channel groups served by the sample buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputGroup {
    /// Primary high-density neural recording channels.
    Frontend,
    /// Auxiliary analog inputs.
    AnalogInput,
    /// Digital input port (one 16-bit word per sample).
    DigitalInput,
}

impl InputGroup {
    /// All input groups in exchange order.
    pub const ALL: [InputGroup; 3] = [
        InputGroup::Frontend,
        InputGroup::AnalogInput,
        InputGroup::DigitalInput,
    ];

    /// Number of channels in the group.
    pub const fn channel_count(self) -> usize {
        match self {
            InputGroup::Frontend => FRONTEND_COUNT,
            InputGroup::AnalogInput => ANALOG_INPUT_COUNT,
            InputGroup::DigitalInput => DIGITAL_INPUT_COUNT,
        }
    }

    /// Whether spikes are extracted on this group's channels.
    pub const fn has_spikes(self) -> bool {
        matches!(self, InputGroup::Frontend | InputGroup::AnalogInput)
    }

    /// Stable lowercase name used in logs and configuration.
    pub const fn name(self) -> &'static str {
        match self {
            InputGroup::Frontend => "frontend",
            InputGroup::AnalogInput => "analog_input",
            InputGroup::DigitalInput => "digital_input",
        }
    }
}

impl fmt::Display for InputGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Firmware-visible output addressed by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "channel", rename_all = "snake_case")]
pub enum OutputTarget {
    /// Analog output channel (0-based).
    Analog(u16),
    /// Digital output bit (0-based; bits 0..=15 belong to the first port).
    Digital(u16),
}

impl OutputTarget {
    /// Check the target against the registry.
    pub fn is_valid(self) -> bool {
        match self {
            OutputTarget::Analog(ch) => usize::from(ch) < ANALOG_OUTPUT_COUNT,
            OutputTarget::Digital(bit) => usize::from(bit) < DIGITAL_OUTPUT_COUNT,
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Analog(ch) => write!(f, "analog_output[{ch}]"),
            OutputTarget::Digital(bit) => write!(f, "digital_output[{bit}]"),
        }
    }
}

/// Whether a spike channel id addresses a spike-capable input channel.
pub fn is_spike_channel(channel: u16) -> bool {
    usize::from(channel) < INPUT_COUNT
}
