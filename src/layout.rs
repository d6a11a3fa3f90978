//! Setup-time resolution of buffer capacities.
//!
//! Turns the firmware's granted lengths and the extension's declared policy into
//! the exact capacity of every ring, and rejects the whole setup when the pair is
//! inconsistent or does not fit the memory quota.

use crate::config::{ExtensionInfo, FirmwareSettings};
use crate::divider::RateDivider;
use crate::error::{AppResult, ChanTrigError};
use crate::registry::{InputGroup, ANALOG_OUTPUT_COUNT, SPIKE_WAVEFORM_POINTS};
use crate::validation::{is_nonzero_len, is_percentage};
use serde::Serialize;

/// Capacity and footprint of one input sample ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupLayout {
    /// Channel group.
    pub group: InputGroup,
    /// Validated divider.
    pub divider: RateDivider,
    /// Capacity in frames (0 when disabled).
    pub frames: usize,
    /// Bytes reserved for the ring.
    pub bytes: usize,
}

/// Fully resolved, immutable ring layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferLayout {
    /// Firmware settings the layout was derived from.
    pub settings: FirmwareSettings,
    /// Extension policy the layout was derived from.
    pub info: ExtensionInfo,
    /// One entry per input group, in [`InputGroup::ALL`] order.
    pub groups: [GroupLayout; 3],
    /// Spike ring capacity (0 when capture is disabled).
    pub spike_capacity: usize,
    /// Analog output ring capacity.
    pub output_capacity: usize,
    /// Trigger queue capacity.
    pub trigger_capacity: usize,
    /// Bytes reserved by all rings together.
    pub total_bytes: usize,
}

// Ring payloads are stored as 32-bit words; sizes here match AtomicRing exactly.
const WORD: usize = std::mem::size_of::<u32>();

/// Ceiling applied when the firmware grants no explicit memory quota.
pub const MAX_EXCHANGE_BYTES: u64 = 1024 * 1024 * 1024;

fn sample_frame_bytes(group: InputGroup) -> usize {
    (1 + group.channel_count()) * WORD
}

fn spike_bytes() -> usize {
    (2 + SPIKE_WAVEFORM_POINTS / 2) * WORD
}

fn output_frame_bytes() -> usize {
    (2 + ANALOG_OUTPUT_COUNT / 2) * WORD
}

fn reject(message: String) -> ChanTrigError {
    ChanTrigError::ConfigurationRejected(message)
}

impl BufferLayout {
    /// Validate the setup pair and compute every ring's capacity.
    pub fn resolve(settings: &FirmwareSettings, info: &ExtensionInfo) -> AppResult<Self> {
        if info.reserved != 0 {
            return Err(reject(format!(
                "reserved field must be 0, got {}",
                info.reserved
            )));
        }
        is_percentage(info.warn_samples_threshold)
            .map_err(|e| reject(format!("warn_samples_threshold {}: {e}", info.warn_samples_threshold)))?;
        is_percentage(info.warn_spikes_threshold)
            .map_err(|e| reject(format!("warn_spikes_threshold {}: {e}", info.warn_spikes_threshold)))?;

        let raw_dividers = [
            info.divider_frontend,
            info.divider_analog_input,
            info.divider_digital_input,
        ];
        let mut groups = [GroupLayout {
            group: InputGroup::Frontend,
            divider: RateDivider::DISABLED,
            frames: 0,
            bytes: 0,
        }; 3];
        for ((slot, group), raw) in groups.iter_mut().zip(InputGroup::ALL).zip(raw_dividers) {
            let divider = RateDivider::new(group, raw)?;
            if divider.is_enabled() {
                is_nonzero_len(settings.samples_buffer_len).map_err(|e| {
                    reject(format!("{group} is enabled but samples_buffer_len is 0: {e}"))
                })?;
            }
            let frames = divider.frames_for(settings.samples_buffer_len);
            *slot = GroupLayout {
                group,
                divider,
                frames,
                bytes: frames.saturating_mul(sample_frame_bytes(group)),
            };
        }

        let spike_capacity = if info.spikes {
            is_nonzero_len(settings.spikes_buffer_len).map_err(|e| {
                reject(format!("spike capture is enabled but spikes_buffer_len is 0: {e}"))
            })?;
            settings.spikes_buffer_len as usize
        } else {
            0
        };
        let output_capacity = settings.output_buffer_len as usize;
        let trigger_capacity = settings.trigs_buffer_len as usize;

        let total_bytes = groups
            .iter()
            .map(|g| g.bytes)
            .chain([
                spike_capacity.saturating_mul(spike_bytes()),
                output_capacity.saturating_mul(output_frame_bytes()),
                trigger_capacity.saturating_mul(WORD),
            ])
            .fold(0usize, usize::saturating_add);

        let quota = settings.memory_quota_bytes.unwrap_or(MAX_EXCHANGE_BYTES);
        if total_bytes as u64 > quota {
            return Err(reject(format!(
                "buffers need {total_bytes} bytes, memory quota is {quota} bytes"
            )));
        }

        Ok(Self {
            settings: *settings,
            info: *info,
            groups,
            spike_capacity,
            output_capacity,
            trigger_capacity,
            total_bytes,
        })
    }

    /// Layout of one input group.
    pub fn group(&self, group: InputGroup) -> &GroupLayout {
        match group {
            InputGroup::Frontend => &self.groups[0],
            InputGroup::AnalogInput => &self.groups[1],
            InputGroup::DigitalInput => &self.groups[2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FirmwareSettings {
        FirmwareSettings {
            samples_buffer_len: 3000,
            spikes_buffer_len: 100,
            trigs_buffer_len: 16,
            output_buffer_len: 300,
            memory_quota_bytes: None,
        }
    }

    #[test]
    fn divider_shrinks_capacity() {
        let info = ExtensionInfo {
            divider_frontend: 3,
            divider_analog_input: 1,
            divider_digital_input: 0,
            ..ExtensionInfo::default()
        };
        let layout = BufferLayout::resolve(&settings(), &info).unwrap();
        assert_eq!(layout.group(InputGroup::Frontend).frames, 1000);
        assert_eq!(layout.group(InputGroup::AnalogInput).frames, 3000);
        assert_eq!(layout.group(InputGroup::DigitalInput).frames, 0);
        assert_eq!(layout.group(InputGroup::DigitalInput).bytes, 0);
        assert_eq!(layout.group(InputGroup::Frontend).bytes, 1000 * 257 * 4);
    }

    #[test]
    fn footprint_matches_components() {
        let info = ExtensionInfo {
            divider_frontend: 0,
            divider_analog_input: 0,
            divider_digital_input: 1,
            spikes: false,
            ..ExtensionInfo::default()
        };
        let layout = BufferLayout::resolve(&settings(), &info).unwrap();
        assert_eq!(layout.spike_capacity, 0);
        assert_eq!(layout.total_bytes, 3000 * 2 * 4 + 300 * 5 * 4 + 16 * 4);
    }

    #[test]
    fn oversized_length_without_quota_is_rejected() {
        let settings = FirmwareSettings {
            samples_buffer_len: u32::MAX,
            memory_quota_bytes: None,
            ..settings()
        };
        let err = BufferLayout::resolve(&settings, &ExtensionInfo::default()).unwrap_err();
        assert!(matches!(err, ChanTrigError::ConfigurationRejected(_)));
        assert!(err.to_string().contains(&MAX_EXCHANGE_BYTES.to_string()));
    }

    #[test]
    fn quota_exceeded_rejects_setup() {
        let mut settings = settings();
        settings.memory_quota_bytes = Some(1024);
        let err = BufferLayout::resolve(&settings, &ExtensionInfo::default()).unwrap_err();
        assert!(matches!(err, ChanTrigError::ConfigurationRejected(_)));
        assert!(err.to_string().contains("memory quota"));
    }

    #[test]
    fn invalid_policy_rejects_setup() {
        let cases = [
            ExtensionInfo {
                reserved: 1,
                ..ExtensionInfo::default()
            },
            ExtensionInfo {
                warn_samples_threshold: 101,
                ..ExtensionInfo::default()
            },
            ExtensionInfo {
                warn_spikes_threshold: 250,
                ..ExtensionInfo::default()
            },
            ExtensionInfo {
                divider_analog_input: 256,
                ..ExtensionInfo::default()
            },
        ];
        for info in cases {
            assert!(
                BufferLayout::resolve(&settings(), &info).is_err(),
                "{info:?} should be rejected"
            );
        }
    }

    #[test]
    fn enabled_ring_needs_length() {
        let mut no_samples = settings();
        no_samples.samples_buffer_len = 0;
        assert!(BufferLayout::resolve(&no_samples, &ExtensionInfo::default()).is_err());

        let mut no_spikes = settings();
        no_spikes.spikes_buffer_len = 0;
        assert!(BufferLayout::resolve(&no_spikes, &ExtensionInfo::default()).is_err());
        let without_capture = ExtensionInfo {
            spikes: false,
            ..ExtensionInfo::default()
        };
        assert!(BufferLayout::resolve(&no_spikes, &without_capture).is_ok());
    }
}
