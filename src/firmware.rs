//! Real-time side of the exchange.
//!
//! The firmware owns the single [`FirmwarePort`] returned by setup. It is the only
//! writer of the input rings and the only reader of the output and trigger rings,
//! so the port is not `Clone` and every producer operation takes `&mut self`.
//! Nothing here blocks, allocates or returns an error: outcomes are plain values.

use crate::config::{ExtensionInfo, FirmwareSettings};
use crate::data::{PushOutcome, SampleBuffer, SampleValue, SpikeRecord, SyncMode, TriggerRequest};
use crate::exchange::ExchangeCore;
use crate::layout::BufferLayout;
use crate::registry::{is_spike_channel, ANALOG_OUTPUT_COUNT};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Output latency applied to aligned frames unless configured otherwise (30 ms).
pub const DEFAULT_OUTPUT_LATENCY_TICKS: u32 = 900;

/// One master tick worth of acquired input.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame<'a> {
    /// Front-end channel values.
    pub frontend: &'a [f32],
    /// Analog-input channel values.
    pub analog_input: &'a [f32],
    /// Digital-input port word.
    pub digital_input: u16,
}

/// Output frame released by the firmware on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmittedOutput {
    /// Master tick the frame was emitted on.
    pub emitted_at: u32,
    /// Proctime carried by the frame (0 for synthesized frames).
    pub proctime: u32,
    /// Sync mode the frame was sent with.
    pub sync: SyncMode,
    /// Per-channel value; `None` where the host does not stream extension samples.
    pub values: [Option<i16>; ANALOG_OUTPUT_COUNT],
}

/// Firmware handle on the exchange rings.
pub struct FirmwarePort {
    core: Arc<ExchangeCore>,
    output_latency_ticks: u32,
}

impl std::fmt::Debug for FirmwarePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwarePort")
            .field("output_latency_ticks", &self.output_latency_ticks)
            .finish_non_exhaustive()
    }
}

fn push_group<T: SampleValue>(
    core: &ExchangeCore,
    buffer: &SampleBuffer<T>,
    proctime: u32,
    values: &[T],
) -> Option<PushOutcome> {
    if !buffer.divider().samples_at(proctime) {
        return None;
    }
    let outcome = buffer.push_frame(proctime, values);
    core.observe_samples(buffer.group());
    Some(outcome)
}

impl FirmwarePort {
    pub(crate) fn new(core: Arc<ExchangeCore>) -> Self {
        Self {
            core,
            output_latency_ticks: DEFAULT_OUTPUT_LATENCY_TICKS,
        }
    }

    /// Use `ticks` as the output latency for aligned frames.
    pub fn with_output_latency(mut self, ticks: u32) -> Self {
        self.output_latency_ticks = ticks;
        self
    }

    /// Output latency in master ticks.
    pub fn output_latency_ticks(&self) -> u32 {
        self.output_latency_ticks
    }

    /// Layout resolved at setup.
    pub fn layout(&self) -> &BufferLayout {
        &self.core.layout
    }

    /// Write one master tick of input, applying each group's divider.
    ///
    /// Returns how many groups stored a frame on this tick.
    pub fn acquire(&mut self, proctime: u32, frame: &InputFrame<'_>) -> usize {
        [
            self.push_frontend(proctime, frame.frontend),
            self.push_analog_input(proctime, frame.analog_input),
            self.push_digital_input(proctime, &[frame.digital_input]),
        ]
        .iter()
        .filter(|outcome| outcome.is_some())
        .count()
    }

    /// Write a front-end frame. `None` when the divider skips `proctime`.
    pub fn push_frontend(&mut self, proctime: u32, values: &[f32]) -> Option<PushOutcome> {
        push_group(&self.core, &self.core.frontend, proctime, values)
    }

    /// Write an analog-input frame. `None` when the divider skips `proctime`.
    pub fn push_analog_input(&mut self, proctime: u32, values: &[f32]) -> Option<PushOutcome> {
        push_group(&self.core, &self.core.analog_input, proctime, values)
    }

    /// Write a digital-input frame. `None` when the divider skips `proctime`.
    pub fn push_digital_input(&mut self, proctime: u32, values: &[u16]) -> Option<PushOutcome> {
        push_group(&self.core, &self.core.digital_input, proctime, values)
    }

    /// Store a detected spike.
    ///
    /// Returns `false` when capture is disabled or the channel has no spike
    /// extraction. A full ring evicts its oldest spike.
    pub fn capture_spike(&mut self, spike: &SpikeRecord) -> bool {
        if self.core.spikes.capacity() == 0 || !is_spike_channel(spike.channel) {
            return false;
        }
        self.core.spikes.push(spike);
        self.core.observe_spikes();
        true
    }

    /// Release at most one output frame on master tick `now`.
    ///
    /// Immediate frames and synthesized frames leave as soon as they reach the
    /// head of the ring. Aligned frames wait until `proctime + latency`; a late
    /// aligned frame leaves immediately. Frames are never reordered.
    pub fn next_output(&mut self, now: u32) -> Option<EmittedOutput> {
        let (frame, sync) = self.core.output.front()?;
        let due = match sync {
            SyncMode::Aligned if !frame.is_synthesized() => {
                frame.proctime.wrapping_add(self.output_latency_ticks)
            }
            _ => now,
        };
        if (now.wrapping_sub(due) as i32) < 0 {
            return None;
        }
        self.core.output.pop_front()?;

        let routing = &self.core.routing;
        let mut values = [None; ANALOG_OUTPUT_COUNT];
        for (ch, (slot, value)) in values.iter_mut().zip(frame.values).enumerate() {
            if routing.streams_extension_samples(ch) {
                *slot = Some(value);
            }
        }
        Some(EmittedOutput {
            emitted_at: now,
            proctime: frame.proctime,
            sync,
            values,
        })
    }

    /// Take the oldest pending trigger request.
    pub fn next_trigger(&mut self) -> Option<TriggerRequest> {
        self.core.dispatcher.queue().pop()
    }
}

/// Firmware-side policy for granting buffer lengths.
///
/// An extension may ask for its own lengths; the firmware honours them when the
/// resulting layout fits the firmware's memory quota and otherwise grants its
/// defaults. Only the granted values reach setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareBudget {
    defaults: FirmwareSettings,
}

impl FirmwareBudget {
    /// Budget granting `defaults` unless a request fits.
    pub fn new(defaults: FirmwareSettings) -> Self {
        Self { defaults }
    }

    /// Lengths granted when no request is honoured.
    pub fn defaults(&self) -> FirmwareSettings {
        self.defaults
    }

    /// Settle the lengths the extension will run with.
    pub fn grant(&self, request: Option<&FirmwareSettings>, info: &ExtensionInfo) -> FirmwareSettings {
        let Some(request) = request else {
            return self.defaults;
        };
        let candidate = FirmwareSettings {
            memory_quota_bytes: self.defaults.memory_quota_bytes,
            ..*request
        };
        match BufferLayout::resolve(&candidate, info) {
            Ok(layout) => {
                info!(
                    total_bytes = layout.total_bytes,
                    samples_buffer_len = candidate.samples_buffer_len,
                    "Granted requested buffer lengths"
                );
                candidate
            }
            Err(e) => {
                warn!(error = %e, "Requested buffer lengths refused, granting defaults");
                self.defaults
            }
        }
    }
}

impl Default for FirmwareBudget {
    fn default() -> Self {
        Self::new(FirmwareSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{OutputBlock, Spikes};
    use crate::exchange::{ChanTrig, Samples, SamplesCount};
    use crate::host::{RecordingHost, RoutingTable};
    use crate::registry::{InputGroup, INPUT_COUNT};

    fn settings() -> FirmwareSettings {
        FirmwareSettings {
            samples_buffer_len: 30,
            spikes_buffer_len: 4,
            trigs_buffer_len: 4,
            output_buffer_len: 8,
            memory_quota_bytes: None,
        }
    }

    fn active(info: ExtensionInfo) -> (ChanTrig, FirmwarePort, Arc<RoutingTable>) {
        let routing = Arc::new(RoutingTable::new());
        let exchange = ChanTrig::new(Arc::new(RecordingHost::new()), routing.clone());
        let port = exchange.setup(&settings(), &info).unwrap();
        (exchange, port, routing)
    }

    #[test]
    fn acquire_applies_dividers() {
        let info = ExtensionInfo {
            divider_frontend: 3,
            divider_analog_input: 1,
            divider_digital_input: 0,
            ..ExtensionInfo::default()
        };
        let (mut exchange, mut port, _) = active(info);
        let frontend = [0.5f32; 256];
        let analog = [0.25f32; 16];
        for t in 0..9u32 {
            port.acquire(
                t,
                &InputFrame {
                    frontend: &frontend,
                    analog_input: &analog,
                    digital_input: 0xA5A5,
                },
            );
        }

        let counts = exchange.get_samples_count().unwrap();
        assert_eq!(counts.frontend, 3);
        assert_eq!(counts.analog_input, 9);
        assert_eq!(counts.digital_input, 0);

        let mut samples = Samples::with_capacity(SamplesCount::uniform(16));
        exchange.get_samples(&mut samples).unwrap();
        let times: Vec<u32> = (0..3)
            .filter_map(|i| samples.frontend.sample_time(i))
            .collect();
        assert_eq!(times, vec![0, 3, 6]);
        assert_eq!(samples.frontend.period_ticks(), 3);
        assert_eq!(samples.digital_input.len(), 0);
    }

    #[test]
    fn push_on_skipped_tick_is_none() {
        let info = ExtensionInfo {
            divider_analog_input: 2,
            ..ExtensionInfo::default()
        };
        let (_, mut port, _) = active(info);
        assert!(port.push_analog_input(1, &[0.0; 16]).is_none());
        assert_eq!(
            port.push_analog_input(2, &[0.0; 16]),
            Some(PushOutcome::Stored)
        );
    }

    #[test]
    fn aligned_output_waits_for_latency() {
        let (mut exchange, port, routing) = active(ExtensionInfo::default());
        let mut port = port.with_output_latency(10);
        routing.set_streaming(0, true);

        let mut block = OutputBlock::with_capacity(2);
        block.push(100, [7, 1, 2, 3, 4, 5]);
        exchange.send_samples(&block, SyncMode::Aligned).unwrap();

        assert_eq!(port.next_output(100), None);
        assert_eq!(port.next_output(109), None);
        let emitted = port.next_output(110).unwrap();
        assert_eq!(emitted.proctime, 100);
        assert_eq!(emitted.values[0], Some(7));
        assert_eq!(emitted.values[1], None);
        assert_eq!(port.next_output(111), None);
    }

    #[test]
    fn synthesized_and_immediate_frames_leave_at_once() {
        let (mut exchange, mut port, _) = active(ExtensionInfo::default());
        let mut block = OutputBlock::with_capacity(1);
        block.push_synthesized([1; 6]);
        exchange.send_samples(&block, SyncMode::Aligned).unwrap();
        assert!(port.next_output(5).is_some());

        block.clear();
        block.push(50_000, [2; 6]);
        exchange.send_samples(&block, SyncMode::Immediate).unwrap();
        let emitted = port.next_output(6).unwrap();
        assert_eq!(emitted.emitted_at, 6);
        assert_eq!(emitted.values, [None; 6]);
    }

    #[test]
    fn aligned_output_survives_proctime_wrap() {
        let (mut exchange, port, _) = active(ExtensionInfo::default());
        let mut port = port.with_output_latency(20);
        let mut block = OutputBlock::with_capacity(1);
        block.push(u32::MAX - 5, [0; 6]);
        exchange.send_samples(&block, SyncMode::Aligned).unwrap();

        assert_eq!(port.next_output(u32::MAX), None);
        assert!(port.next_output(14).is_some());
    }

    #[test]
    fn spikes_outside_input_space_are_refused() {
        let (mut exchange, mut port, _) = active(ExtensionInfo::default());
        let bad = SpikeRecord {
            channel: INPUT_COUNT as u16,
            ..SpikeRecord::default()
        };
        assert!(!port.capture_spike(&bad));
        let mut spikes = Spikes::with_capacity(4);
        assert_eq!(exchange.get_spikes(&mut spikes).unwrap(), 0);
    }

    #[test]
    fn disabled_spike_capture_refuses_everything() {
        let info = ExtensionInfo {
            spikes: false,
            ..ExtensionInfo::default()
        };
        let (_, mut port, _) = active(info);
        assert!(!port.capture_spike(&SpikeRecord::default()));
        assert_eq!(port.layout().spike_capacity, 0);
        assert_eq!(port.layout().group(InputGroup::Frontend).frames, 30);
    }

    #[test]
    fn budget_honours_fitting_request() {
        let budget = FirmwareBudget::new(FirmwareSettings {
            memory_quota_bytes: Some(16 * 1024 * 1024),
            ..FirmwareSettings::default()
        });
        let request = FirmwareSettings {
            samples_buffer_len: 3_000,
            ..FirmwareSettings::default()
        };
        let granted = budget.grant(Some(&request), &ExtensionInfo::default());
        assert_eq!(granted.samples_buffer_len, 3_000);
        assert_eq!(granted.memory_quota_bytes, Some(16 * 1024 * 1024));
    }

    #[test]
    fn budget_falls_back_to_defaults() {
        let defaults = FirmwareSettings {
            samples_buffer_len: 300,
            memory_quota_bytes: Some(4 * 1024 * 1024),
            ..FirmwareSettings::default()
        };
        let budget = FirmwareBudget::new(defaults);
        let greedy = FirmwareSettings {
            samples_buffer_len: 1_000_000,
            ..FirmwareSettings::default()
        };
        assert_eq!(budget.grant(Some(&greedy), &ExtensionInfo::default()), defaults);
        assert_eq!(budget.grant(None, &ExtensionInfo::default()), defaults);
    }
}
