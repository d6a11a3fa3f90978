//! Sample exchange API used by the extension.
//!
//! [`ChanTrig`] starts **Unconfigured**: every call except [`ChanTrig::setup`] fails
//! with [`ChanTrigError::Uninitialized`]. A successful setup allocates every ring
//! once, hands the real-time side its [`FirmwarePort`] and moves the layer to
//! **Active** for the rest of its lifetime.
//!
//! # Example
//! ```
//! use chantrig::config::{ExtensionInfo, FirmwareSettings};
//! use chantrig::exchange::{ChanTrig, Samples, SamplesCount};
//!
//! # fn main() -> Result<(), chantrig::error::ChanTrigError> {
//! let mut exchange = ChanTrig::with_defaults();
//! let mut firmware = exchange.setup(&FirmwareSettings::default(), &ExtensionInfo::default())?;
//!
//! firmware.push_analog_input(0, &[1.0; 16]);
//!
//! let mut samples = Samples::with_capacity(SamplesCount::uniform(64));
//! let got = exchange.get_samples(&mut samples)?;
//! assert_eq!(got.analog_input, 1);
//! exchange.consume_samples(got)?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ExtensionInfo, FirmwareSettings};
use crate::data::{
    ConsumedRun, GroupSamples, OutputBlock, OutputSampleBuffer, PushOutcome, SampleBuffer,
    SampleValue, SpikeBuffer, Spikes, SyncMode,
};
use crate::dispatch::{TriggerDispatcher, TriggerOutcome};
use crate::error::{AppResult, ChanTrigError};
use crate::firmware::FirmwarePort;
use crate::host::{Advisory, BufferKind, HostChannel, OutputRouting, RoutingTable, TracingHost};
use crate::layout::BufferLayout;
use crate::monitor::ThresholdMonitor;
use crate::registry::{InputGroup, OutputTarget};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, instrument};

/// Lifecycle state of the exchange layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    /// Setup has not completed.
    Unconfigured,
    /// Buffers are allocated and every operation is available.
    Active,
}

/// Frame counts per input group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplesCount {
    /// Front-end frames.
    pub frontend: u32,
    /// Analog-input frames.
    pub analog_input: u32,
    /// Digital-input frames.
    pub digital_input: u32,
}

impl SamplesCount {
    /// Same count for every group.
    pub fn uniform(count: u32) -> Self {
        Self {
            frontend: count,
            analog_input: count,
            digital_input: count,
        }
    }

    /// Count for `group`.
    pub fn get(&self, group: InputGroup) -> u32 {
        match group {
            InputGroup::Frontend => self.frontend,
            InputGroup::AnalogInput => self.analog_input,
            InputGroup::DigitalInput => self.digital_input,
        }
    }

    /// Set the count for `group`.
    pub fn set(&mut self, group: InputGroup, count: u32) {
        match group {
            InputGroup::Frontend => self.frontend = count,
            InputGroup::AnalogInput => self.analog_input = count,
            InputGroup::DigitalInput => self.digital_input = count,
        }
    }

    /// Sum over all groups.
    pub fn total(&self) -> u64 {
        u64::from(self.frontend) + u64::from(self.analog_input) + u64::from(self.digital_input)
    }
}

/// Caller-owned destination for one `get_samples` call, keyed by group.
#[derive(Debug, Clone)]
pub struct Samples {
    /// Front-end samples.
    pub frontend: GroupSamples<f32>,
    /// Analog-input samples.
    pub analog_input: GroupSamples<f32>,
    /// Digital-input samples.
    pub digital_input: GroupSamples<u16>,
}

impl Samples {
    /// Preallocate each group for the requested maximum number of frames.
    pub fn with_capacity(max: SamplesCount) -> Self {
        Self {
            frontend: GroupSamples::for_group(InputGroup::Frontend, max.frontend as usize),
            analog_input: GroupSamples::for_group(
                InputGroup::AnalogInput,
                max.analog_input as usize,
            ),
            digital_input: GroupSamples::for_group(
                InputGroup::DigitalInput,
                max.digital_input as usize,
            ),
        }
    }

    /// Frames delivered by the last `get_samples`.
    pub fn counts(&self) -> SamplesCount {
        SamplesCount {
            frontend: self.frontend.len() as u32,
            analog_input: self.analog_input.len() as u32,
            digital_input: self.digital_input.len() as u32,
        }
    }
}

/// Advisory counters of one input group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupDiagnostics {
    /// Channel group.
    pub group: InputGroup,
    /// Frames queued right now.
    pub queued: usize,
    /// Ring capacity in frames.
    pub capacity: usize,
    /// Frames evicted by the producer on overflow.
    pub evicted: u64,
    /// Frames the consumer found missing between blocks.
    pub dropped_detected: u64,
    /// Threshold warnings raised.
    pub threshold_warnings: u64,
}

/// Snapshot of every advisory counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Per-group sample counters.
    pub groups: Vec<GroupDiagnostics>,
    /// Spikes queued right now.
    pub spikes_queued: usize,
    /// Spike threshold warnings raised.
    pub spike_threshold_warnings: u64,
    /// Output frames queued for the firmware.
    pub output_queued: usize,
    /// Output frames refused on a full ring.
    pub output_rejected: u64,
    /// Trigger requests waiting for the firmware.
    pub triggers_queued: usize,
    /// Trigger requests dropped on a full queue.
    pub triggers_dropped: u64,
}

/// Rings and monitors shared by the extension and the firmware.
pub(crate) struct ExchangeCore {
    pub(crate) layout: BufferLayout,
    pub(crate) frontend: SampleBuffer<f32>,
    pub(crate) analog_input: SampleBuffer<f32>,
    pub(crate) digital_input: SampleBuffer<u16>,
    pub(crate) spikes: SpikeBuffer,
    pub(crate) output: OutputSampleBuffer,
    pub(crate) dispatcher: TriggerDispatcher,
    pub(crate) sample_monitors: [ThresholdMonitor; 3],
    pub(crate) spike_monitor: ThresholdMonitor,
    pub(crate) host: Arc<dyn HostChannel>,
    pub(crate) routing: Arc<dyn OutputRouting>,
}

impl ExchangeCore {
    fn new(
        layout: BufferLayout,
        host: Arc<dyn HostChannel>,
        routing: Arc<dyn OutputRouting>,
    ) -> Self {
        let sample_buffer = |group: InputGroup| {
            let g = layout.group(group);
            (g.divider, g.frames)
        };
        let (fe_div, fe_frames) = sample_buffer(InputGroup::Frontend);
        let (ai_div, ai_frames) = sample_buffer(InputGroup::AnalogInput);
        let (di_div, di_frames) = sample_buffer(InputGroup::DigitalInput);
        let samples_threshold = layout.info.warn_samples_threshold;

        Self {
            frontend: SampleBuffer::new(InputGroup::Frontend, fe_div, fe_frames),
            analog_input: SampleBuffer::new(InputGroup::AnalogInput, ai_div, ai_frames),
            digital_input: SampleBuffer::new(InputGroup::DigitalInput, di_div, di_frames),
            spikes: SpikeBuffer::new(layout.spike_capacity),
            output: OutputSampleBuffer::new(layout.output_capacity),
            dispatcher: TriggerDispatcher::new(
                layout.trigger_capacity,
                routing.clone(),
                host.clone(),
            ),
            sample_monitors: InputGroup::ALL
                .map(|g| ThresholdMonitor::new(BufferKind::Samples(g), samples_threshold)),
            spike_monitor: ThresholdMonitor::new(BufferKind::Spikes, layout.info.warn_spikes_threshold),
            host,
            routing,
            layout,
        }
    }

    pub(crate) fn fill_percent(&self, group: InputGroup) -> u32 {
        match group {
            InputGroup::Frontend => self.frontend.fill_percent(),
            InputGroup::AnalogInput => self.analog_input.fill_percent(),
            InputGroup::DigitalInput => self.digital_input.fill_percent(),
        }
    }

    pub(crate) fn observe_samples(&self, group: InputGroup) {
        self.sample_monitors[group_index(group)]
            .observe_and_report(|| self.fill_percent(group), self.host.as_ref());
    }

    pub(crate) fn observe_spikes(&self) {
        self.spike_monitor
            .observe_and_report(|| self.spikes.fill_percent(), self.host.as_ref());
    }

    fn queued(&self, group: InputGroup) -> usize {
        match group {
            InputGroup::Frontend => self.frontend.len(),
            InputGroup::AnalogInput => self.analog_input.len(),
            InputGroup::DigitalInput => self.digital_input.len(),
        }
    }

    fn consume_run(&self, group: InputGroup, max: usize, end: Option<u32>) -> ConsumedRun {
        fn release<T: SampleValue>(
            buffer: &SampleBuffer<T>,
            max: usize,
            end: Option<u32>,
        ) -> ConsumedRun {
            match end {
                Some(end) => buffer.consume_run_before(max, end),
                None => buffer.consume_run(max),
            }
        }
        match group {
            InputGroup::Frontend => release(&self.frontend, max, end),
            InputGroup::AnalogInput => release(&self.analog_input, max, end),
            InputGroup::DigitalInput => release(&self.digital_input, max, end),
        }
    }
}

pub(crate) fn group_index(group: InputGroup) -> usize {
    match group {
        InputGroup::Frontend => 0,
        InputGroup::AnalogInput => 1,
        InputGroup::DigitalInput => 2,
    }
}

/// Bookkeeping owned by the consuming side of the sample rings.
#[derive(Debug, Default)]
struct ReaderState {
    expected_next: [Option<u32>; 3],
    pulled_end: [Option<u32>; 3],
    dropped_detected: [u64; 3],
    output_rejected: u64,
}

impl ReaderState {
    fn track_drops(&mut self, core: &ExchangeCore, group: InputGroup, run: &ConsumedRun) {
        let (Some(first), Some(next)) = (run.first_proctime, run.next_proctime) else {
            return;
        };
        let Some(period) = core.layout.group(group).divider.period_ticks() else {
            return;
        };
        let idx = group_index(group);
        let Some(expected) = self.expected_next[idx].replace(next) else {
            return;
        };

        let delta = first.wrapping_sub(expected);
        // Deltas in the upper half mean the clock went backwards: resynchronise silently.
        if delta == 0 || delta > i32::MAX as u32 {
            return;
        }
        let frames = delta / period;
        if frames == 0 {
            return;
        }
        self.dropped_detected[idx] += u64::from(frames);
        core.host.comment(&Advisory::SamplesDropped {
            group,
            frames,
            expected,
            found: first,
        });
    }
}

fn active(core: &OnceLock<Arc<ExchangeCore>>) -> AppResult<&ExchangeCore> {
    core.get()
        .map(|core| &**core)
        .ok_or(ChanTrigError::Uninitialized)
}

/// Extension-side handle of the exchange layer.
///
/// The data-path operations take `&mut self`: the handle is the only consumer of
/// the input and spike rings and the only producer of the output and trigger
/// rings. Sharing it between threads requires external locking.
pub struct ChanTrig {
    core: OnceLock<Arc<ExchangeCore>>,
    host: Arc<dyn HostChannel>,
    routing: Arc<dyn OutputRouting>,
    reader: ReaderState,
}

impl ChanTrig {
    /// Unconfigured exchange reporting to `host` and consulting `routing`.
    pub fn new(host: Arc<dyn HostChannel>, routing: Arc<dyn OutputRouting>) -> Self {
        Self {
            core: OnceLock::new(),
            host,
            routing,
            reader: ReaderState::default(),
        }
    }

    /// Unconfigured exchange logging through `tracing` with nothing routed to it.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(TracingHost), Arc::new(RoutingTable::new()))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExchangeState {
        if self.core.get().is_some() {
            ExchangeState::Active
        } else {
            ExchangeState::Unconfigured
        }
    }

    /// Validate the setup pair, allocate every ring and activate the layer.
    ///
    /// Returns the firmware-side port. Any validation failure rejects the whole
    /// setup; a second setup is rejected as well.
    #[instrument(skip_all, name = "chantrig_setup")]
    pub fn setup(&self, settings: &FirmwareSettings, info: &ExtensionInfo) -> AppResult<FirmwarePort> {
        if self.core.get().is_some() {
            return Err(ChanTrigError::ConfigurationRejected(
                "exchange layer is already configured".into(),
            ));
        }

        let layout = BufferLayout::resolve(settings, info).inspect_err(|e| {
            error!(error = %e, "Channel trigger setup rejected");
        })?;
        let total_bytes = layout.total_bytes;
        let core = Arc::new(ExchangeCore::new(
            layout,
            self.host.clone(),
            self.routing.clone(),
        ));
        self.core.set(core.clone()).map_err(|_| {
            ChanTrigError::ConfigurationRejected("exchange layer is already configured".into())
        })?;

        info!(
            total_bytes,
            frontend_frames = core.frontend.capacity(),
            analog_input_frames = core.analog_input.capacity(),
            digital_input_frames = core.digital_input.capacity(),
            spike_capacity = core.spikes.capacity(),
            "Channel trigger exchange active"
        );
        Ok(FirmwarePort::new(core))
    }

    /// Granted firmware settings.
    pub fn settings(&self) -> AppResult<FirmwareSettings> {
        Ok(active(&self.core)?.layout.settings)
    }

    /// Resolved ring layout.
    pub fn layout(&self) -> AppResult<&BufferLayout> {
        Ok(&active(&self.core)?.layout)
    }

    /// Frames queued per group. Disabled groups report 0.
    pub fn get_samples_count(&self) -> AppResult<SamplesCount> {
        let core = active(&self.core)?;
        let mut counts = SamplesCount::default();
        for group in InputGroup::ALL {
            counts.set(group, core.queued(group) as u32);
        }
        Ok(counts)
    }

    /// Copy up to each group's preallocated capacity of gap-free frames into `samples`.
    ///
    /// Nothing is consumed: calling again without [`ChanTrig::consume_samples`]
    /// returns the same data. Returns the frames delivered per group.
    pub fn get_samples(&mut self, samples: &mut Samples) -> AppResult<SamplesCount> {
        let core = active(&self.core)?;
        core.frontend.pull_into(&mut samples.frontend);
        core.analog_input.pull_into(&mut samples.analog_input);
        core.digital_input.pull_into(&mut samples.digital_input);

        let ends = [
            (samples.frontend.len(), samples.frontend.next_proctime()),
            (samples.analog_input.len(), samples.analog_input.next_proctime()),
            (samples.digital_input.len(), samples.digital_input.next_proctime()),
        ];
        for (slot, (len, end)) in self.reader.pulled_end.iter_mut().zip(ends) {
            *slot = (len > 0).then_some(end);
        }
        Ok(samples.counts())
    }

    /// Release up to `max` frames per group.
    ///
    /// Consumption stops at a time discontinuity so the next block starts right
    /// after the dropped samples; the gap is reported as an advisory. The first
    /// consume after a [`ChanTrig::get_samples`] never releases frames newer than
    /// the block it delivered; later consumes are bounded by `max` only. Returns
    /// the frames released per group.
    pub fn consume_samples(&mut self, max: SamplesCount) -> AppResult<SamplesCount> {
        let core = active(&self.core)?;
        let mut consumed = SamplesCount::default();
        for group in InputGroup::ALL {
            let idx = group_index(group);
            let end = self.reader.pulled_end[idx].take();
            let wanted = max.get(group) as usize;
            if wanted == 0 {
                continue;
            }
            let run = core.consume_run(group, wanted, end);
            self.reader.track_drops(core, group, &run);
            consumed.set(group, run.frames as u32);
            core.observe_samples(group);
        }
        Ok(consumed)
    }

    /// Queue output frames for the firmware.
    ///
    /// Returns the frames accepted. A full output ring refuses the remainder of the
    /// block (reported as an advisory); the extension must pace its sends.
    pub fn send_samples(&mut self, block: &OutputBlock, sync: SyncMode) -> AppResult<usize> {
        let core = active(&self.core)?;
        let mut accepted = 0;
        for frame in block.frames() {
            if core.output.push(frame, sync) == PushOutcome::Rejected {
                break;
            }
            accepted += 1;
        }

        if accepted < block.len() {
            self.reader.output_rejected += (block.len() - accepted) as u64;
            core.host.comment(&Advisory::OutputRejected {
                requested: block.len(),
                accepted,
            });
        }
        Ok(accepted)
    }

    /// Drain up to the preallocated number of spikes into `spikes`.
    ///
    /// Spikes are consumed by this call. Spikes evicted on overflow are gone
    /// without trace.
    pub fn get_spikes(&mut self, spikes: &mut Spikes) -> AppResult<usize> {
        let core = active(&self.core)?;
        let count = core.spikes.drain_into(spikes);
        core.observe_spikes();
        Ok(count)
    }

    /// Fire trigger `trigger_index` of analog output `channel`.
    pub fn trigger_analog_output(
        &mut self,
        channel: u16,
        trigger_index: u8,
    ) -> AppResult<TriggerOutcome> {
        active(&self.core)?
            .dispatcher
            .dispatch(OutputTarget::Analog(channel), trigger_index)
    }

    /// Fire trigger `trigger_index` of digital output bit `channel`.
    pub fn trigger_digital_output(
        &mut self,
        channel: u16,
        trigger_index: u8,
    ) -> AppResult<TriggerOutcome> {
        active(&self.core)?
            .dispatcher
            .dispatch(OutputTarget::Digital(channel), trigger_index)
    }

    /// Snapshot of every advisory counter.
    pub fn diagnostics(&self) -> AppResult<Diagnostics> {
        let core = active(&self.core)?;
        let groups = InputGroup::ALL
            .iter()
            .map(|&group| {
                let idx = group_index(group);
                let (capacity, evicted) = match group {
                    InputGroup::Frontend => (core.frontend.capacity(), core.frontend.evicted()),
                    InputGroup::AnalogInput => {
                        (core.analog_input.capacity(), core.analog_input.evicted())
                    }
                    InputGroup::DigitalInput => {
                        (core.digital_input.capacity(), core.digital_input.evicted())
                    }
                };
                GroupDiagnostics {
                    group,
                    queued: core.queued(group),
                    capacity,
                    evicted,
                    dropped_detected: self.reader.dropped_detected[idx],
                    threshold_warnings: core.sample_monitors[idx].crossings(),
                }
            })
            .collect();

        Ok(Diagnostics {
            groups,
            spikes_queued: core.spikes.len(),
            spike_threshold_warnings: core.spike_monitor.crossings(),
            output_queued: core.output.len(),
            output_rejected: self.reader.output_rejected,
            triggers_queued: core.dispatcher.queue().len(),
            triggers_dropped: core.dispatcher.dropped(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SpikeRecord;
    use crate::host::{RecordingHost, TriggerSource};

    fn small_settings() -> FirmwareSettings {
        FirmwareSettings {
            samples_buffer_len: 8,
            spikes_buffer_len: 4,
            trigs_buffer_len: 4,
            output_buffer_len: 4,
            memory_quota_bytes: None,
        }
    }

    fn exchange() -> (ChanTrig, Arc<RecordingHost>, Arc<RoutingTable>) {
        let host = Arc::new(RecordingHost::new());
        let routing = Arc::new(RoutingTable::new());
        (ChanTrig::new(host.clone(), routing.clone()), host, routing)
    }

    #[test]
    fn calls_before_setup_are_uninitialized() {
        let (mut exchange, _, _) = exchange();
        assert_eq!(exchange.state(), ExchangeState::Unconfigured);
        let mut samples = Samples::with_capacity(SamplesCount::uniform(1));
        let mut spikes = Spikes::with_capacity(1);

        assert!(matches!(exchange.get_samples_count(), Err(ChanTrigError::Uninitialized)));
        assert!(matches!(exchange.get_samples(&mut samples), Err(ChanTrigError::Uninitialized)));
        assert!(matches!(
            exchange.consume_samples(SamplesCount::uniform(1)),
            Err(ChanTrigError::Uninitialized)
        ));
        assert!(matches!(
            exchange.send_samples(&OutputBlock::default(), SyncMode::Immediate),
            Err(ChanTrigError::Uninitialized)
        ));
        assert!(matches!(exchange.get_spikes(&mut spikes), Err(ChanTrigError::Uninitialized)));
        assert!(matches!(
            exchange.trigger_analog_output(0, 0),
            Err(ChanTrigError::Uninitialized)
        ));
        assert!(matches!(exchange.settings(), Err(ChanTrigError::Uninitialized)));
    }

    #[test]
    fn setup_activates_once() {
        let (exchange, _, _) = exchange();
        exchange
            .setup(&small_settings(), &ExtensionInfo::default())
            .unwrap();
        assert_eq!(exchange.state(), ExchangeState::Active);
        assert_eq!(exchange.settings().unwrap(), small_settings());

        let again = exchange.setup(&small_settings(), &ExtensionInfo::default());
        assert!(matches!(again, Err(ChanTrigError::ConfigurationRejected(_))));
    }

    #[test]
    fn rejected_setup_stays_unconfigured() {
        let (exchange, _, _) = exchange();
        let info = ExtensionInfo {
            reserved: 7,
            ..ExtensionInfo::default()
        };
        assert!(exchange.setup(&small_settings(), &info).is_err());
        assert_eq!(exchange.state(), ExchangeState::Unconfigured);
    }

    #[test]
    fn get_samples_is_idempotent_until_consumed() {
        let (mut exchange, _, _) = exchange();
        let mut fw = exchange
            .setup(&small_settings(), &ExtensionInfo::default())
            .unwrap();
        for t in 0..3u32 {
            fw.push_analog_input(t, &[t as f32; 16]);
        }

        let mut first = Samples::with_capacity(SamplesCount::uniform(8));
        let mut second = Samples::with_capacity(SamplesCount::uniform(8));
        exchange.get_samples(&mut first).unwrap();
        exchange.get_samples(&mut second).unwrap();
        assert_eq!(first.analog_input.channel(3), second.analog_input.channel(3));
        assert_eq!(first.counts(), second.counts());
        assert_eq!(first.counts().analog_input, 3);

        let consumed = exchange.consume_samples(first.counts()).unwrap();
        assert_eq!(consumed.analog_input, 3);
        assert_eq!(exchange.get_samples_count().unwrap(), SamplesCount::default());
    }

    #[test]
    fn gap_between_blocks_is_reported() {
        let (mut exchange, host, _) = exchange();
        let mut fw = exchange
            .setup(&small_settings(), &ExtensionInfo::default())
            .unwrap();
        let mut samples = Samples::with_capacity(SamplesCount::uniform(8));

        fw.push_digital_input(0, &[1]);
        fw.push_digital_input(1, &[2]);
        exchange.get_samples(&mut samples).unwrap();
        exchange.consume_samples(samples.counts()).unwrap();

        fw.push_digital_input(5, &[3]);
        exchange.get_samples(&mut samples).unwrap();
        assert_eq!(samples.digital_input.proctime(), 5);
        exchange.consume_samples(samples.counts()).unwrap();

        let diag = exchange.diagnostics().unwrap();
        assert_eq!(diag.groups[2].dropped_detected, 3);
        assert!(host.advisories().contains(&Advisory::SamplesDropped {
            group: InputGroup::DigitalInput,
            frames: 3,
            expected: 2,
            found: 5,
        }));
    }

    #[test]
    fn send_samples_refuses_beyond_capacity() {
        let (mut exchange, host, _) = exchange();
        exchange
            .setup(&small_settings(), &ExtensionInfo::default())
            .unwrap();
        let mut block = OutputBlock::with_capacity(6);
        for v in 0..6 {
            block.push_synthesized([v; 6]);
        }
        assert_eq!(exchange.send_samples(&block, SyncMode::Immediate).unwrap(), 4);
        assert_eq!(exchange.diagnostics().unwrap().output_rejected, 2);
        assert_eq!(
            host.advisories(),
            vec![Advisory::OutputRejected {
                requested: 6,
                accepted: 4
            }]
        );
    }

    #[test]
    fn triggers_follow_routing() {
        let (mut exchange, _, routing) = exchange();
        let mut fw = exchange
            .setup(&small_settings(), &ExtensionInfo::default())
            .unwrap();

        assert_eq!(exchange.trigger_analog_output(1, 0).unwrap(), TriggerOutcome::NotRouted);
        assert!(matches!(
            exchange.trigger_analog_output(6, 0),
            Err(ChanTrigError::InvalidArgument(_))
        ));
        assert_eq!(fw.next_trigger(), None);

        routing.set_trigger_source(OutputTarget::Analog(1), TriggerSource::Extension);
        assert_eq!(exchange.trigger_analog_output(1, 2).unwrap(), TriggerOutcome::Queued);
        let fired = fw.next_trigger().unwrap();
        assert_eq!(fired.target, OutputTarget::Analog(1));
        assert_eq!(fired.trigger_index, 2);
    }

    #[test]
    fn spikes_are_drained() {
        let (mut exchange, _, _) = exchange();
        let mut fw = exchange
            .setup(&small_settings(), &ExtensionInfo::default())
            .unwrap();
        let spike = SpikeRecord {
            time: 77,
            channel: 12,
            ..SpikeRecord::default()
        };
        assert!(fw.capture_spike(&spike));

        let mut spikes = Spikes::with_capacity(8);
        assert_eq!(exchange.get_spikes(&mut spikes).unwrap(), 1);
        assert_eq!(spikes.as_slice()[0].time, 77);
        assert_eq!(exchange.get_spikes(&mut spikes).unwrap(), 0);
    }

    #[test]
    fn pull_bound_applies_to_the_next_consume_only() {
        let (mut exchange, _, _) = exchange();
        let mut fw = exchange
            .setup(&small_settings(), &ExtensionInfo::default())
            .unwrap();
        let mut samples = Samples::with_capacity(SamplesCount::uniform(8));

        for t in 0..3u32 {
            fw.push_analog_input(t, &[0.0; 16]);
        }
        let got = exchange.get_samples(&mut samples).unwrap();
        fw.push_analog_input(3, &[0.0; 16]);
        assert_eq!(exchange.consume_samples(SamplesCount::uniform(8)).unwrap(), got);

        for t in 4..7u32 {
            fw.push_analog_input(t, &[0.0; 16]);
        }
        let queued = exchange.get_samples_count().unwrap();
        assert_eq!(queued.analog_input, 4);
        assert_eq!(exchange.consume_samples(queued).unwrap().analog_input, 4);
        assert_eq!(exchange.get_samples_count().unwrap().analog_input, 0);
    }
}
