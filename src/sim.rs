//! Synthetic firmware and reference extension.
//!
//! The firmware side runs on a dedicated OS thread and acquires
//! `ticks_per_quantum` master ticks per scheduling quantum, paced to wall-clock
//! time: sine waves plus uniform noise on the analog inputs, a slow counter on the
//! digital port and random spikes. The extension side polls on a `tokio` interval,
//! echoes the watched analog-input channel to analog output 0 in aligned mode and
//! fires analog output 0 trigger 0 on every upward crossing of the trigger level.

use crate::config::{ChanTrigConfig, FirmwareSettings, SimulationConfig};
use crate::data::{GroupSamples, OutputBlock, SpikeRecord, Spikes, SyncMode};
use crate::dispatch::TriggerOutcome;
use crate::exchange::{ChanTrig, Diagnostics, Samples, SamplesCount};
use crate::firmware::{FirmwareBudget, FirmwarePort, InputFrame};
use crate::host::{Advisory, HostChannel, RecordingHost, RoutingTable, TracingHost};
use crate::registry::{
    InputGroup, ANALOG_INPUT_COUNT, ANALOG_OUTPUT_COUNT, FRONTEND_COUNT, INPUT_COUNT,
    MAX_SAMPLE_RATE, SPIKE_WAVEFORM_POINTS,
};
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::Serialize;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

/// Counters kept by the synthetic firmware thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FirmwareStats {
    /// Master ticks acquired.
    pub ticks: u64,
    /// Spikes written to the spike ring.
    pub spikes_captured: u64,
    /// Output frames emitted.
    pub outputs_emitted: u64,
    /// Trigger requests executed.
    pub triggers_executed: u64,
}

/// Frames received by the extension per group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupTotals {
    /// Front-end frames.
    pub frontend: u64,
    /// Analog-input frames.
    pub analog_input: u64,
    /// Digital-input frames.
    pub digital_input: u64,
}

impl GroupTotals {
    fn add(&mut self, counts: SamplesCount) {
        self.frontend += u64::from(counts.frontend);
        self.analog_input += u64::from(counts.analog_input);
        self.digital_input += u64::from(counts.digital_input);
    }
}

/// Outcome of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Buffer lengths the firmware granted.
    pub granted: FirmwareSettings,
    /// Extension polls performed.
    pub polls: u64,
    /// Frames consumed by the extension.
    pub frames_consumed: GroupTotals,
    /// Spikes drained by the extension.
    pub spikes_received: u64,
    /// Level crossings detected on the watched channel.
    pub crossings: u64,
    /// Triggers queued for the firmware.
    pub triggers_queued: u64,
    /// Output frames accepted by the exchange.
    pub outputs_sent: u64,
    /// Firmware-side counters.
    pub firmware: FirmwareStats,
    /// Advisories the host received.
    pub advisories: Vec<Advisory>,
    /// Exchange counters at shutdown.
    pub diagnostics: Diagnostics,
}

/// Host that logs every advisory and keeps a copy for the report.
#[derive(Default)]
struct SimulationHost {
    log: TracingHost,
    recorded: RecordingHost,
}

impl HostChannel for SimulationHost {
    fn comment(&self, advisory: &Advisory) {
        self.log.comment(advisory);
        self.recorded.comment(advisory);
    }
}

/// Upward level-crossing detector.
#[derive(Debug, Clone, Copy)]
struct LevelCrossing {
    level: f32,
    above: bool,
}

impl LevelCrossing {
    fn new(level: f32) -> Self {
        Self {
            level,
            above: false,
        }
    }

    fn update(&mut self, value: f32) -> bool {
        let above = value >= self.level;
        let rising = above && !self.above;
        self.above = above;
        rising
    }
}

/// Signal generator owned by the firmware thread.
struct SignalSource<R> {
    rng: R,
    config: SimulationConfig,
    frontend: Vec<f32>,
    analog_input: Vec<f32>,
}

impl<R: Rng> SignalSource<R> {
    fn new(rng: R, config: SimulationConfig) -> Self {
        Self {
            rng,
            config,
            frontend: vec![0.0; FRONTEND_COUNT],
            analog_input: vec![0.0; ANALOG_INPUT_COUNT],
        }
    }

    fn noise(&mut self) -> f32 {
        if self.config.noise > 0.0 {
            self.rng.gen_range(-self.config.noise..=self.config.noise)
        } else {
            0.0
        }
    }

    fn fill(&mut self, proctime: u32, frontend: bool) {
        let t = proctime as f32 / MAX_SAMPLE_RATE as f32;
        let amplitude = self.config.amplitude;
        let omega = TAU * self.config.signal_hz;
        for ch in 0..ANALOG_INPUT_COUNT {
            let phase = ch as f32 * TAU / ANALOG_INPUT_COUNT as f32;
            self.analog_input[ch] = amplitude * (omega * t + phase).sin() + self.noise();
        }
        if frontend {
            let carrier = 0.1 * amplitude * (omega * 10.0 * t).sin();
            for ch in 0..FRONTEND_COUNT {
                self.frontend[ch] = carrier + self.noise();
            }
        }
    }

    fn spike(&mut self, proctime: u32) -> Option<SpikeRecord> {
        let chance = self.config.spike_rate_hz / MAX_SAMPLE_RATE as f32;
        if chance <= 0.0 || self.rng.gen::<f32>() >= chance {
            return None;
        }
        let mut spike = SpikeRecord {
            time: proctime,
            channel: self.rng.gen_range(0..INPUT_COUNT as u16),
            unit: self.rng.gen_range(0..4),
            ..SpikeRecord::default()
        };
        for (i, point) in spike.waveform.iter_mut().enumerate() {
            let x = i as f32 / SPIKE_WAVEFORM_POINTS as f32;
            let shape = -(TAU * x).sin() * (-4.0 * x).exp();
            *point = (32_768.0 + 8_000.0 * shape) as u16;
        }
        Some(spike)
    }
}

/// Proctime 0 marks synthesized output frames, so the simulated clock starts at 1.
const FIRST_PROCTIME: u32 = 1;

/// Echo `watch` onto analog output 0, keeping each sample's acquisition time.
fn push_echo(block: &mut OutputBlock, analog: &GroupSamples<f32>, watch: usize) {
    for (i, &value) in analog.channel(watch).iter().enumerate() {
        if let Some(proctime) = analog.sample_time(i) {
            let mut values = [0i16; ANALOG_OUTPUT_COUNT];
            values[0] = value.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
            block.push(proctime, values);
        }
    }
}

fn spawn_firmware(
    mut port: FirmwarePort,
    config: SimulationConfig,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<FirmwareStats>> {
    let quantum = Duration::from_secs_f64(
        f64::from(config.ticks_per_quantum) / f64::from(MAX_SAMPLE_RATE),
    );
    let frontend_enabled = port.layout().group(InputGroup::Frontend).divider.is_enabled();

    std::thread::Builder::new()
        .name("firmware".into())
        .spawn(move || {
            let mut source = SignalSource::new(rand::thread_rng(), config.clone());
            let mut stats = FirmwareStats::default();
            let mut proctime = FIRST_PROCTIME;
            let started = Instant::now();
            let mut quanta: u32 = 0;

            while !stop.load(Ordering::Acquire) {
                for _ in 0..config.ticks_per_quantum {
                    source.fill(proctime, frontend_enabled);
                    let frame = InputFrame {
                        frontend: &source.frontend,
                        analog_input: &source.analog_input,
                        digital_input: (proctime / 3_000) as u16,
                    };
                    port.acquire(proctime, &frame);
                    if let Some(spike) = source.spike(proctime) {
                        if port.capture_spike(&spike) {
                            stats.spikes_captured += 1;
                        }
                    }
                    if port.next_output(proctime).is_some() {
                        stats.outputs_emitted += 1;
                    }
                    while let Some(trigger) = port.next_trigger() {
                        debug!(output = %trigger.target, index = trigger.trigger_index, proctime, "Trigger executed");
                        stats.triggers_executed += 1;
                    }
                    proctime = proctime.wrapping_add(1);
                    stats.ticks += 1;
                }

                quanta += 1;
                let due = quantum * quanta;
                if let Some(ahead) = due.checked_sub(started.elapsed()) {
                    std::thread::sleep(ahead);
                }
            }
            stats
        })
        .context("failed to spawn firmware thread")
}

/// Run the synthetic firmware and the reference extension for `config.simulation.duration`.
#[instrument(skip_all, fields(duration = ?config.simulation.duration))]
pub async fn run(config: &ChanTrigConfig) -> Result<SimulationReport> {
    let sim = config.simulation.clone();
    let host = Arc::new(SimulationHost::default());
    let routing = Arc::new(RoutingTable::from_config(&config.routing));
    let mut exchange = ChanTrig::new(host.clone(), routing);

    let granted = FirmwareBudget::new(config.firmware).grant(config.request.as_ref(), &config.extension);
    let port = exchange
        .setup(&granted, &config.extension)
        .context("exchange setup failed")?
        .with_output_latency(sim.output_latency_ticks);

    let layout = exchange.layout()?.clone();
    let mut capacity = SamplesCount::default();
    for group in InputGroup::ALL {
        capacity.set(group, layout.group(group).frames as u32);
    }
    let mut samples = Samples::with_capacity(capacity);
    let mut spikes = Spikes::with_capacity(layout.spike_capacity);
    let mut block = OutputBlock::with_capacity(layout.group(InputGroup::AnalogInput).frames);
    let mut crossing = LevelCrossing::new(sim.trigger_level);
    let watch = usize::from(sim.watch_channel);

    let stop = Arc::new(AtomicBool::new(false));
    let firmware = spawn_firmware(port, sim.clone(), stop.clone())?;
    info!(total_bytes = layout.total_bytes, "Simulation started");

    let mut report = SimulationReport {
        granted,
        polls: 0,
        frames_consumed: GroupTotals::default(),
        spikes_received: 0,
        crossings: 0,
        triggers_queued: 0,
        outputs_sent: 0,
        firmware: FirmwareStats::default(),
        advisories: Vec::new(),
        diagnostics: exchange.diagnostics()?,
    };

    let deadline = tokio::time::Instant::now() + sim.duration;
    let mut ticker = tokio::time::interval(sim.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        report.polls += 1;

        let got = exchange.get_samples(&mut samples)?;
        block.clear();
        let analog = &samples.analog_input;
        if !analog.is_empty() {
            for &value in analog.channel(watch) {
                if crossing.update(value) {
                    report.crossings += 1;
                    if exchange.trigger_analog_output(0, 0)? == TriggerOutcome::Queued {
                        report.triggers_queued += 1;
                    }
                }
            }
            push_echo(&mut block, analog, watch);
        }
        report.outputs_sent += exchange.send_samples(&block, SyncMode::Aligned)? as u64;

        let consumed = exchange.consume_samples(got)?;
        report.frames_consumed.add(consumed);
        report.spikes_received += exchange.get_spikes(&mut spikes)? as u64;
    }

    stop.store(true, Ordering::Release);
    report.firmware = tokio::task::spawn_blocking(move || firmware.join())
        .await?
        .map_err(|_| anyhow!("firmware thread panicked"))?;
    report.diagnostics = exchange.diagnostics()?;
    report.advisories = host.recorded.take();

    info!(
        polls = report.polls,
        ticks = report.firmware.ticks,
        crossings = report.crossings,
        spikes = report.spikes_received,
        "Simulation finished"
    );
    Ok(report)
}
