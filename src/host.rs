//! Collaborators owned by the host application.
//!
//! The exchange layer reports advisories through the host's comment channel and asks
//! the host's output routing whether an output channel is currently driven by the
//! extension. Both are traits so the host (or a test) can plug in its own view.

use crate::config::RoutingConfig;
use crate::registry::{InputGroup, OutputTarget, ANALOG_OUTPUT_COUNT};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Buffer an advisory refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    /// Input sample buffer of one group.
    Samples(InputGroup),
    /// Input spike buffer.
    Spikes,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Samples(group) => write!(f, "{group} samples"),
            BufferKind::Spikes => f.write_str("spikes"),
        }
    }
}

/// Non-fatal condition surfaced to the host, never to the data path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "advisory", rename_all = "snake_case")]
pub enum Advisory {
    /// A buffer's fill level rose to its warning threshold.
    ThresholdCrossed {
        /// Buffer concerned.
        buffer: BufferKind,
        /// Fill level when the crossing was observed.
        fill_percent: u32,
        /// Configured threshold.
        threshold: u32,
    },
    /// The consumer found a gap between consecutive sample blocks.
    SamplesDropped {
        /// Group concerned.
        group: InputGroup,
        /// Frames missing from the stream.
        frames: u32,
        /// Proctime the consumer expected next.
        expected: u32,
        /// Proctime found instead.
        found: u32,
    },
    /// Output frames were refused because the output ring was full.
    OutputRejected {
        /// Frames in the send request.
        requested: usize,
        /// Frames accepted.
        accepted: usize,
    },
    /// A routed trigger was dropped because the trigger queue was full.
    TriggerDropped {
        /// Output channel addressed.
        target: OutputTarget,
        /// Trigger slot requested.
        trigger_index: u8,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ThresholdCrossed {
                buffer,
                fill_percent,
                threshold,
            } => write!(
                f,
                "{buffer} buffer at {fill_percent}% (threshold {threshold}%), drain faster"
            ),
            Advisory::SamplesDropped {
                group,
                frames,
                expected,
                found,
            } => write!(
                f,
                "{group} dropped {frames} samples (expected proctime {expected}, found {found})"
            ),
            Advisory::OutputRejected {
                requested,
                accepted,
            } => write!(
                f,
                "output buffer full, accepted {accepted} of {requested} samples"
            ),
            Advisory::TriggerDropped {
                target,
                trigger_index,
            } => write!(f, "trigger queue full, dropped {target} trigger {trigger_index}"),
        }
    }
}

/// Host logging/comment channel.
pub trait HostChannel: Send + Sync {
    /// Deliver an advisory. Must not block.
    fn comment(&self, advisory: &Advisory);
}

/// Comment channel that writes advisories to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHost;

impl HostChannel for TracingHost {
    fn comment(&self, advisory: &Advisory) {
        warn!(target: "chantrig::host", advisory = ?advisory, "{advisory}");
    }
}

/// Comment channel that keeps every advisory in memory.
#[derive(Debug, Default)]
pub struct RecordingHost {
    advisories: Mutex<Vec<Advisory>>,
}

impl RecordingHost {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn advisories(&self) -> Vec<Advisory> {
        self.advisories.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<Advisory> {
        std::mem::take(&mut *self.advisories.lock())
    }
}

impl HostChannel for RecordingHost {
    fn comment(&self, advisory: &Advisory) {
        self.advisories.lock().push(advisory.clone());
    }
}

/// Who drives an output channel's triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Triggers come from the extension.
    Extension,
    /// Triggers come from the host's own configuration.
    Host,
}

/// Host output routing, as seen by the exchange layer.
pub trait OutputRouting: Send + Sync {
    /// Current trigger source of `target`.
    fn trigger_source(&self, target: OutputTarget) -> TriggerSource;

    /// Whether analog output `channel` plays samples sent by the extension.
    fn streams_extension_samples(&self, channel: usize) -> bool;
}

#[derive(Debug, Default)]
struct RoutingState {
    triggers: HashSet<OutputTarget>,
    streaming: [bool; ANALOG_OUTPUT_COUNT],
}

/// Runtime-mutable routing table.
///
/// The host may reroute outputs while the extension runs; lookups take a short
/// read lock and never touch the sample path.
#[derive(Debug, Default)]
pub struct RoutingTable {
    state: RwLock<RoutingState>,
}

impl RoutingTable {
    /// Table with nothing routed to the extension.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded from configuration. Out-of-range entries are ignored.
    pub fn from_config(config: &RoutingConfig) -> Self {
        let table = Self::new();
        for &ch in &config.analog_triggers {
            table.set_trigger_source(OutputTarget::Analog(ch), TriggerSource::Extension);
        }
        for &bit in &config.digital_triggers {
            table.set_trigger_source(OutputTarget::Digital(bit), TriggerSource::Extension);
        }
        for &ch in &config.analog_streams {
            table.set_streaming(usize::from(ch), true);
        }
        table
    }

    /// Route `target`'s triggers to `source`.
    pub fn set_trigger_source(&self, target: OutputTarget, source: TriggerSource) {
        if !target.is_valid() {
            return;
        }
        let mut state = self.state.write();
        match source {
            TriggerSource::Extension => {
                state.triggers.insert(target);
            }
            TriggerSource::Host => {
                state.triggers.remove(&target);
            }
        }
    }

    /// Let analog output `channel` play extension samples (or not).
    pub fn set_streaming(&self, channel: usize, enabled: bool) {
        if let Some(slot) = self.state.write().streaming.get_mut(channel) {
            *slot = enabled;
        }
    }
}

impl OutputRouting for RoutingTable {
    fn trigger_source(&self, target: OutputTarget) -> TriggerSource {
        if self.state.read().triggers.contains(&target) {
            TriggerSource::Extension
        } else {
            TriggerSource::Host
        }
    }

    fn streams_extension_samples(&self, channel: usize) -> bool {
        self.state
            .read()
            .streaming
            .get(channel)
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn routing_table_from_config() {
        let config = RoutingConfig {
            analog_triggers: vec![0, 9],
            digital_triggers: vec![3],
            analog_streams: vec![1],
        };
        let table = RoutingTable::from_config(&config);
        assert_eq!(
            table.trigger_source(OutputTarget::Analog(0)),
            TriggerSource::Extension
        );
        assert_eq!(
            table.trigger_source(OutputTarget::Analog(1)),
            TriggerSource::Host
        );
        assert_eq!(
            table.trigger_source(OutputTarget::Digital(3)),
            TriggerSource::Extension
        );
        assert!(table.streams_extension_samples(1));
        assert!(!table.streams_extension_samples(0));
        assert!(!table.streams_extension_samples(99));
    }

    #[test]
    fn reroute_at_runtime() {
        let table = RoutingTable::new();
        let target = OutputTarget::Digital(0);
        table.set_trigger_source(target, TriggerSource::Extension);
        assert_eq!(table.trigger_source(target), TriggerSource::Extension);
        table.set_trigger_source(target, TriggerSource::Host);
        assert_eq!(table.trigger_source(target), TriggerSource::Host);
    }

    #[test]
    #[traced_test]
    fn tracing_host_logs_advisories() {
        TracingHost.comment(&Advisory::TriggerDropped {
            target: OutputTarget::Analog(2),
            trigger_index: 5,
        });
        assert!(logs_contain("trigger queue full, dropped analog_output[2] trigger 5"));
    }

    #[test]
    fn recording_host_collects() {
        let host = RecordingHost::new();
        let advisory = Advisory::OutputRejected {
            requested: 10,
            accepted: 4,
        };
        host.comment(&advisory);
        assert_eq!(host.advisories(), vec![advisory.clone()]);
        assert_eq!(host.take().len(), 1);
        assert!(host.advisories().is_empty());
        assert_eq!(
            advisory.to_string(),
            "output buffer full, accepted 4 of 10 samples"
        );
    }
}
