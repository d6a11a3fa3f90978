//! Circular buffers exchanged between the firmware and the extension.
pub mod output_buffer;
pub mod ring_buffer;
pub mod sample_buffer;
pub mod spike_buffer;
pub mod trigger_queue;

pub use output_buffer::{OutputBlock, OutputFrame, OutputSampleBuffer, SyncMode};
pub use ring_buffer::{AtomicRing, OverflowPolicy, PushOutcome, ReadWindow};
pub use sample_buffer::{ConsumedRun, GroupSamples, SampleBuffer, SampleValue};
pub use spike_buffer::{SpikeBuffer, SpikeRecord, Spikes};
pub use trigger_queue::{TriggerQueue, TriggerRequest};
