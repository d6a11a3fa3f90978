//! Analog output samples produced by the extension.
//!
//! The extension enqueues [`OutputFrame`]s; the firmware drains them at the master
//! rate. A full ring refuses new frames: the extension is expected to pace its
//! sends, and frames already queued are never discarded in favour of newer ones.

use super::ring_buffer::{AtomicRing, OverflowPolicy, PushOutcome};
use crate::registry::ANALOG_OUTPUT_COUNT;
use serde::{Deserialize, Serialize};

const OUTPUT_STRIDE: usize = 2 + ANALOG_OUTPUT_COUNT / 2;

/// Emission timing policy for output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Emit as soon as the firmware drains the frame. Output may fragment under load.
    #[default]
    Immediate,
    /// Emit at the originating input proctime plus the output latency.
    Aligned,
}

impl SyncMode {
    fn to_word(self) -> u32 {
        match self {
            SyncMode::Immediate => 0,
            SyncMode::Aligned => 1,
        }
    }

    fn from_word(word: u32) -> Self {
        if word == 1 {
            SyncMode::Aligned
        } else {
            SyncMode::Immediate
        }
    }
}

/// One analog output sample across every output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputFrame {
    /// Proctime of the input sample this frame derives from; 0 means "as soon as possible".
    pub proctime: u32,
    /// One value per analog output channel.
    pub values: [i16; ANALOG_OUTPUT_COUNT],
}

impl OutputFrame {
    /// Whether the frame was synthesized by the extension rather than derived from input.
    pub fn is_synthesized(&self) -> bool {
        self.proctime == 0
    }
}

/// Extension-side batch of output frames handed to `send_samples`.
#[derive(Debug, Clone, Default)]
pub struct OutputBlock {
    frames: Vec<OutputFrame>,
}

impl OutputBlock {
    /// Empty block with room for `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
        }
    }

    /// Append a frame derived from the input sample at `proctime`.
    pub fn push(&mut self, proctime: u32, values: [i16; ANALOG_OUTPUT_COUNT]) {
        self.frames.push(OutputFrame { proctime, values });
    }

    /// Append a synthesized frame, emitted as soon as possible.
    pub fn push_synthesized(&mut self, values: [i16; ANALOG_OUTPUT_COUNT]) {
        self.push(0, values);
    }

    /// Frames in send order.
    pub fn frames(&self) -> &[OutputFrame] {
        &self.frames
    }

    /// Values of one output channel, in send order.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = i16> + '_ {
        self.frames.iter().map(move |f| f.values[channel])
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the block has no frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop every frame, keeping the allocation.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Ring of output frames, extension to firmware.
pub struct OutputSampleBuffer {
    ring: AtomicRing,
}

impl OutputSampleBuffer {
    /// Allocate a ring of `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: AtomicRing::new(capacity, OUTPUT_STRIDE, OverflowPolicy::RejectNewest),
        }
    }

    /// Capacity in frames.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Frames queued for the firmware.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Frames refused because the ring was full.
    pub fn rejected(&self) -> u64 {
        self.ring.rejected()
    }

    /// Bytes held by the ring.
    pub fn footprint_bytes(&self) -> usize {
        self.ring.footprint_bytes()
    }

    /// Enqueue a frame (extension side).
    pub fn push(&self, frame: &OutputFrame, sync: SyncMode) -> PushOutcome {
        self.ring.push_with(|slot| {
            slot.set(0, frame.proctime);
            slot.set(1, sync.to_word());
            for (i, pair) in frame.values.chunks_exact(2).enumerate() {
                let word = u32::from(pair[0] as u16) | (u32::from(pair[1] as u16) << 16);
                slot.set(2 + i, word);
            }
        })
    }

    /// Oldest queued frame and its sync mode (firmware side), without removing it.
    pub fn front(&self) -> Option<(OutputFrame, SyncMode)> {
        let mut front = None;
        let window = self.ring.read(1, |_, slot| {
            let mut frame = OutputFrame {
                proctime: slot.get(0),
                ..OutputFrame::default()
            };
            for i in 0..ANALOG_OUTPUT_COUNT / 2 {
                let word = slot.get(2 + i);
                frame.values[2 * i] = word as u16 as i16;
                frame.values[2 * i + 1] = (word >> 16) as u16 as i16;
            }
            front = Some((frame, SyncMode::from_word(slot.get(1))));
            true
        });
        if window.is_empty() {
            None
        } else {
            front
        }
    }

    /// Remove the oldest queued frame (firmware side).
    pub fn pop_front(&self) -> Option<(OutputFrame, SyncMode)> {
        let front = self.front()?;
        self.ring.consume(1);
        Some(front)
    }
}
