//! Trigger requests queued by the extension for the firmware.

use super::ring_buffer::{AtomicRing, OverflowPolicy, PushOutcome};
use crate::registry::OutputTarget;
use serde::Serialize;

const DIGITAL_FLAG: u32 = 1 << 31;

/// A trigger addressed to one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerRequest {
    /// Output channel to fire.
    pub target: OutputTarget,
    /// Trigger slot on that channel.
    pub trigger_index: u8,
}

impl TriggerRequest {
    fn to_word(self) -> u32 {
        let (flag, channel) = match self.target {
            OutputTarget::Analog(ch) => (0, ch),
            OutputTarget::Digital(bit) => (DIGITAL_FLAG, bit),
        };
        flag | (u32::from(self.trigger_index) << 16) | u32::from(channel)
    }

    fn from_word(word: u32) -> Self {
        let channel = word as u16;
        let target = if word & DIGITAL_FLAG != 0 {
            OutputTarget::Digital(channel)
        } else {
            OutputTarget::Analog(channel)
        };
        Self {
            target,
            trigger_index: (word >> 16) as u8,
        }
    }
}

/// Ring of trigger requests, extension to firmware.
pub struct TriggerQueue {
    ring: AtomicRing,
}

impl TriggerQueue {
    /// Allocate a queue of `capacity` requests.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: AtomicRing::new(capacity, 1, OverflowPolicy::RejectNewest),
        }
    }

    /// Capacity in requests.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Requests waiting for the firmware.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Requests refused because the queue was full.
    pub fn rejected(&self) -> u64 {
        self.ring.rejected()
    }

    /// Bytes held by the ring.
    pub fn footprint_bytes(&self) -> usize {
        self.ring.footprint_bytes()
    }

    /// Enqueue a request (extension side).
    pub fn push(&self, request: TriggerRequest) -> PushOutcome {
        self.ring.push_with(|slot| slot.set(0, request.to_word()))
    }

    /// Dequeue the oldest request (firmware side).
    pub fn pop(&self) -> Option<TriggerRequest> {
        let mut word = None;
        let window = self.ring.read(1, |_, slot| {
            word = Some(slot.get(0));
            true
        });
        if window.is_empty() {
            return None;
        }
        self.ring.consume(1);
        word.map(TriggerRequest::from_word)
    }
}
