//! Spike event ring.
//!
//! Spikes are sparse, asynchronous events without sequence numbers. When the ring
//! overflows the oldest spikes are evicted and the consumer has no way to tell;
//! this is the documented contract, not an omission.

use super::ring_buffer::{AtomicRing, OverflowPolicy, PushOutcome};
use crate::registry::SPIKE_WAVEFORM_POINTS;
use serde::Serialize;

const HEADER_WORDS: usize = 2;
const WAVEFORM_WORDS: usize = SPIKE_WAVEFORM_POINTS / 2;
const SPIKE_STRIDE: usize = HEADER_WORDS + WAVEFORM_WORDS;

/// One detected spike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpikeRecord {
    /// Proctime of the spike.
    pub time: u32,
    /// Input channel id (front-end and analog-input space).
    pub channel: u16,
    /// Sorted unit id (0 = unsorted).
    pub unit: u16,
    /// Waveform snippet around the detection point.
    #[serde(serialize_with = "serialize_waveform")]
    pub waveform: [u16; SPIKE_WAVEFORM_POINTS],
}

fn serialize_waveform<S: serde::Serializer>(
    waveform: &[u16; SPIKE_WAVEFORM_POINTS],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(waveform.iter())
}

impl Default for SpikeRecord {
    fn default() -> Self {
        Self {
            time: 0,
            channel: 0,
            unit: 0,
            waveform: [0; SPIKE_WAVEFORM_POINTS],
        }
    }
}

/// Caller-owned destination for drained spikes.
#[derive(Debug, Clone)]
pub struct Spikes {
    records: Box<[SpikeRecord]>,
    count: usize,
}

impl Spikes {
    /// Allocate room for `capacity` spikes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: vec![SpikeRecord::default(); capacity].into_boxed_slice(),
            count: 0,
        }
    }

    /// Maximum spikes one drain can deliver.
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Spikes delivered by the last drain.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the last drain delivered nothing.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Delivered spikes, oldest first.
    pub fn as_slice(&self) -> &[SpikeRecord] {
        &self.records[..self.count]
    }

    /// Iterate over delivered spikes.
    pub fn iter(&self) -> std::slice::Iter<'_, SpikeRecord> {
        self.as_slice().iter()
    }
}

/// Ring of spike records.
pub struct SpikeBuffer {
    ring: AtomicRing,
}

impl SpikeBuffer {
    /// Allocate a ring of `capacity` spikes (0 = capture disabled).
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: AtomicRing::new(capacity, SPIKE_STRIDE, OverflowPolicy::DropOldest),
        }
    }

    /// Capacity in spikes.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Spikes currently queued.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether no spike is queued.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Fill level in percent.
    pub fn fill_percent(&self) -> u32 {
        self.ring.fill_percent()
    }

    /// Bytes held by the ring.
    pub fn footprint_bytes(&self) -> usize {
        self.ring.footprint_bytes()
    }

    /// Append a spike (producer side).
    pub fn push(&self, spike: &SpikeRecord) -> PushOutcome {
        self.ring.push_with(|slot| {
            slot.set(0, spike.time);
            slot.set(1, u32::from(spike.channel) | (u32::from(spike.unit) << 16));
            for (i, pair) in spike.waveform.chunks_exact(2).enumerate() {
                slot.set(HEADER_WORDS + i, u32::from(pair[0]) | (u32::from(pair[1]) << 16));
            }
        })
    }

    /// Move up to `dest.capacity()` spikes into `dest`, consuming them.
    pub fn drain_into(&self, dest: &mut Spikes) -> usize {
        let capacity = dest.capacity();
        let window = {
            let records = &mut dest.records;
            self.ring.read(capacity, |pos, slot| {
                let record = &mut records[pos];
                record.time = slot.get(0);
                let ids = slot.get(1);
                record.channel = ids as u16;
                record.unit = (ids >> 16) as u16;
                for i in 0..WAVEFORM_WORDS {
                    let pair = slot.get(HEADER_WORDS + i);
                    record.waveform[2 * i] = pair as u16;
                    record.waveform[2 * i + 1] = (pair >> 16) as u16;
                }
                true
            })
        };

        let valid = window.valid();
        if valid.start > 0 {
            dest.records.copy_within(valid.clone(), 0);
        }
        dest.count = valid.len();
        self.ring.consume_to(window.first + window.visited as u64);
        dest.count
    }
}
