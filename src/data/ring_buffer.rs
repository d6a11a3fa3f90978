//! Fixed-capacity lock-free ring of fixed-stride records.
//!
//! Every exchange buffer (input samples, spikes, output samples, triggers) is an
//! [`AtomicRing`]: a single word arena allocated once at setup, addressed by two
//! monotonically increasing cursors.
//!
//! # Memory Layout
//! ```text
//! words: [slot 0: stride x u32][slot 1: stride x u32]...[slot capacity-1]
//!
//! write_head: AtomicU64   (next absolute index to write, owned by the producer)
//! read_tail: AtomicU64    (oldest live absolute index, owned by the consumer)
//! ```
//!
//! Absolute index `i` lives in slot `i % capacity`. The ring holds
//! `write_head - read_tail` records, never more than `capacity`.
//!
//! # Thread Safety
//!
//! - **Writes**: one producer identity per ring. Callers enforce this through
//!   ownership of the producer handle.
//! - **Reads**: lock-free. Payload words are atomics, so a racing read is never
//!   undefined behaviour; it can only be stale.
//! - **Eviction**: under [`OverflowPolicy::DropOldest`] the producer advances
//!   `read_tail` before overwriting the oldest slot. Readers validate with a
//!   seqlock-style re-check of `read_tail` after copying and discard every record
//!   the producer may have overwritten meanwhile.

use std::ops::Range;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

/// What a full ring does with the next push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest record to make room. Used for input rings.
    DropOldest,
    /// Refuse the new record. Used for rings the extension produces into.
    RejectNewest,
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored without loss.
    Stored,
    /// Stored after evicting the oldest record.
    Evicted,
    /// Not stored: the ring was full (or has no capacity).
    Rejected,
}

/// Mutable view of one slot during a push.
pub struct SlotWriter<'a> {
    words: &'a [AtomicU32],
}

impl SlotWriter<'_> {
    /// Store word `index` of the record.
    #[inline]
    pub fn set(&self, index: usize, value: u32) {
        self.words[index].store(value, Ordering::Relaxed);
    }

    /// Number of words in the record.
    pub fn stride(&self) -> usize {
        self.words.len()
    }
}

/// Read-only view of one slot during a read.
pub struct SlotReader<'a> {
    words: &'a [AtomicU32],
}

impl SlotReader<'_> {
    /// Load word `index` of the record.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    /// Number of words in the record.
    pub fn stride(&self) -> usize {
        self.words.len()
    }
}

/// Outcome of a read: which visited positions hold consistent records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWindow {
    /// Absolute index of visited position 0.
    pub first: u64,
    /// Positions handed to the visitor.
    pub visited: usize,
    /// Leading positions that were evicted while being read.
    pub stale: usize,
}

impl ReadWindow {
    /// Positions whose contents are valid.
    pub fn valid(&self) -> Range<usize> {
        self.stale.min(self.visited)..self.visited
    }

    /// Number of valid positions.
    pub fn len(&self) -> usize {
        self.valid().len()
    }

    /// Whether no valid record was read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-producer/single-consumer ring of `stride`-word records.
pub struct AtomicRing {
    words: Box<[AtomicU32]>,
    stride: usize,
    capacity: u64,
    policy: OverflowPolicy,
    write_head: AtomicU64,
    read_tail: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
}

impl AtomicRing {
    /// Allocate a ring of `capacity` records of `stride` words each.
    ///
    /// A zero capacity yields a ring that owns no memory and rejects every push.
    pub fn new(capacity: usize, stride: usize, policy: OverflowPolicy) -> Self {
        let words = (0..capacity * stride)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            words,
            stride,
            capacity: capacity as u64,
            policy,
            write_head: AtomicU64::new(0),
            read_tail: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Capacity in records.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Words per record.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes held by the payload arena.
    pub fn footprint_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u32>()
    }

    /// Current write position (monotonically increasing).
    pub fn write_head(&self) -> u64 {
        self.write_head.load(Ordering::Acquire)
    }

    /// Oldest live position (monotonically increasing).
    pub fn read_tail(&self) -> u64 {
        self.read_tail.load(Ordering::Acquire)
    }

    /// Records currently queued.
    pub fn len(&self) -> usize {
        // Tail first: head is at least as new, so the difference never underflows.
        let tail = self.read_tail.load(Ordering::Acquire);
        let head = self.write_head.load(Ordering::Acquire);
        head.saturating_sub(tail).min(self.capacity) as usize
    }

    /// Whether no record is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill level in percent of capacity (0 for a zero-capacity ring).
    pub fn fill_percent(&self) -> u32 {
        if self.capacity == 0 {
            return 0;
        }
        (self.len() as u64 * 100 / self.capacity) as u32
    }

    /// Records evicted by [`OverflowPolicy::DropOldest`] so far.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Records refused by [`OverflowPolicy::RejectNewest`] so far.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn slot(&self, index: u64) -> &[AtomicU32] {
        let start = (index % self.capacity) as usize * self.stride;
        &self.words[start..start + self.stride]
    }

    /// Append one record, filled in place by `fill`.
    ///
    /// Must only be called from the ring's single producer. Never blocks.
    pub fn push_with<F>(&self, fill: F) -> PushOutcome
    where
        F: FnOnce(&SlotWriter<'_>),
    {
        if self.capacity == 0 {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Rejected;
        }

        // Only this producer stores write_head.
        let head = self.write_head.load(Ordering::Relaxed);
        let tail = self.read_tail.load(Ordering::Acquire);
        let mut outcome = PushOutcome::Stored;

        if head - tail >= self.capacity {
            match self.policy {
                OverflowPolicy::RejectNewest => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    return PushOutcome::Rejected;
                }
                OverflowPolicy::DropOldest => {
                    let new_tail = head + 1 - self.capacity;
                    let prev = self.read_tail.fetch_max(new_tail, Ordering::AcqRel);
                    if prev < new_tail {
                        self.evicted.fetch_add(new_tail - prev, Ordering::Relaxed);
                        outcome = PushOutcome::Evicted;
                    }
                }
            }
        }

        // Publish the eviction before any payload word of the reused slot changes.
        fence(Ordering::Release);
        fill(&SlotWriter {
            words: self.slot(head),
        });
        self.write_head.store(head + 1, Ordering::Release);
        outcome
    }

    /// Visit up to `max` queued records, oldest first, without consuming them.
    ///
    /// `visit` receives the position (0-based) and the slot; it may stop the read
    /// early by returning `false`, in which case that position is not counted.
    /// Positions in [`ReadWindow::valid`] hold consistent records; callers must
    /// discard anything they copied at the stale leading positions.
    pub fn read<F>(&self, max: usize, mut visit: F) -> ReadWindow
    where
        F: FnMut(usize, &SlotReader<'_>) -> bool,
    {
        let tail = self.read_tail.load(Ordering::Acquire);
        let head = self.write_head.load(Ordering::Acquire);
        let available = head.saturating_sub(tail).min(self.capacity);
        let wanted = available.min(max as u64) as usize;

        let mut visited = 0;
        while visited < wanted {
            let reader = SlotReader {
                words: self.slot(tail + visited as u64),
            };
            if !visit(visited, &reader) {
                break;
            }
            visited += 1;
        }

        // Payload loads must complete before the eviction re-check.
        fence(Ordering::Acquire);
        let tail_after = self.read_tail.load(Ordering::Relaxed);
        let stale = tail_after.saturating_sub(tail).min(visited as u64) as usize;

        ReadWindow {
            first: tail,
            visited,
            stale,
        }
    }

    /// Advance the read cursor by up to `max` records.
    ///
    /// Returns how many records this call released. Records the producer already
    /// evicted are not counted twice.
    pub fn consume(&self, max: usize) -> usize {
        let tail = self.read_tail.load(Ordering::Acquire);
        let head = self.write_head.load(Ordering::Acquire);
        let target = tail + head.saturating_sub(tail).min(max as u64);
        let prev = self.read_tail.fetch_max(target, Ordering::AcqRel);
        target.saturating_sub(prev) as usize
    }

    /// Advance the read cursor to absolute position `index` (clamped to the head).
    pub fn consume_to(&self, index: u64) -> usize {
        let head = self.write_head.load(Ordering::Acquire);
        let target = index.min(head);
        let prev = self.read_tail.fetch_max(target, Ordering::AcqRel);
        target.saturating_sub(prev) as usize
    }
}
