//! Per-group input sample buffers.
//!
//! A [`SampleBuffer`] stores one frame per effective sample period: the frame's
//! proctime followed by one value per channel of the group. The extension reads
//! frames into a caller-allocated [`GroupSamples`], which exposes the data as
//! contiguous per-channel slices.
//!
//! A pull never returns a block with a time discontinuity inside it. When the
//! producer skipped frames, the pull stops before the gap and the consumer sees
//! the gap as a jump between the end of one block and the start of the next.

use super::ring_buffer::{AtomicRing, OverflowPolicy, PushOutcome};
use crate::divider::RateDivider;
use crate::registry::InputGroup;
use std::marker::PhantomData;

/// Sample value stored in one ring word.
pub trait SampleValue: Copy + Default + Send + Sync + 'static {
    /// Encode into a ring word.
    fn to_word(self) -> u32;
    /// Decode from a ring word.
    fn from_word(word: u32) -> Self;
}

impl SampleValue for f32 {
    fn to_word(self) -> u32 {
        self.to_bits()
    }

    fn from_word(word: u32) -> Self {
        f32::from_bits(word)
    }
}

impl SampleValue for u16 {
    fn to_word(self) -> u32 {
        u32::from(self)
    }

    fn from_word(word: u32) -> Self {
        word as u16
    }
}

impl SampleValue for i16 {
    fn to_word(self) -> u32 {
        u32::from(self as u16)
    }

    fn from_word(word: u32) -> Self {
        word as u16 as i16
    }
}

/// Caller-owned destination for one group's samples.
///
/// Storage is allocated once for `capacity` frames per channel and reused across
/// pulls. Views returned by [`GroupSamples::channel`] borrow from it and stay
/// valid until the next pull into the same container.
#[derive(Debug, Clone)]
pub struct GroupSamples<T> {
    channels: usize,
    capacity: usize,
    count: usize,
    proctime: u32,
    period_ticks: u32,
    data: Box<[T]>,
    times: Box<[u32]>,
}

impl<T: SampleValue> GroupSamples<T> {
    /// Allocate room for `capacity` frames of `channels` channels.
    pub fn with_capacity(channels: usize, capacity: usize) -> Self {
        Self {
            channels,
            capacity,
            count: 0,
            proctime: 0,
            period_ticks: 0,
            data: vec![T::default(); channels * capacity].into_boxed_slice(),
            times: vec![0; capacity].into_boxed_slice(),
        }
    }

    /// Allocate room for `capacity` frames of every channel in `group`.
    pub fn for_group(group: InputGroup, capacity: usize) -> Self {
        Self::with_capacity(group.channel_count(), capacity)
    }

    /// Maximum frames a pull can deliver.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames delivered by the last pull.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the last pull delivered nothing.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Proctime of the first delivered frame.
    pub fn proctime(&self) -> u32 {
        self.proctime
    }

    /// Spacing between delivered frames in master ticks.
    pub fn period_ticks(&self) -> u32 {
        self.period_ticks
    }

    /// Proctime the frame after this block should carry if nothing is dropped.
    pub fn next_proctime(&self) -> u32 {
        self.proctime
            .wrapping_add(self.period_ticks.wrapping_mul(self.count as u32))
    }

    /// Proctime of delivered frame `index`.
    pub fn sample_time(&self, index: usize) -> Option<u32> {
        (index < self.count).then(|| {
            self.proctime
                .wrapping_add(self.period_ticks.wrapping_mul(index as u32))
        })
    }

    /// Delivered samples of one channel, oldest first.
    ///
    /// # Panics
    /// Panics if `channel` is out of range.
    pub fn channel(&self, channel: usize) -> &[T] {
        assert!(channel < self.channels, "channel {channel} out of range");
        let start = channel * self.capacity;
        &self.data[start..start + self.count]
    }

    fn clear(&mut self, period_ticks: u32) {
        self.count = 0;
        self.proctime = 0;
        self.period_ticks = period_ticks;
    }

    /// Shift positions `from..to` to the front of every channel.
    fn compact(&mut self, from: usize, to: usize) {
        for ch in 0..self.channels {
            let base = ch * self.capacity;
            self.data.copy_within(base + from..base + to, base);
        }
        self.times.copy_within(from..to, 0);
    }
}

/// Input ring for one channel group.
pub struct SampleBuffer<T> {
    group: InputGroup,
    divider: RateDivider,
    ring: AtomicRing,
    _values: PhantomData<fn() -> T>,
}

impl<T: SampleValue> SampleBuffer<T> {
    /// Allocate a buffer of `capacity` frames. Disabled groups get no storage.
    pub fn new(group: InputGroup, divider: RateDivider, capacity: usize) -> Self {
        let capacity = if divider.is_enabled() { capacity } else { 0 };
        Self {
            group,
            divider,
            ring: AtomicRing::new(capacity, 1 + group.channel_count(), OverflowPolicy::DropOldest),
            _values: PhantomData,
        }
    }

    /// Channel group served by this buffer.
    pub fn group(&self) -> InputGroup {
        self.group
    }

    /// Divider applied to this group.
    pub fn divider(&self) -> RateDivider {
        self.divider
    }

    /// Capacity in frames.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Fill level in percent.
    pub fn fill_percent(&self) -> u32 {
        self.ring.fill_percent()
    }

    /// Frames evicted on overflow so far.
    pub fn evicted(&self) -> u64 {
        self.ring.evicted()
    }

    /// Bytes held by the ring.
    pub fn footprint_bytes(&self) -> usize {
        self.ring.footprint_bytes()
    }

    /// Append a frame (producer side).
    ///
    /// Channels missing from `values` are stored as zero; extra values are ignored.
    pub fn push_frame(&self, proctime: u32, values: &[T]) -> PushOutcome {
        let channels = self.group.channel_count();
        self.ring.push_with(|slot| {
            slot.set(0, proctime);
            for ch in 0..channels {
                let word = values.get(ch).copied().unwrap_or_default().to_word();
                slot.set(1 + ch, word);
            }
        })
    }

    /// Proctime of the oldest queued frame.
    pub fn leading_proctime(&self) -> Option<u32> {
        let mut leading = None;
        let window = self.ring.read(1, |_, slot| {
            leading = Some(slot.get(0));
            true
        });
        if window.is_empty() {
            None
        } else {
            leading
        }
    }

    /// Copy up to `dest.capacity()` gap-free frames into `dest` without consuming.
    ///
    /// Returns the number of frames delivered (zero when empty or disabled).
    pub fn pull_into(&self, dest: &mut GroupSamples<T>) -> usize {
        let period = self.divider.period_ticks().unwrap_or(0);
        dest.clear(period);
        if period == 0 || dest.capacity == 0 {
            return 0;
        }

        let channels = self.group.channel_count().min(dest.channels);
        let capacity = dest.capacity;
        let window = {
            let data = &mut dest.data;
            let times = &mut dest.times;
            self.ring.read(capacity, |pos, slot| {
                let proctime = slot.get(0);
                if pos > 0 && times[pos - 1].wrapping_add(period) != proctime {
                    return false;
                }
                times[pos] = proctime;
                for ch in 0..channels {
                    data[ch * capacity + pos] = T::from_word(slot.get(1 + ch));
                }
                true
            })
        };

        let valid = window.valid();
        if valid.start > 0 {
            dest.compact(valid.start, valid.end);
        }
        dest.count = valid.len();
        if dest.count > 0 {
            dest.proctime = dest.times[0];
        }
        dest.count
    }

    /// Release up to `max` frames (consumer side). Returns frames released.
    pub fn consume(&self, max: usize) -> usize {
        self.ring.consume(max)
    }

    /// Release up to `max` frames, stopping at the first time discontinuity.
    ///
    /// This is the consumer's commit step after a pull: it never releases frames
    /// past a gap, so the next pull resumes right after the dropped samples.
    pub fn consume_run(&self, max: usize) -> ConsumedRun {
        self.release_run(max, None)
    }

    /// Like [`SampleBuffer::consume_run`], but never releases a frame at or after
    /// proctime `end`.
    ///
    /// The consumer passes the end of the block it pulled, so frames the producer
    /// wrote after an eviction are not released unseen.
    pub fn consume_run_before(&self, max: usize, end: u32) -> ConsumedRun {
        self.release_run(max, Some(end))
    }

    fn release_run(&self, max: usize, end: Option<u32>) -> ConsumedRun {
        let Some(period) = self.divider.period_ticks() else {
            return ConsumedRun::default();
        };

        let mut prev: Option<u32> = None;
        let mut last = 0;
        let window = self.ring.read(max, |_, slot| {
            let proctime = slot.get(0);
            if prev.is_some_and(|p| p.wrapping_add(period) != proctime) {
                return false;
            }
            if end.is_some_and(|e| proctime.wrapping_sub(e) as i32 >= 0) {
                return false;
            }
            prev = Some(proctime);
            last = proctime;
            true
        });
        self.ring.consume_to(window.first + window.visited as u64);

        let frames = window.len();
        if frames == 0 {
            return ConsumedRun::default();
        }
        // Valid positions are consecutive, so the first one follows from the last.
        let span = period.wrapping_mul(frames as u32 - 1);
        ConsumedRun {
            frames,
            first_proctime: Some(last.wrapping_sub(span)),
            next_proctime: Some(last.wrapping_add(period)),
        }
    }
}

/// Frames released by [`SampleBuffer::consume_run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumedRun {
    /// Frames released.
    pub frames: usize,
    /// Proctime of the first released frame.
    pub first_proctime: Option<u32>,
    /// Proctime the next frame carries if nothing is dropped.
    pub next_proctime: Option<u32>,
}
