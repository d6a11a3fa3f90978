//! Edge-triggered buffer fill warnings.
//!
//! A [`ThresholdMonitor`] is evaluated after every push and every consume on its
//! buffer. It reports a crossing once when the fill level rises to the threshold
//! and stays silent until the fill level has dropped below it again. It never
//! influences producers or consumers.
//!
//! Both sides of a buffer evaluate the same monitor. The arming state carries a
//! generation that advances on every re-arm; the fill level is sampled after the
//! state is loaded and every transition is a compare-exchange against that load,
//! so a re-arm decided on a stale fill level cannot undo a newer crossing.

use crate::host::{Advisory, BufferKind, HostChannel};
use std::sync::atomic::{AtomicU64, Ordering};

const ARMED: u64 = 1;
const GENERATION: u64 = 2;

/// Edge-triggered fill-level monitor for one buffer.
#[derive(Debug)]
pub struct ThresholdMonitor {
    buffer: BufferKind,
    threshold: u32,
    state: AtomicU64,
    crossings: AtomicU64,
}

impl ThresholdMonitor {
    /// Monitor `buffer` against `threshold` percent (0 disables).
    pub fn new(buffer: BufferKind, threshold: u32) -> Self {
        Self {
            buffer,
            threshold,
            state: AtomicU64::new(ARMED),
            crossings: AtomicU64::new(0),
        }
    }

    /// Configured threshold in percent.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether the monitor is active.
    pub fn is_enabled(&self) -> bool {
        self.threshold != 0
    }

    /// Upward crossings reported so far.
    pub fn crossings(&self) -> u64 {
        self.crossings.load(Ordering::Relaxed)
    }

    /// Evaluate a fill level. Returns the advisory on an upward crossing.
    pub fn observe(&self, fill_percent: u32) -> Option<Advisory> {
        self.observe_with(|| fill_percent)
    }

    /// Evaluate the fill level returned by `fill`, sampled after the arming state.
    pub fn observe_with(&self, fill: impl FnOnce() -> u32) -> Option<Advisory> {
        if !self.is_enabled() {
            return None;
        }
        let state = self.state.load(Ordering::Acquire);
        let fill_percent = fill();
        let armed = state & ARMED != 0;

        if fill_percent >= self.threshold {
            let fired = armed
                && self
                    .state
                    .compare_exchange(state, state & !ARMED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
            if fired {
                self.crossings.fetch_add(1, Ordering::Relaxed);
                return Some(Advisory::ThresholdCrossed {
                    buffer: self.buffer,
                    fill_percent,
                    threshold: self.threshold,
                });
            }
        } else if !armed {
            let rearmed = state.wrapping_add(GENERATION) | ARMED;
            // Losing the exchange means the other side moved the state first.
            let _ = self.state.compare_exchange(
                state,
                rearmed,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
        None
    }

    /// Evaluate the fill level returned by `fill` and forward any crossing to the host.
    pub fn observe_and_report(&self, fill: impl FnOnce() -> u32, host: &dyn HostChannel) {
        if let Some(advisory) = self.observe_with(fill) {
            host.comment(&advisory);
        }
    }
}
