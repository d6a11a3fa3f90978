//! Per-group sample rate decimation.
//!
//! Divider values are applied at [`MAX_SAMPLE_RATE`]: 0 disables the group, 1
//! keeps every master tick, N keeps every Nth tick.

use crate::error::{AppResult, ChanTrigError};
use crate::registry::{InputGroup, MAX_SAMPLE_RATE};
use serde::{Deserialize, Serialize};

/// Largest divider the divider field can carry.
pub const MAX_DIVIDER: u32 = u8::MAX as u32;

/// Validated rate divider for one input group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDivider(u8);

impl RateDivider {
    /// Disabled group.
    pub const DISABLED: RateDivider = RateDivider(0);
    /// Full master rate.
    pub const FULL: RateDivider = RateDivider(1);

    /// Validate a raw divider for `group`.
    ///
    /// Values wider than the divider field cannot be expressed in proctime
    /// resolution and reject the whole setup.
    pub fn new(group: InputGroup, raw: u32) -> AppResult<Self> {
        u8::try_from(raw).map(RateDivider).map_err(|_| {
            ChanTrigError::ConfigurationRejected(format!(
                "{group} divider {raw} exceeds maximum {MAX_DIVIDER}"
            ))
        })
    }

    /// Raw divider value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether the group is acquired at all.
    pub fn is_enabled(self) -> bool {
        self.0 != 0
    }

    /// Effective period in master ticks, `None` when disabled.
    pub fn period_ticks(self) -> Option<u32> {
        self.is_enabled().then_some(u32::from(self.0))
    }

    /// Effective sample rate in Hz (0.0 when disabled).
    pub fn effective_rate_hz(self) -> f64 {
        match self.period_ticks() {
            Some(period) => f64::from(MAX_SAMPLE_RATE) / f64::from(period),
            None => 0.0,
        }
    }

    /// Whether a frame is produced for this group at master tick `proctime`.
    pub fn samples_at(self, proctime: u32) -> bool {
        match self.period_ticks() {
            Some(period) => proctime % period == 0,
            None => false,
        }
    }

    /// Ring capacity in frames for a buffer length expressed at full rate.
    ///
    /// The buffer covers the same time window regardless of the divider, so
    /// decimated groups need proportionally fewer frames.
    pub fn frames_for(self, full_rate_len: u32) -> usize {
        match self.period_ticks() {
            Some(period) => full_rate_len.div_ceil(period) as usize,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_scales_with_divider() {
        for raw in 1..=MAX_DIVIDER {
            let div = RateDivider::new(InputGroup::Frontend, raw).unwrap();
            assert_eq!(div.period_ticks(), Some(raw));
            let expected = f64::from(MAX_SAMPLE_RATE) / f64::from(raw);
            assert!((div.effective_rate_hz() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_disables_and_allocates_nothing() {
        let div = RateDivider::new(InputGroup::AnalogInput, 0).unwrap();
        assert!(!div.is_enabled());
        assert_eq!(div.period_ticks(), None);
        assert_eq!(div.frames_for(30_000), 0);
        assert!(!div.samples_at(0));
    }

    #[test]
    fn oversized_divider_rejected() {
        let err = RateDivider::new(InputGroup::DigitalInput, 256).unwrap_err();
        assert!(matches!(err, ChanTrigError::ConfigurationRejected(_)));
        assert!(err.to_string().contains("digital_input"));
    }

    #[test]
    fn decimation_keeps_every_nth_tick() {
        let div = RateDivider::new(InputGroup::Frontend, 3).unwrap();
        let kept: Vec<u32> = (0..10).filter(|&t| div.samples_at(t)).collect();
        assert_eq!(kept, vec![0, 3, 6, 9]);
        assert_eq!(div.frames_for(10), 4);
    }
}
