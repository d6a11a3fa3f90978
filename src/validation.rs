//! Validation helpers for configuration and setup values.

use std::ops::RangeInclusive;

/// Log levels accepted by the `log_level` configuration key.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates a warning threshold in percent (0 disables the warning).
pub fn is_percentage(value: u32) -> Result<(), &'static str> {
    is_in_range(value, 0..=100).map_err(|_| "Threshold must be between 0 and 100 percent")
}

/// Validates that a buffer length is non-zero.
pub fn is_nonzero_len(len: u32) -> Result<(), &'static str> {
    if len > 0 {
        Ok(())
    } else {
        Err("Buffer length must be greater than 0")
    }
}

/// Validates if a given string is not empty.
///
/// # Arguments
///
/// * `value` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the string is not empty.
/// * `Err(&'static str)` if the string is empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates a log level name (case-insensitive).
pub fn is_valid_log_level(level: &str) -> Result<(), &'static str> {
    is_not_empty(level)?;
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err("Log level must be one of: trace, debug, info, warn, error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_bounds() {
        assert!(is_percentage(0).is_ok());
        assert!(is_percentage(100).is_ok());
        assert!(is_percentage(101).is_err());
    }

    #[test]
    fn log_levels() {
        assert!(is_valid_log_level("INFO").is_ok());
        assert!(is_valid_log_level("").is_err());
        assert!(is_valid_log_level("verbose").is_err());
    }

    #[test]
    fn buffer_lengths() {
        assert!(is_nonzero_len(1).is_ok());
        assert!(is_nonzero_len(0).is_err());
    }
}
