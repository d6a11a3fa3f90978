//! Custom error types for the exchange layer.
//!
//! This module defines the primary error type, `ChanTrigError`. Using the `thiserror`
//! crate, it provides a centralized and consistent way to handle the failures the
//! exchange layer can report, from setup validation to out-of-range arguments.
//!
//! ## Error Hierarchy
//!
//! - **`ConfigurationRejected`**: An invalid divider, threshold or buffer-size
//!   combination at setup. Fatal: the extension is not started.
//! - **`InvalidArgument`**: An out-of-range channel or trigger index. Local to the
//!   call; the caller may retry with corrected input.
//! - **`Uninitialized`**: An exchange call before setup completed. Fatal to that call
//!   only; retrying after setup succeeds.
//! - **`ConfigSource`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in the configuration file or environment.
//! - **`Logging`**: The `tracing` subscriber could not be installed.
//!
//! An empty buffer and dropped samples are not errors: the former is a successful zero
//! count, the latter an advisory reported through the host comment channel.

use thiserror::Error;

/// Convenience alias for results using the exchange error type.
pub type AppResult<T> = std::result::Result<T, ChanTrigError>;

/// Errors returned by the exchange layer and its configuration.
#[derive(Error, Debug)]
pub enum ChanTrigError {
    /// Setup pair is inconsistent; the extension cannot run with it.
    #[error("Configuration rejected: {0}")]
    ConfigurationRejected(String),

    /// Per-call argument out of range; nothing was changed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Exchange call before a successful setup.
    #[error("Exchange layer is not configured")]
    Uninitialized,

    /// Configuration file or environment could not be read.
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] Box<figment::Error>),

    /// Log subscriber installation failed.
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<figment::Error> for ChanTrigError {
    fn from(value: figment::Error) -> Self {
        ChanTrigError::ConfigSource(Box::new(value))
    }
}

impl ChanTrigError {
    /// Whether the caller can retry the failed call.
    ///
    /// Setup failures stop the extension; per-call failures never escalate.
    pub fn can_recover(&self) -> bool {
        match self {
            ChanTrigError::InvalidArgument(_) | ChanTrigError::Uninitialized => true,
            ChanTrigError::ConfigurationRejected(_)
            | ChanTrigError::ConfigSource(_)
            | ChanTrigError::Logging(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_call_errors_are_recoverable() {
        assert!(ChanTrigError::Uninitialized.can_recover());
        assert!(ChanTrigError::InvalidArgument("channel 9".into()).can_recover());
    }

    #[test]
    fn setup_errors_are_fatal() {
        let err = ChanTrigError::ConfigurationRejected("divider 300".into());
        assert!(!err.can_recover());
        assert_eq!(err.to_string(), "Configuration rejected: divider 300");
    }
}
