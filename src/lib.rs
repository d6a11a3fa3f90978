//! # Channel Trigger Exchange
//!
//! This crate moves data between a real-time acquisition loop (the firmware) and a
//! polling channel-trigger extension without locks on the data path. The firmware
//! writes decimated input samples and spikes into fixed-capacity rings; the
//! extension pulls and consumes them at its own cadence, sends analog output
//! samples back and fires output triggers.
//!
//! ## Crate Structure
//!
//! - **`registry`**: Static channel groups, output index space and master clock.
//! - **`divider`**: Per-group rate dividers and capacity derivation.
//! - **`data`**: Lock-free single-producer/single-consumer rings and the sample,
//!   spike, output and trigger buffers built on them.
//! - **`layout`**: Setup-time validation and ring capacity resolution.
//! - **`monitor`**: Edge-triggered buffer fill warnings.
//! - **`host`**: Host collaborators (comment channel, output routing).
//! - **`dispatch`**: Trigger validation and queuing.
//! - **`exchange`**: The extension-facing API and its lifecycle (`ChanTrig`).
//! - **`firmware`**: The real-time side (`FirmwarePort`) and buffer grants.
//! - **`config`**: `figment`-based configuration loading and validation.
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`error`**: The `ChanTrigError` enum shared by every module.
//! - **`validation`**: Small validation helpers for configuration values.
//! - **`sim`**: Synthetic firmware and reference extension used by the CLI.

pub mod config;
pub mod data;
pub mod dispatch;
pub mod divider;
pub mod error;
pub mod exchange;
pub mod firmware;
pub mod host;
pub mod layout;
pub mod logging;
pub mod monitor;
pub mod registry;
pub mod sim;
pub mod validation;

pub use error::{AppResult, ChanTrigError};
pub use exchange::{ChanTrig, Samples, SamplesCount};
pub use firmware::FirmwarePort;
