// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Sensei Telemetry
//!
//! Observability infrastructure for Sensei deployments: structured logging
//! initialization and a scope timer for measuring exchange durations.

/// The initialization routine for global structured logging.
pub mod init;
/// A simple RAII timer for measuring the duration of a scope.
pub mod time;

pub use init::init_tracing;
pub use time::{DurationSink, Timer, TracingSink};
