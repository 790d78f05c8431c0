// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]
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

//! # Sensei API
//!
//! Core traits for the Sensei protocol's external collaborators. The state
//! machines are generic over these seams: the relay transport behind
//! [`relay::Relay`] and the Lightning wallet behind
//! [`wallet::LightningWallet`] are both out of scope for this workspace,
//! and only their interfaces matter here.

/// Canonical error re-exports.
pub mod error;
/// The per-relay transport seam.
pub mod relay;
/// The opaque Lightning wallet seam.
pub mod wallet;

pub use relay::Relay;
pub use wallet::LightningWallet;
