// Path: crates/test_utils/src/lib.rs
#![forbid(unsafe_code)]

//! # Sensei Test Utilities
//!
//! Shared mock implementations of the external collaborators: an in-memory
//! relay network behind the [`sensei_api::Relay`] seam and a mock Lightning
//! wallet behind [`sensei_api::LightningWallet`], with real signed BOLT-11
//! fixtures so the payment gate parses genuine invoices in tests.

pub mod invoice;
pub mod relay;
pub mod wallet;

pub use invoice::signed_invoice;
pub use relay::{MemoryRelay, MemoryRelayNetwork};
pub use wallet::{MockWallet, PaymentLedger};
