// Path: crates/payment/src/lib.rs
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

//! # Sensei Payment Gate
//!
//! Validates invoices against expected amounts, enforces the client's amount
//! policy, verifies preimages, and constructs proof payloads. Paying and
//! invoice creation stay behind the opaque wallet seam in `sensei-api`.

pub mod gate;

pub use gate::{
    error_proof, invoice_amount_sats, parse_invoice, payment_proof, validate_quote,
    verify_preimage, PaymentPolicy,
};
