// Path: crates/client/src/lib.rs
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

//! # Sensei Client
//!
//! The client side of the protocol: broadcast an anonymous ask and collect
//! authenticated bids, fetch expert profiles, then drive one exchange
//! (prompt, quote, payment decision, proof, and the reply sequence) against
//! a chosen expert. Every exchange runs under its own ephemeral keys and
//! owns every subscription, writer, and reader it opens.

pub mod client;
pub mod handlers;
pub mod replies;

pub use client::{AskParams, Client, FindExpertsParams};
pub use handlers::{PayingQuoteHandler, QuoteHandler};
pub use replies::{Replies, ReplyContent, ReplyItem};
