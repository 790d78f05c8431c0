// Path: crates/stream/src/lib.rs
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

//! # Sensei Stream Transport
//!
//! Carries an ordered, optionally encrypted, optionally compressed byte or
//! text stream of arbitrary length across many relay events.
//!
//! The writer closes one compression frame per chunk; the reader feeds every
//! frame to a single multi-member decompressor, so the yielded byte sequence
//! equals the concatenation of the writer's inputs, modulo re-chunking. The
//! transport may duplicate or reorder events; the reader is idempotent by
//! sequence number and strictly in-order.

pub mod reader;
pub mod writer;

pub use reader::StreamReader;
pub use writer::StreamWriter;
