// Path: crates/codec/src/lib.rs
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

//! # Sensei Codec
//!
//! Streaming gzip compress/decompress and pass-through with a hard
//! result-size cap surfaced as a typed error.
//!
//! Both sides of the protocol enforce an event-payload ceiling; the cap is
//! how the streaming layer partitions an arbitrary-length payload into safe
//! packets while also defending against decompression bombs. The writer
//! closes one gzip member per chunk and the reader decodes the concatenation
//! with a multi-member decoder, so per-chunk compression on one side
//! composes with a single long-lived decompressor on the other.

pub mod incremental;

pub use incremental::{
    decompress_all, max_safe_chunk_size, Compressor, Decompressor, Payload, SAFETY_MARGIN,
};
