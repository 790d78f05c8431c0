// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Sensei Types
//!
//! This crate is the foundational library for the Sensei protocol, containing
//! all core data structures, payload schemas, and error types.
//!
//! ## Architectural Role
//!
//! As the base crate, `sensei-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `ExpertProfile`, `StreamMetadata`, and the error
//! enums.
//!
//! The wire substrate is the `nostr` event model; the decoded views in this
//! crate parse the fixed tag vocabulary into explicit fields while the wire
//! form remains the tag array for forward compatibility.

/// The maximum size in bytes of a single event's content payload. Anything
/// larger must travel over the chunked stream transport. The relay-side hard
/// cap is 64 KiB per event; the remainder is reserved for envelope overhead.
pub const MAX_EVENT_CONTENT_BYTES: usize = 48 * 1024; // 48 KiB

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::ProtocolError> = std::result::Result<T, E>;

/// Timeout defaults and tunable configuration structures.
pub mod config;
/// A unified set of all error types used across the workspace.
pub mod error;
/// Event kinds, the tag vocabulary, and tag access helpers.
pub mod event;
/// Small closed vocabularies: formats, payment methods, codecs.
pub mod model;
/// Encrypted payload schemas carried inside event content.
pub mod payload;
/// Decoded views of the discovery entities: profiles, asks, bids.
pub mod profile;
/// Stream metadata and chunk tag semantics for the chunked transport.
pub mod stream;
