// Path: crates/crypto/src/error.rs
//! Local error types for the `sensei-crypto` crate.

// Re-export the canonical error type from the types crate.
pub use sensei_types::error::CryptoError;
