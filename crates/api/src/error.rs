// Path: crates/api/src/error.rs
// Re-export the canonical error types from the central types crate.
pub use sensei_types::error::{
    CodecError, CryptoError, ErrorCode, PaymentError, ProtocolError, RelayError, StreamError,
};
pub use sensei_types::Result;
