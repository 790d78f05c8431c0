// Path: crates/types/src/error/mod.rs
//! Core error types for the Sensei protocol.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
///
/// The code (never a stack trace) is what crosses the protocol boundary when
/// a peer must be notified of a failure.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised by the relay pool adapter.
#[derive(Error, Debug)]
pub enum RelayError {
    /// No relay accepted a publish before the timeout.
    #[error("No relay accepted the event")]
    Unreachable,
    /// A transport-level failure on a single relay connection.
    #[error("Relay transport error: {0}")]
    Transport(String),
    /// The subscription or pool was closed while an operation was pending.
    #[error("Relay pool closed")]
    Closed,
}

impl ErrorCode for RelayError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreachable => "RELAY_UNREACHABLE",
            Self::Transport(_) => "RELAY_TRANSPORT",
            Self::Closed => "RELAY_CLOSED",
        }
    }
}

/// Errors raised by the cryptographic primitives.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Authenticated decryption failed.
    #[error("Decryption failed")]
    Decryption,
    /// Encryption to the receiver failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),
    /// A key could not be parsed or derived.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// Event signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),
    /// Signature, kind, or tag validation failed on a trust-boundary event.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::Decryption => "CRYPTO_DECRYPTION_FAILED",
            Self::Encryption(_) => "CRYPTO_ENCRYPTION_FAILED",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::Signing(_) => "CRYPTO_SIGNING_FAILED",
            Self::InvalidEvent(_) => "CRYPTO_INVALID_EVENT",
        }
    }
}

/// Errors raised by the incremental codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The accumulated result would cross the configured cap.
    #[error("Size limit exceeded: {current} bytes accumulated, limit {max}")]
    SizeLimitExceeded {
        /// Bytes accumulated so far.
        current: usize,
        /// The configured cap.
        max: usize,
    },
    /// The input was not valid for the declared compression method.
    #[error("Decompression failed: {0}")]
    Decompression(String),
    /// The decompressed result was declared textual but is not valid UTF-8.
    #[error("Decoded payload is not valid UTF-8")]
    InvalidUtf8,
    /// An I/O failure inside the underlying compression stream.
    #[error("Codec I/O error: {0}")]
    Io(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::SizeLimitExceeded { .. } => "CODEC_SIZE_LIMIT_EXCEEDED",
            Self::Decompression(_) => "CODEC_DECOMPRESSION_FAILED",
            Self::InvalidUtf8 => "CODEC_INVALID_UTF8",
            Self::Io(_) => "CODEC_IO",
        }
    }
}

/// Errors terminating a chunked stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The peer signaled abnormal termination in an `error` chunk.
    #[error("Stream error from peer [{code}]: {message}")]
    Remote {
        /// The short machine-readable code from the terminal chunk.
        code: String,
        /// The human-readable message from the terminal chunk.
        message: String,
    },
    /// The next expected chunk did not arrive within the idle timeout.
    #[error("Stream timed out waiting for chunk {next_expected}")]
    Timeout {
        /// The sequence number the reader was waiting for.
        next_expected: u64,
    },
    /// The decompressed stream total crossed the configured cap.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Per-chunk decryption failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The relay layer failed while publishing or subscribing.
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// The stream metadata carried an unknown version.
    #[error("Unsupported stream metadata version: {0}")]
    UnsupportedVersion(String),
    /// The metadata was malformed (bad stream id, empty relay list).
    #[error("Invalid stream metadata: {0}")]
    InvalidMetadata(String),
    /// The writer was asked to write after close or error.
    #[error("Stream already finished")]
    Finished,
}

impl ErrorCode for StreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "STREAM_REMOTE_ERROR",
            Self::Timeout { .. } => "STREAM_TIMEOUT",
            Self::Codec(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Relay(e) => e.code(),
            Self::UnsupportedVersion(_) => "STREAM_UNSUPPORTED_VERSION",
            Self::InvalidMetadata(_) => "STREAM_INVALID_METADATA",
            Self::Finished => "STREAM_FINISHED",
        }
    }
}

/// Errors raised by the payment gate.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// An invoice failed validation or violated the caller's policy.
    #[error("Payment rejected: {0}")]
    Rejected(String),
    /// The wallet failed while paying or verifying.
    #[error("Payment failed: {0}")]
    Failed(String),
}

impl ErrorCode for PaymentError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "PAYMENT_REJECTED",
            Self::Failed(_) => "PAYMENT_FAILED",
        }
    }
}

/// The top-level error surfaced by the client and expert state machines.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Malformed caller input (empty required field, unsupported format).
    #[error("Invalid argument: {0}")]
    Argument(String),
    /// An expected event did not arrive before its timeout.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    /// The peer signaled an error inside an encrypted payload.
    #[error("Expert error: {0}")]
    Expert(String),
    /// The response requires streaming but the peer does not accept it.
    #[error("Streaming required but not supported by the peer")]
    StreamUnsupported,
    /// Signature, kind, or tag validation failed on a trust-boundary event.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    /// The relay layer failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// A cryptographic primitive failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The codec rejected a payload.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A chunked stream terminated abnormally.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// The payment gate rejected or failed an invoice.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::Argument(_) => "ARGUMENT_INVALID",
            Self::Timeout(_) => "TIMEOUT",
            Self::Expert(_) => "EXPERT_ERROR",
            Self::StreamUnsupported => "STREAM_UNSUPPORTED",
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::Relay(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Codec(e) => e.code(),
            Self::Stream(e) => e.code(),
            Self::Payment(e) => e.code(),
        }
    }
}
