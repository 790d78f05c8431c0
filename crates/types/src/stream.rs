// Path: crates/types/src/stream.rs
//! Stream metadata and chunk tag semantics for the chunked transport.

use crate::error::StreamError;
use crate::event::{self, kind, tag};
use crate::model::{CompressionMethod, EncryptionScheme};
use nostr::{Event, PublicKey};
use serde::{Deserialize, Serialize};

/// The only stream metadata version this implementation speaks.
pub const STREAM_VERSION: &str = "1";

/// Describes a chunked stream: where its chunks appear, who signs them, and
/// how each chunk is transformed.
///
/// This is the serialized content of the stream-metadata event carried
/// (encrypted) in a `stream` tag. The receiver public key and any shared key
/// material are passed transport-side to the writer and reader, never
/// serialized here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Hex public key of the ephemeral key pair the writer signs chunk
    /// events with. Doubles as the subscription author filter.
    #[serde(rename = "streamId")]
    pub stream_id: String,
    /// The relays the chunks will be published to.
    pub relays: Vec<String>,
    /// Per-chunk encryption scheme.
    #[serde(default)]
    pub encryption: EncryptionScheme,
    /// Compression applied to the byte stream before chunking.
    #[serde(default)]
    pub compression: CompressionMethod,
    /// Whether the decoded stream is bytes (`true`) or UTF-8 text.
    #[serde(default)]
    pub binary: bool,
    /// Metadata schema version. Only [`STREAM_VERSION`] is accepted.
    pub version: String,
}

impl StreamMetadata {
    /// Creates version-1 metadata for a new stream.
    pub fn new(
        stream_pubkey: PublicKey,
        relays: Vec<String>,
        encryption: EncryptionScheme,
        compression: CompressionMethod,
        binary: bool,
    ) -> Self {
        Self {
            stream_id: stream_pubkey.to_hex(),
            relays,
            encryption,
            compression,
            binary,
            version: STREAM_VERSION.to_string(),
        }
    }

    /// Validates the metadata and returns the parsed stream public key.
    pub fn validate(&self) -> Result<PublicKey, StreamError> {
        if self.version != STREAM_VERSION {
            return Err(StreamError::UnsupportedVersion(self.version.clone()));
        }
        if self.relays.is_empty() {
            return Err(StreamError::InvalidMetadata("empty relay list".into()));
        }
        PublicKey::from_hex(&self.stream_id)
            .map_err(|e| StreamError::InvalidMetadata(format!("bad stream id: {e}")))
    }
}

/// The decoded tag view of one chunk event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// The chunk's sequence number, contiguous from 0.
    pub seq: u64,
    /// True on the writer-declared last chunk.
    pub done: bool,
    /// `(code, message)` when the writer terminated the stream abnormally.
    pub error: Option<(String, String)>,
}

impl ChunkInfo {
    /// Decodes the chunk tags of a stream-chunk event.
    ///
    /// Returns `None` for anything malformed; the reader drops such events
    /// without failing the stream.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event::kind_of(event) != kind::STREAM_CHUNK {
            return None;
        }
        let seq: u64 = event::first_tag_value(event, tag::SEQ)?.parse().ok()?;
        let error = event::first_tag_value(event, tag::ERROR).map(|raw| {
            match raw.split_once(':') {
                Some((code, message)) => (code.to_string(), message.to_string()),
                None => (raw.to_string(), String::new()),
            }
        });
        Some(Self {
            seq,
            done: event::flag_tag(event, tag::DONE),
            error,
        })
    }

    /// True iff this chunk ends the stream, normally or not.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }

    /// Encodes an `error` tag value.
    pub fn encode_error(code: &str, message: &str) -> String {
        format!("{code}:{message}")
    }
}
