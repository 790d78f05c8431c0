// Path: crates/types/src/config.rs
//! Shared configuration structures and protocol timeout defaults.

use std::time::Duration;

/// How long the client collects bids after publishing an ask.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
/// One-shot expert profile fetch timeout.
pub const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the client waits for a quote after publishing a prompt.
pub const QUOTE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the client waits for the first reply event after paying.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(60);
/// How long the expert waits for a proof after sending a quote.
pub const PROOF_TIMEOUT: Duration = Duration::from_secs(60);
/// Per-relay publish acknowledgement timeout.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
/// Default expiry requested for wallet invoices.
pub const INVOICE_EXPIRY: Duration = Duration::from_secs(120);
/// How often the expert republishes its profile unprompted.
pub const PROFILE_REPUBLISH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
/// Asks and prompts older than this are ignored.
pub const EVENT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Flush and sizing policy for a stream writer.
#[derive(Debug, Clone)]
pub struct StreamWriterConfig {
    /// Emit a chunk at least this often while data is buffered.
    pub min_chunk_interval: Duration,
    /// Emit a chunk as soon as the buffer crosses this size.
    pub min_chunk_size: usize,
    /// Upper bound on a single chunk's pre-encryption size. Must leave room
    /// for encryption and envelope overhead under the event content ceiling.
    pub max_chunk_size: usize,
}

impl Default for StreamWriterConfig {
    fn default() -> Self {
        Self {
            min_chunk_interval: Duration::from_millis(500),
            min_chunk_size: 4 * 1024,
            // 32 KiB compressed grows to ~44 KiB after NIP-44 + base64,
            // under the 48 KiB content ceiling.
            max_chunk_size: 32 * 1024,
        }
    }
}

/// Acceptance and defense policy for a stream reader.
#[derive(Debug, Clone)]
pub struct StreamReaderConfig {
    /// Upper bound on a single chunk's post-decryption size.
    pub max_chunk_size: usize,
    /// Upper bound on the decompressed stream total (bomb defense).
    pub max_stream_size: usize,
    /// Abort if the next expected chunk is missing for this long.
    pub idle_timeout: Duration,
    /// How far ahead of the watermark a chunk may arrive before it is
    /// dropped as out-of-window.
    pub reorder_window: u64,
    /// Subscription `since` is the stream open time minus this grace.
    pub since_grace: Duration,
}

impl Default for StreamReaderConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 64 * 1024,
            max_stream_size: 10 * 1024 * 1024,
            idle_timeout: Duration::from_secs(60),
            reorder_window: 32,
            since_grace: Duration::from_secs(60),
        }
    }
}
