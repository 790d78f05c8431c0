// Path: crates/stream/src/writer.rs
//! The chunked stream writer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use nostr::{PublicKey, Tag};
use sensei_api::relay::Relay;
use sensei_codec::{Compressor, SAFETY_MARGIN};
use sensei_crypto::{seal, sign_event, Keyring};
use sensei_relay::RelayPool;
use sensei_types::config::{StreamWriterConfig, PUBLISH_TIMEOUT};
use sensei_types::error::{CodecError, StreamError};
use sensei_types::event::{custom_tag, kind, tag};
use sensei_types::model::EncryptionScheme;
use sensei_types::stream::{ChunkInfo, StreamMetadata};
use tokio::time::Instant;
use tracing::debug;

/// Writes one stream: buffers payload bytes, partitions them into bounded
/// compression frames, encrypts each frame to the receiver, and publishes
/// signed chunk events in sequence.
///
/// `write` provides backpressure: it returns only once every chunk it
/// emitted was accepted by at least one relay. The time-based flush
/// condition is evaluated on each `write`; a caller that stops writing
/// without closing leaves its tail buffered until the next call.
pub struct StreamWriter<R: Relay> {
    pool: RelayPool<R>,
    metadata: StreamMetadata,
    signer: Keyring,
    receiver: Option<PublicKey>,
    config: StreamWriterConfig,
    buffer: Vec<u8>,
    next_seq: u64,
    last_emit: Instant,
    finished: bool,
}

impl<R: Relay> StreamWriter<R> {
    /// Creates a writer for `metadata`, signing chunks with `signer` (the
    /// key pair behind the metadata's stream id) and encrypting to
    /// `receiver` when the metadata demands NIP-44.
    pub fn new(
        pool: RelayPool<R>,
        metadata: StreamMetadata,
        signer: Keyring,
        receiver: Option<PublicKey>,
        config: StreamWriterConfig,
    ) -> Result<Self, StreamError> {
        let stream_pub = metadata.validate()?;
        if stream_pub != signer.public_key() {
            return Err(StreamError::InvalidMetadata(
                "stream id does not match the signing key".into(),
            ));
        }
        if metadata.encryption == EncryptionScheme::Nip44 && receiver.is_none() {
            return Err(StreamError::InvalidMetadata(
                "nip44 stream without a receiver key".into(),
            ));
        }
        if config.max_chunk_size <= 2 * SAFETY_MARGIN {
            return Err(StreamError::InvalidMetadata(
                "max_chunk_size leaves no usable frame budget".into(),
            ));
        }
        Ok(Self {
            pool,
            metadata,
            signer,
            receiver,
            config,
            buffer: Vec::new(),
            next_seq: 0,
            last_emit: Instant::now(),
            finished: false,
        })
    }

    /// The sequence number the next chunk will carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Appends `data` to the stream, flushing whole chunks when the buffer
    /// crosses the configured size, the flush interval has elapsed, or
    /// `close` is requested. With `close`, the final chunk carries
    /// `done=true` and the writer refuses further writes.
    pub async fn write(&mut self, data: &[u8], close: bool) -> Result<(), StreamError> {
        if self.finished {
            return Err(StreamError::Finished);
        }
        self.buffer.extend_from_slice(data);

        let interval_elapsed = !self.buffer.is_empty()
            && self.last_emit.elapsed() >= self.config.min_chunk_interval;
        if !close && self.buffer.len() < self.config.min_chunk_size && !interval_elapsed {
            return Ok(());
        }
        self.flush(close).await
    }

    /// Emits a single terminal chunk carrying `error=<code>:<message>` and
    /// tears the writer down. Buffered data is discarded.
    pub async fn error(&mut self, code: &str, message: &str) -> Result<(), StreamError> {
        if self.finished {
            return Err(StreamError::Finished);
        }
        self.buffer.clear();
        let tags = vec![
            custom_tag(tag::SEQ, self.next_seq.to_string()),
            custom_tag(tag::ERROR, ChunkInfo::encode_error(code, message)),
        ];
        let event = sign_event(kind::STREAM_CHUNK, "", tags, &self.signer)
            .map_err(StreamError::Crypto)?;
        self.pool
            .publish(&event, &self.metadata.relays, PUBLISH_TIMEOUT)
            .await?;
        self.finished = true;
        Ok(())
    }

    async fn flush(&mut self, close: bool) -> Result<(), StreamError> {
        while !self.buffer.is_empty() || (close && !self.finished) {
            let frame = self.next_frame()?;
            let is_final = close && self.buffer.is_empty();
            self.emit(frame, is_final).await?;
            if is_final {
                self.finished = true;
            }
            if !close && self.buffer.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Drains as much of the buffer as fits into one bounded frame.
    fn next_frame(&mut self) -> Result<Vec<u8>, StreamError> {
        let mut compressor =
            Compressor::start(self.metadata.compression, Some(self.config.max_chunk_size));
        while !self.buffer.is_empty() {
            let take = compressor.max_safe_chunk_size().min(self.buffer.len());
            if take == 0 {
                break;
            }
            let Some(piece) = self.buffer.get(..take) else {
                break;
            };
            match compressor.add(piece) {
                Ok(_) => {
                    self.buffer.drain(..take);
                }
                // Frame full: close it and leave the rest for the next one.
                Err(CodecError::SizeLimitExceeded { .. }) => break,
                Err(e) => return Err(StreamError::Codec(e)),
            }
        }
        compressor.finish().map_err(StreamError::Codec)
    }

    async fn emit(&mut self, frame: Vec<u8>, done: bool) -> Result<(), StreamError> {
        let content = match (&self.metadata.encryption, &self.receiver) {
            (EncryptionScheme::Nip44, Some(receiver)) => {
                seal(&frame, receiver, &self.signer).map_err(StreamError::Crypto)?
            }
            _ => BASE64.encode(&frame),
        };
        let mut tags: Vec<Tag> = vec![custom_tag(tag::SEQ, self.next_seq.to_string())];
        if done {
            tags.push(custom_tag(tag::DONE, "true"));
        }
        let event = sign_event(kind::STREAM_CHUNK, content, tags, &self.signer)
            .map_err(StreamError::Crypto)?;
        let accepted = self
            .pool
            .publish(&event, &self.metadata.relays, PUBLISH_TIMEOUT)
            .await?;
        debug!(
            seq = self.next_seq,
            done,
            relays = accepted.len(),
            "stream chunk published"
        );
        self.next_seq += 1;
        self.last_emit = Instant::now();
        Ok(())
    }
}
