// Path: crates/stream/src/reader.rs
//! The chunked stream reader.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use nostr::{Event, Filter, Kind, PublicKey, Timestamp};
use sensei_api::relay::Relay;
use sensei_codec::{Decompressor, Payload};
use sensei_crypto::{open, Keyring};
use sensei_relay::{RelayPool, Subscription};
use sensei_types::config::StreamReaderConfig;
use sensei_types::error::{CodecError, RelayError, StreamError};
use sensei_types::event::kind;
use sensei_types::model::EncryptionScheme;
use sensei_types::stream::{ChunkInfo, StreamMetadata};
use std::collections::BTreeMap;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Reads one stream: subscribes for chunk events, reorders them by sequence
/// number behind a sliding watermark, decrypts and decompresses each in
/// order, and yields decoded payloads until a terminal chunk, an error, or
/// the idle timeout.
///
/// Duplicate deliveries and chunks outside the reorder window are dropped;
/// the yielded sequence is strictly in-order and lossless.
pub struct StreamReader<R: Relay> {
    subscription: Subscription<R>,
    stream_pub: PublicKey,
    receiver: Option<Keyring>,
    encryption: EncryptionScheme,
    binary: bool,
    decompressor: Decompressor,
    pending: BTreeMap<u64, Event>,
    next_expected: u64,
    config: StreamReaderConfig,
    utf8_tail: Vec<u8>,
    finished: bool,
}

impl<R: Relay> StreamReader<R> {
    /// Opens a reader for `metadata`. `receiver` must hold the key the
    /// writer encrypts to when the metadata demands NIP-44.
    pub async fn open(
        pool: &RelayPool<R>,
        metadata: &StreamMetadata,
        receiver: Option<Keyring>,
        config: StreamReaderConfig,
    ) -> Result<Self, StreamError> {
        let stream_pub = metadata.validate()?;
        if metadata.encryption == EncryptionScheme::Nip44 && receiver.is_none() {
            return Err(StreamError::InvalidMetadata(
                "nip44 stream without a receiver key".into(),
            ));
        }
        let since = Timestamp::from(
            Timestamp::now()
                .as_u64()
                .saturating_sub(config.since_grace.as_secs()),
        );
        let filter = Filter::new()
            .kind(Kind::Custom(kind::STREAM_CHUNK))
            .author(stream_pub)
            .since(since);
        let subscription = pool.subscribe(filter, &metadata.relays).await;
        Ok(Self {
            subscription,
            stream_pub,
            receiver,
            encryption: metadata.encryption,
            binary: metadata.binary,
            decompressor: Decompressor::start(
                metadata.compression,
                metadata.binary,
                Some(config.max_stream_size),
            ),
            pending: BTreeMap::new(),
            next_expected: 0,
            config,
            utf8_tail: Vec::new(),
            finished: false,
        })
    }

    /// The sequence number the reader is waiting for.
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Yields the next in-order decoded payload, `None` after the stream has
    /// ended normally. Every error is terminal.
    pub async fn next_chunk(&mut self) -> Option<Result<Payload, StreamError>> {
        if self.finished {
            return None;
        }
        match self.advance().await {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }

    /// Drains the whole stream into one payload.
    pub async fn read_to_end(mut self) -> Result<Payload, StreamError> {
        let mut bytes = Vec::new();
        let mut text = String::new();
        while let Some(chunk) = self.next_chunk().await {
            match chunk? {
                Payload::Binary(b) => bytes.extend_from_slice(&b),
                Payload::Text(t) => text.push_str(&t),
            }
        }
        let binary = self.binary;
        self.close().await;
        if binary {
            Ok(Payload::Binary(bytes))
        } else {
            Ok(Payload::Text(text))
        }
    }

    /// Closes the underlying subscription.
    pub async fn close(self) {
        self.subscription.close().await;
    }

    async fn advance(&mut self) -> Result<Option<Payload>, StreamError> {
        loop {
            if let Some(event) = self.pending.remove(&self.next_expected) {
                return self.process(event);
            }
            self.wait_for_window().await?;
        }
    }

    /// Waits until the chunk at the watermark is buffered, enforcing the
    /// idle timeout across however many out-of-order arrivals it takes.
    async fn wait_for_window(&mut self) -> Result<(), StreamError> {
        let deadline = Instant::now() + self.config.idle_timeout;
        while !self.pending.contains_key(&self.next_expected) {
            let event = match timeout_at(deadline, self.subscription.recv()).await {
                Err(_) => {
                    return Err(StreamError::Timeout {
                        next_expected: self.next_expected,
                    })
                }
                Ok(None) => return Err(StreamError::Relay(RelayError::Closed)),
                Ok(Some(event)) => event,
            };
            let Some(info) = ChunkInfo::from_event(&event) else {
                debug!(event_id = %event.id, "malformed chunk dropped");
                continue;
            };
            if info.seq < self.next_expected
                || info.seq > self.next_expected + self.config.reorder_window
            {
                debug!(
                    seq = info.seq,
                    next_expected = self.next_expected,
                    "chunk outside reorder window dropped"
                );
                continue;
            }
            self.pending.entry(info.seq).or_insert(event);
        }
        Ok(())
    }

    /// Decrypts, decompresses, and yields one in-order chunk.
    fn process(&mut self, event: Event) -> Result<Option<Payload>, StreamError> {
        // from_event succeeded in wait_for_window; a None here means the
        // event was mutated, which cannot happen.
        let info = ChunkInfo::from_event(&event)
            .ok_or_else(|| StreamError::InvalidMetadata("chunk lost its tags".into()))?;

        if let Some((code, message)) = info.error {
            warn!(seq = info.seq, %code, "stream terminated by writer");
            return Err(StreamError::Remote { code, message });
        }

        let frame = self.decode_content(&event)?;
        if frame.len() > self.config.max_chunk_size {
            return Err(StreamError::Codec(CodecError::SizeLimitExceeded {
                current: frame.len(),
                max: self.config.max_chunk_size,
            }));
        }

        let mark = self.decompressor.current_size();
        self.decompressor.add(&frame).map_err(StreamError::Codec)?;
        let decoded = self.decompressor.decoded_since(mark).to_vec();
        self.next_expected += 1;

        let payload = if self.binary {
            Payload::Binary(decoded)
        } else {
            self.take_text(decoded, info.done)?
        };
        if info.done {
            self.finished = true;
        }
        Ok(Some(payload))
    }

    fn decode_content(&self, event: &Event) -> Result<Vec<u8>, StreamError> {
        match (&self.encryption, &self.receiver) {
            (EncryptionScheme::Nip44, Some(receiver)) => {
                Ok(open(&event.content, &self.stream_pub, receiver)
                    .map_err(StreamError::Crypto)?
                    .to_vec())
            }
            _ => BASE64
                .decode(event.content.as_bytes())
                .map_err(|e| StreamError::Codec(CodecError::Decompression(e.to_string()))),
        }
    }

    /// Text chunks must not split multi-byte characters across yields, so an
    /// incomplete tail is carried into the next chunk.
    fn take_text(&mut self, decoded: Vec<u8>, done: bool) -> Result<Payload, StreamError> {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(&decoded);
        match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(Payload::Text(text.to_string())),
            // An incomplete trailing character is carried into the next
            // chunk; a genuinely invalid sequence is fatal.
            Err(e) if !done && e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(bytes.get(..valid).unwrap_or_default())
                    .into_owned();
                self.utf8_tail = bytes.get(valid..).unwrap_or_default().to_vec();
                Ok(Payload::Text(text))
            }
            Err(_) => Err(StreamError::Codec(CodecError::InvalidUtf8)),
        }
    }
}
