// Path: crates/client/src/replies.rs
//! The reply sequence returned by `ask_expert`.

use nostr::{Event, PublicKey};
use sensei_api::relay::Relay;
use sensei_codec::Payload;
use sensei_crypto::{open_string, parse_event, validate_event, Keyring};
use sensei_relay::{RelayPool, Subscription};
use sensei_stream::StreamReader;
use sensei_types::config::{StreamReaderConfig, REPLY_TIMEOUT};
use sensei_types::error::{ProtocolError, StreamError};
use sensei_types::event::{first_tag_value, kind, kind_of, tag};
use sensei_types::payload::ReplyPayload;
use sensei_types::stream::StreamMetadata;
use serde_json::Value;
use tracing::debug;

/// One decoded item of the reply sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyItem {
    /// The reply content. The synthetic end-of-stream marker carries
    /// [`ReplyContent::Json`] with a null value.
    pub content: ReplyContent,
    /// True on the final item of the sequence.
    pub done: bool,
}

/// The decoded content of one reply item.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyContent {
    /// An inline reply payload.
    Json(Value),
    /// One text chunk of a streamed reply.
    Text(String),
    /// One binary chunk of a streamed reply.
    Binary(Vec<u8>),
}

enum RepliesState<R: Relay> {
    AwaitingReply(Subscription<R>),
    Streaming(StreamReader<R>),
    Done,
}

/// An async sequence of reply items for one exchange.
///
/// For an inline reply it yields exactly one item with `done=true`. For a
/// streamed reply it yields each decoded chunk with `done=false`, then a
/// synthetic `done=true` marker. Dropping the sequence closes its
/// subscription and stream reader within one scheduler turn; no retries are
/// issued.
pub struct Replies<R: Relay> {
    pool: RelayPool<R>,
    expert: PublicKey,
    prompt_keys: Keyring,
    reader_config: StreamReaderConfig,
    state: RepliesState<R>,
}

impl<R: Relay> std::fmt::Debug for Replies<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replies").field("expert", &self.expert).finish()
    }
}

impl<R: Relay> Replies<R> {
    pub(crate) fn new(
        pool: RelayPool<R>,
        expert: PublicKey,
        prompt_keys: Keyring,
        reader_config: StreamReaderConfig,
        subscription: Subscription<R>,
    ) -> Self {
        Self {
            pool,
            expert,
            prompt_keys,
            reader_config,
            state: RepliesState::AwaitingReply(subscription),
        }
    }

    /// Yields the next reply item, `None` after the sequence has ended.
    /// Every error is terminal.
    pub async fn next(&mut self) -> Option<Result<ReplyItem, ProtocolError>> {
        loop {
            match &mut self.state {
                RepliesState::Done => return None,
                RepliesState::AwaitingReply(subscription) => {
                    let received =
                        tokio::time::timeout(REPLY_TIMEOUT, subscription.recv()).await;
                    let event = match received {
                        Err(_) | Ok(None) => {
                            self.state = RepliesState::Done;
                            return Some(Err(ProtocolError::Timeout("reply")));
                        }
                        Ok(Some(event)) => event,
                    };
                    match self.accept_reply(event).await {
                        // Streamed reply: loop back and pull the first chunk.
                        Ok(None) => continue,
                        Ok(Some(item)) => {
                            self.state = RepliesState::Done;
                            return Some(Ok(item));
                        }
                        Err(e) => {
                            self.state = RepliesState::Done;
                            return Some(Err(e));
                        }
                    }
                }
                RepliesState::Streaming(reader) => match reader.next_chunk().await {
                    Some(Ok(payload)) => {
                        let content = match payload {
                            Payload::Text(t) => ReplyContent::Text(t),
                            Payload::Binary(b) => ReplyContent::Binary(b),
                        };
                        return Some(Ok(ReplyItem {
                            content,
                            done: false,
                        }));
                    }
                    Some(Err(StreamError::Remote { code, message })) => {
                        self.state = RepliesState::Done;
                        return Some(Err(ProtocolError::Expert(format!("{code}: {message}"))));
                    }
                    Some(Err(e)) => {
                        self.state = RepliesState::Done;
                        return Some(Err(ProtocolError::Stream(e)));
                    }
                    None => {
                        self.state = RepliesState::Done;
                        return Some(Ok(ReplyItem {
                            content: ReplyContent::Json(Value::Null),
                            done: true,
                        }));
                    }
                },
            }
        }
    }

    /// Decodes the single reply event: either an inline payload (one item)
    /// or a stream tag, which switches the sequence into streaming mode.
    async fn accept_reply(&mut self, event: Event) -> Result<Option<ReplyItem>, ProtocolError> {
        if let Some(cipher) = first_tag_value(&event, tag::STREAM) {
            let metadata = self.decode_stream_metadata(cipher)?;
            let reader = StreamReader::open(
                &self.pool,
                &metadata,
                Some(self.prompt_keys.clone()),
                self.reader_config.clone(),
            )
            .await
            .map_err(ProtocolError::Stream)?;
            debug!(stream_id = %metadata.stream_id, "reply stream opened");
            self.state = RepliesState::Streaming(reader);
            return Ok(None);
        }

        let body = open_string(&event.content, &self.expert, &self.prompt_keys)?;
        match ReplyPayload::parse(body.as_bytes())? {
            ReplyPayload::Content { payload, done } => Ok(Some(ReplyItem {
                content: ReplyContent::Json(payload),
                done,
            })),
            ReplyPayload::Error { error } => Err(ProtocolError::Expert(error)),
        }
    }

    /// The stream tag carries an encrypted, signed stream-metadata event;
    /// it crosses a trust boundary and is validated before use.
    fn decode_stream_metadata(&self, cipher: &str) -> Result<StreamMetadata, ProtocolError> {
        let serialized = open_string(cipher, &self.expert, &self.prompt_keys)?;
        let meta_event = parse_event(&serialized)?;
        if !validate_event(&meta_event) {
            return Err(ProtocolError::InvalidEvent(
                "stream metadata signature invalid".into(),
            ));
        }
        if kind_of(&meta_event) != kind::STREAM_METADATA {
            return Err(ProtocolError::InvalidEvent(
                "stream tag does not carry stream metadata".into(),
            ));
        }
        if meta_event.pubkey != self.expert {
            return Err(ProtocolError::InvalidEvent(
                "stream metadata not authored by the expert".into(),
            ));
        }
        serde_json::from_str(&meta_event.content)
            .map_err(|e| ProtocolError::InvalidEvent(format!("malformed stream metadata: {e}")))
    }
}
