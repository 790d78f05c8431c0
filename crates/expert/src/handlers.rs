// Path: crates/expert/src/handlers.rs
//! The application seam of an expert.

use async_trait::async_trait;
use futures::stream::BoxStream;
use nostr::{EventId, PublicKey};
use sensei_types::model::Format;
use sensei_types::profile::Ask;
use serde_json::Value;

/// A fully ingested prompt: inline or drained from a prompt stream.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    /// The prompt event id, the correlation handle for the whole exchange.
    pub id: EventId,
    /// The ephemeral key the client signed the prompt with.
    pub author: PublicKey,
    /// The payload format.
    pub format: Format,
    /// The question; a string for `text`, an object for `openai`.
    pub payload: Value,
}

/// The price the expert puts on one prompt.
#[derive(Debug, Clone)]
pub struct Pricing {
    /// The price in satoshis.
    pub amount_sats: u64,
    /// The invoice description shown to the payer.
    pub description: String,
}

/// The expert's answer to a paid prompt.
pub enum ExpertReply {
    /// A single inline payload. Replies exceeding the event ceiling are
    /// streamed automatically.
    Inline(Value),
    /// An async sequence of raw chunks, always delivered over a stream.
    Streamed {
        /// Whether the chunks are bytes rather than UTF-8 text.
        binary: bool,
        /// The chunk sequence.
        chunks: BoxStream<'static, Vec<u8>>,
    },
}

/// Application callbacks driving an expert.
///
/// Every callback must be cancellation-safe: a session abandoned mid-await
/// (proof timeout, relay loss) drops the future and frees its resources.
/// Errors are strings because they cross the protocol boundary as peer
/// notifications; no internal detail should leak into them.
#[async_trait]
pub trait ExpertHandler: Send + Sync {
    /// Decide whether to bid on an ask; `Some(offer)` publishes a bid with
    /// that offer text.
    async fn on_ask(&self, ask: &Ask) -> Option<String>;

    /// Price a prompt. An error becomes an error-quote.
    async fn on_prompt_price(&self, prompt: &PromptRequest) -> Result<Pricing, String>;

    /// Produce the reply after payment verification. An error becomes an
    /// error-reply.
    async fn on_prompt_paid(&self, prompt: &PromptRequest) -> Result<ExpertReply, String>;
}
