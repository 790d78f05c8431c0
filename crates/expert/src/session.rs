// Path: crates/expert/src/session.rs
//! Per-ask and per-prompt session handling.
//!
//! Each session runs on its own task. State per prompt:
//! `awaiting → priced → paid → replying → (done|failed)`. Abandoning a
//! session (no proof, client abort) drops everything it held; failures
//! after payment verification are reported to the peer as an error-reply,
//! never silently.

use crate::handlers::{ExpertHandler, ExpertReply, PromptRequest};
use crate::server::{ExpertAttributes, ExpertInner};
use futures::stream::BoxStream;
use futures::StreamExt;
use nostr::{Event, EventId, Filter, JsonUtil, Kind, PublicKey, Timestamp};
use sensei_api::relay::Relay;
use sensei_api::wallet::LightningWallet;
use sensei_codec::{incremental::decompress_all, Payload};
use sensei_crypto::{open, open_string, parse_event, seal, sign_event, validate_event};
use sensei_payment::verify_preimage;
use sensei_relay::RelayPool;
use sensei_stream::{StreamReader, StreamWriter};
use sensei_telemetry::{Timer, TracingSink};
use sensei_types::config::{
    StreamReaderConfig, StreamWriterConfig, EVENT_FRESHNESS_WINDOW, INVOICE_EXPIRY,
    PROOF_TIMEOUT, PUBLISH_TIMEOUT,
};
use sensei_types::error::ProtocolError;
use sensei_types::event::{
    custom_tag, event_ref_tag, first_tag_value, flag_tag, is_fresh, kind, kind_of,
    pubkey_ref_tag, tag,
};
use sensei_types::model::{
    CompressionMethod, EncryptionScheme, Format, PaymentMethod,
};
use sensei_types::payload::{InvoiceRecord, ProofPayload, QuotePayload, ReplyPayload};
use sensei_types::profile::Ask;
use sensei_types::stream::StreamMetadata;
use sensei_types::MAX_EVENT_CONTENT_BYTES;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cap for legacy single-event compressed prompts.
const LEGACY_DECOMPRESS_CAP: usize = 10 * 1024 * 1024;

/// Answers one ask with an anonymized bid, if the handler wants it.
pub(crate) async fn handle_ask<R, W, H>(inner: Arc<ExpertInner<R, W, H>>, event: Event)
where
    R: Relay,
    W: LightningWallet,
    H: ExpertHandler,
{
    let ask = match Ask::from_event(&event) {
        Ok(ask) => ask,
        Err(e) => {
            debug!(event_id = %event.id, error = %e, "unparseable ask dropped");
            return;
        }
    };
    if !is_fresh(&event, Timestamp::now(), EVENT_FRESHNESS_WINDOW.as_secs()) {
        debug!(ask_id = %ask.id, "stale ask dropped");
        return;
    }
    let attrs = inner.attrs.read().await.clone();
    if !ask.hashtags.iter().any(|t| attrs.hashtags.contains(t)) {
        debug!(ask_id = %ask.id, "ask off-topic, dropped");
        return;
    }

    let Some(offer) = inner.handler.on_ask(&ask).await else {
        return;
    };

    // The payload reveals the long-term identity; it travels only inside
    // the envelope ciphertext, signed so the asker can authenticate it.
    let payload_tags = bid_payload_tags(&attrs, &ask);
    let payload_event = match sign_event(kind::BID_PAYLOAD, offer, payload_tags, &inner.keys) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "bid payload signing failed");
            return;
        }
    };

    let envelope_keys = sensei_crypto::Keyring::generate();
    let sealed = match seal(
        payload_event.as_json().as_bytes(),
        &ask.author,
        &envelope_keys,
    ) {
        Ok(cipher) => cipher,
        Err(e) => {
            warn!(error = %e, "bid sealing failed");
            return;
        }
    };
    let envelope = match sign_event(
        kind::BID_ENVELOPE,
        sealed,
        vec![event_ref_tag(&ask.id)],
        &envelope_keys,
    ) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "bid envelope signing failed");
            return;
        }
    };
    match inner
        .pool
        .publish(&envelope, &attrs.discovery_relays, PUBLISH_TIMEOUT)
        .await
    {
        Ok(accepted) => info!(ask_id = %ask.id, relays = accepted.len(), "bid published"),
        Err(e) => warn!(ask_id = %ask.id, error = %e, "bid publish failed"),
    }
}

fn bid_payload_tags(attrs: &ExpertAttributes, ask: &Ask) -> Vec<nostr::Tag> {
    let formats: Vec<Format> = if ask.formats.is_empty() {
        attrs.formats.clone()
    } else {
        attrs
            .formats
            .iter()
            .copied()
            .filter(|f| ask.formats.contains(f))
            .collect()
    };
    let methods: Vec<PaymentMethod> = if ask.methods.is_empty() {
        attrs.methods.clone()
    } else {
        attrs
            .methods
            .iter()
            .copied()
            .filter(|m| ask.methods.contains(m))
            .collect()
    };
    let mut tags = Vec::new();
    for relay in &attrs.prompt_relays {
        tags.push(custom_tag(tag::RELAY, relay.clone()));
    }
    for format in &formats {
        tags.push(custom_tag(tag::FORMAT, format.as_str()));
    }
    if attrs.stream_supported && ask.stream {
        tags.push(custom_tag(tag::STREAM_FLAG, "true"));
    }
    for method in &methods {
        tags.push(custom_tag(tag::METHOD, method.as_str()));
    }
    for hashtag in &attrs.hashtags {
        tags.push(nostr::Tag::hashtag(hashtag.clone()));
    }
    tags
}

/// Services one prompt end to end.
pub(crate) async fn handle_prompt<R, W, H>(inner: Arc<ExpertInner<R, W, H>>, event: Event)
where
    R: Relay,
    W: LightningWallet,
    H: ExpertHandler,
{
    if !inner.seen_prompts.insert(event.id) {
        debug!(prompt_id = %event.id, "duplicate prompt dropped");
        return;
    }
    if !is_fresh(&event, Timestamp::now(), EVENT_FRESHNESS_WINDOW.as_secs()) {
        debug!(prompt_id = %event.id, "stale prompt dropped");
        return;
    }
    let sink = TracingSink;
    let _timer = Timer::new(&sink, "prompt_session");

    let attrs = inner.attrs.read().await.clone();
    let client_streams = flag_tag(&event, tag::STREAM_FLAG);

    let prompt = match ingest_prompt(&inner, &attrs, &event).await {
        Ok(prompt) => prompt,
        Err(reason) => {
            warn!(prompt_id = %event.id, %reason, "prompt rejected");
            send_quote(
                &inner.pool,
                &inner.keys,
                &attrs,
                &event.pubkey,
                &event.id,
                &QuotePayload::Error { error: reason },
            )
            .await;
            return;
        }
    };
    info!(prompt_id = %prompt.id, format = %prompt.format, "prompt ingested");

    let pricing = match inner.handler.on_prompt_price(&prompt).await {
        Ok(pricing) => pricing,
        Err(reason) => {
            send_quote(
                &inner.pool,
                &inner.keys,
                &attrs,
                &prompt.author,
                &prompt.id,
                &QuotePayload::Error { error: reason },
            )
            .await;
            return;
        }
    };

    let mut invoices = Vec::new();
    for method in &attrs.methods {
        match method {
            PaymentMethod::Lightning => {
                match inner
                    .wallet
                    .create_invoice(pricing.amount_sats, &pricing.description, INVOICE_EXPIRY)
                    .await
                {
                    Ok(bolt11) => invoices.push(InvoiceRecord {
                        method: *method,
                        unit: "sat".into(),
                        amount: pricing.amount_sats,
                        invoice: bolt11,
                    }),
                    Err(e) => warn!(error = %e, "invoice creation failed"),
                }
            }
        }
    }
    if invoices.is_empty() {
        send_quote(
            &inner.pool,
            &inner.keys,
            &attrs,
            &prompt.author,
            &prompt.id,
            &QuotePayload::Error {
                error: "Unable to issue an invoice".into(),
            },
        )
        .await;
        return;
    }

    // Subscribe before the quote goes out; proofs are ephemeral events.
    let since = Timestamp::from(
        Timestamp::now()
            .as_u64()
            .saturating_sub(EVENT_FRESHNESS_WINDOW.as_secs()),
    );
    let proof_filter = Filter::new()
        .kind(Kind::Custom(kind::PROOF))
        .author(prompt.author)
        .event(prompt.id)
        .pubkey(inner.keys.public_key())
        .since(since);
    let mut proof_sub = inner.pool.subscribe(proof_filter, &attrs.prompt_relays).await;

    send_quote(
        &inner.pool,
        &inner.keys,
        &attrs,
        &prompt.author,
        &prompt.id,
        &QuotePayload::Invoices {
            invoices: invoices.clone(),
        },
    )
    .await;

    let proof_event = match tokio::time::timeout(PROOF_TIMEOUT, proof_sub.recv()).await {
        Ok(Some(event)) => event,
        _ => {
            debug!(prompt_id = %prompt.id, "no proof within the window, session released");
            proof_sub.close().await;
            return;
        }
    };
    proof_sub.close().await;

    let proof_body = match open_string(&proof_event.content, &prompt.author, &inner.keys) {
        Ok(body) => body,
        Err(e) => {
            debug!(prompt_id = %prompt.id, error = %e, "undecryptable proof, session released");
            return;
        }
    };
    let proof: ProofPayload = match serde_json::from_str(&proof_body) {
        Ok(proof) => proof,
        Err(e) => {
            debug!(prompt_id = %prompt.id, error = %e, "malformed proof, session released");
            return;
        }
    };

    match proof {
        ProofPayload::Error { error } => {
            debug!(prompt_id = %prompt.id, %error, "client aborted, session released");
            return;
        }
        ProofPayload::Payment { method, preimage } => {
            let Some(record) = invoices.iter().find(|r| r.method == method) else {
                send_error_reply(&inner, &attrs, &prompt, "No invoice for the proof method").await;
                return;
            };
            let settled = match inner.wallet.verify_payment(&record.invoice, &preimage).await {
                Ok(settled) => settled,
                Err(e) => {
                    // The wallet is unreachable; the hash check needs no
                    // counterparty.
                    warn!(error = %e, "wallet verification failed, checking locally");
                    verify_preimage(&record.invoice, &preimage).unwrap_or(false)
                }
            };
            if !settled {
                send_error_reply(&inner, &attrs, &prompt, "Payment verification failed").await;
                return;
            }
        }
    }
    info!(prompt_id = %prompt.id, "payment verified");

    let reply = match inner.handler.on_prompt_paid(&prompt).await {
        Ok(reply) => reply,
        Err(reason) => {
            send_error_reply(&inner, &attrs, &prompt, &reason).await;
            return;
        }
    };

    match reply {
        ExpertReply::Inline(value) => {
            let body = ReplyPayload::Content {
                payload: value.clone(),
                done: true,
            }
            .to_json();
            if body.len() <= MAX_EVENT_CONTENT_BYTES {
                send_inline_reply(&inner, &attrs, &prompt, &body).await;
                return;
            }
            if !client_streams {
                send_error_reply(
                    &inner,
                    &attrs,
                    &prompt,
                    "Reply requires streaming but the prompt does not accept it",
                )
                .await;
                return;
            }
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let chunks = futures::stream::iter([text.into_bytes()]).boxed();
            stream_reply(&inner, &attrs, &prompt, false, chunks).await;
        }
        ExpertReply::Streamed { binary, chunks } => {
            if !client_streams {
                send_error_reply(
                    &inner,
                    &attrs,
                    &prompt,
                    "Reply requires streaming but the prompt does not accept it",
                )
                .await;
                return;
            }
            stream_reply(&inner, &attrs, &prompt, binary, chunks).await;
        }
    }
}

/// Decrypts the prompt body, draining its stream when it has one, and
/// decodes the payload. Errors are peer-facing reasons for an error-quote.
async fn ingest_prompt<R, W, H>(
    inner: &Arc<ExpertInner<R, W, H>>,
    attrs: &ExpertAttributes,
    event: &Event,
) -> Result<PromptRequest, String>
where
    R: Relay,
    W: LightningWallet,
    H: ExpertHandler,
{
    let serialized = if let Some(cipher) = first_tag_value(event, tag::STREAM) {
        if !attrs.stream_supported {
            return Err("Streaming prompts are not supported".into());
        }
        let metadata = decode_stream_metadata(cipher, &event.pubkey, inner)?;
        let reader = StreamReader::open(
            &inner.pool,
            &metadata,
            Some(inner.keys.clone()),
            StreamReaderConfig::default(),
        )
        .await
        .map_err(|e| format!("Prompt stream failed: {e}"))?;
        match reader
            .read_to_end()
            .await
            .map_err(|e| format!("Prompt stream failed: {e}"))?
        {
            Payload::Text(text) => text,
            Payload::Binary(bytes) => {
                String::from_utf8(bytes).map_err(|_| "Prompt payload is not UTF-8".to_string())?
            }
        }
    } else {
        let bytes = open(&event.content, &event.pubkey, &inner.keys)
            .map_err(|_| "Unable to decrypt prompt".to_string())?;
        // Legacy single-event compression: accepted on ingest, never emitted.
        match first_tag_value(event, tag::COMPRESSION) {
            Some("gzip") => {
                let decoded = decompress_all(
                    &bytes,
                    CompressionMethod::Gzip,
                    false,
                    Some(LEGACY_DECOMPRESS_CAP),
                )
                .map_err(|e| format!("Prompt decompression failed: {e}"))?;
                match decoded {
                    Payload::Text(text) => text,
                    Payload::Binary(bytes) => String::from_utf8(bytes)
                        .map_err(|_| "Prompt payload is not UTF-8".to_string())?,
                }
            }
            _ => String::from_utf8(bytes.to_vec())
                .map_err(|_| "Prompt payload is not UTF-8".to_string())?,
        }
    };

    let payload: sensei_types::payload::PromptPayload = serde_json::from_str(&serialized)
        .map_err(|_| "Unsupported prompt payload".to_string())?;
    if !attrs.formats.contains(&payload.format) {
        return Err(format!("Unsupported format: {}", payload.format));
    }
    Ok(PromptRequest {
        id: event.id,
        author: event.pubkey,
        format: payload.format,
        payload: payload.payload,
    })
}

/// The stream tag crosses a trust boundary: the embedded metadata event is
/// signature-validated and must be authored by the prompt key.
fn decode_stream_metadata<R, W, H>(
    cipher: &str,
    author: &PublicKey,
    inner: &Arc<ExpertInner<R, W, H>>,
) -> Result<StreamMetadata, String>
where
    R: Relay,
    W: LightningWallet,
    H: ExpertHandler,
{
    let serialized = open_string(cipher, author, &inner.keys)
        .map_err(|_| "Unable to decrypt stream metadata".to_string())?;
    let meta_event =
        parse_event(&serialized).map_err(|_| "Malformed stream metadata".to_string())?;
    if !validate_event(&meta_event) {
        return Err("Invalid stream metadata signature".into());
    }
    if kind_of(&meta_event) != kind::STREAM_METADATA {
        return Err("Stream tag does not carry stream metadata".into());
    }
    if meta_event.pubkey != *author {
        return Err("Stream metadata not authored by the prompt key".into());
    }
    let metadata: StreamMetadata = serde_json::from_str(&meta_event.content)
        .map_err(|_| "Malformed stream metadata".to_string())?;
    if metadata.encryption == EncryptionScheme::Nip44 {
        // Chunk decryption below uses our long-term key; anything else in
        // the metadata would dead-end.
        metadata.validate().map_err(|e| e.to_string())?;
    }
    Ok(metadata)
}

/// Best-effort quote delivery; a failed publish already means the exchange
/// is dead, so it is logged and the session ends.
async fn send_quote<R: Relay>(
    pool: &RelayPool<R>,
    keys: &sensei_crypto::Keyring,
    attrs: &ExpertAttributes,
    author: &PublicKey,
    prompt_id: &EventId,
    payload: &QuotePayload,
) {
    let body = match serde_json::to_string(payload) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "quote serialization failed");
            return;
        }
    };
    let result = seal(body.as_bytes(), author, keys)
        .map_err(ProtocolError::Crypto)
        .and_then(|cipher| {
            sign_event(
                kind::QUOTE,
                cipher,
                vec![pubkey_ref_tag(author), event_ref_tag(prompt_id)],
                keys,
            )
            .map_err(ProtocolError::Crypto)
        });
    match result {
        Ok(event) => {
            if let Err(e) = pool.publish(&event, &attrs.prompt_relays, PUBLISH_TIMEOUT).await {
                warn!(prompt_id = %prompt_id, error = %e, "quote publish failed");
            }
        }
        Err(e) => warn!(prompt_id = %prompt_id, error = %e, "quote construction failed"),
    }
}

async fn send_inline_reply<R, W, H>(
    inner: &Arc<ExpertInner<R, W, H>>,
    attrs: &ExpertAttributes,
    prompt: &PromptRequest,
    body: &str,
) where
    R: Relay,
    W: LightningWallet,
    H: ExpertHandler,
{
    let result = seal(body.as_bytes(), &prompt.author, &inner.keys)
        .map_err(ProtocolError::Crypto)
        .and_then(|cipher| {
            sign_event(
                kind::REPLY,
                cipher,
                vec![pubkey_ref_tag(&prompt.author), event_ref_tag(&prompt.id)],
                &inner.keys,
            )
            .map_err(ProtocolError::Crypto)
        });
    match result {
        Ok(event) => {
            match inner
                .pool
                .publish(&event, &attrs.prompt_relays, PUBLISH_TIMEOUT)
                .await
            {
                Ok(_) => info!(prompt_id = %prompt.id, "reply published"),
                Err(e) => warn!(prompt_id = %prompt.id, error = %e, "reply publish failed"),
            }
        }
        Err(e) => warn!(prompt_id = %prompt.id, error = %e, "reply construction failed"),
    }
}

/// An error-reply is never skipped after payment verification; the client
/// must not wait out the full timeout.
async fn send_error_reply<R, W, H>(
    inner: &Arc<ExpertInner<R, W, H>>,
    attrs: &ExpertAttributes,
    prompt: &PromptRequest,
    reason: &str,
) where
    R: Relay,
    W: LightningWallet,
    H: ExpertHandler,
{
    let body = ReplyPayload::Error {
        error: reason.to_string(),
    }
    .to_json();
    send_inline_reply(inner, attrs, prompt, &body).await;
}

/// Publishes a stream-tagged reply event, then writes the chunk sequence.
/// A mid-stream failure terminates the stream with an error chunk.
async fn stream_reply<R, W, H>(
    inner: &Arc<ExpertInner<R, W, H>>,
    attrs: &ExpertAttributes,
    prompt: &PromptRequest,
    binary: bool,
    mut chunks: BoxStream<'static, Vec<u8>>,
) where
    R: Relay,
    W: LightningWallet,
    H: ExpertHandler,
{
    let stream_keys = sensei_crypto::Keyring::generate();
    let metadata = StreamMetadata::new(
        stream_keys.public_key(),
        attrs.prompt_relays.clone(),
        EncryptionScheme::Nip44,
        CompressionMethod::Gzip,
        binary,
    );
    let meta_json = match serde_json::to_string(&metadata) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "stream metadata serialization failed");
            send_error_reply(inner, attrs, prompt, "Reply pipeline failed").await;
            return;
        }
    };

    let announced = async {
        let meta_event = sign_event(kind::STREAM_METADATA, meta_json, vec![], &inner.keys)?;
        let cipher = seal(meta_event.as_json().as_bytes(), &prompt.author, &inner.keys)?;
        let reply = sign_event(
            kind::REPLY,
            "",
            vec![
                pubkey_ref_tag(&prompt.author),
                event_ref_tag(&prompt.id),
                custom_tag(tag::STREAM, cipher),
            ],
            &inner.keys,
        )?;
        Ok::<Event, sensei_types::error::CryptoError>(reply)
    }
    .await;
    let reply = match announced {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "stream reply construction failed");
            send_error_reply(inner, attrs, prompt, "Reply pipeline failed").await;
            return;
        }
    };
    if let Err(e) = inner
        .pool
        .publish(&reply, &attrs.prompt_relays, PUBLISH_TIMEOUT)
        .await
    {
        warn!(prompt_id = %prompt.id, error = %e, "stream reply publish failed");
        return;
    }

    let mut writer = match StreamWriter::new(
        inner.pool.clone(),
        metadata,
        stream_keys,
        Some(prompt.author),
        StreamWriterConfig::default(),
    ) {
        Ok(writer) => writer,
        Err(e) => {
            warn!(error = %e, "stream writer construction failed");
            return;
        }
    };
    while let Some(chunk) = chunks.next().await {
        if let Err(e) = writer.write(&chunk, false).await {
            warn!(prompt_id = %prompt.id, error = %e, "stream write failed");
            if let Err(e) = writer.error("reply", "reply pipeline failed").await {
                warn!(error = %e, "stream error chunk not delivered");
            }
            return;
        }
    }
    if let Err(e) = writer.write(&[], true).await {
        warn!(prompt_id = %prompt.id, error = %e, "stream close failed");
        return;
    }
    info!(prompt_id = %prompt.id, "streamed reply finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventId, Keys};

    fn sample_attrs() -> ExpertAttributes {
        ExpertAttributes {
            name: None,
            picture: None,
            description: String::new(),
            hashtags: vec!["a".into()],
            formats: vec![Format::Text, Format::Openai],
            methods: vec![PaymentMethod::Lightning],
            stream_supported: true,
            prompt_relays: vec!["wss://prompt".into()],
            discovery_relays: vec!["wss://discovery".into()],
        }
    }

    fn sample_ask(formats: Vec<Format>, stream: bool) -> Ask {
        Ask {
            id: EventId::all_zeros(),
            author: Keys::generate().public_key(),
            summary: "Hi?".into(),
            hashtags: vec!["a".into()],
            formats,
            stream,
            methods: vec![],
            created_at: Timestamp::now(),
        }
    }

    fn values(tags: &[nostr::Tag], name: &str) -> Vec<String> {
        tags.iter()
            .filter_map(|t| {
                let s = t.as_slice();
                (s.first().map(String::as_str) == Some(name))
                    .then(|| s.get(1).cloned())
                    .flatten()
            })
            .collect()
    }

    #[test]
    fn bid_tags_intersect_the_requested_formats() {
        let tags = bid_payload_tags(&sample_attrs(), &sample_ask(vec![Format::Openai], true));
        assert_eq!(values(&tags, tag::FORMAT), vec!["openai"]);
        assert_eq!(values(&tags, tag::STREAM_FLAG), vec!["true"]);
        assert_eq!(values(&tags, tag::RELAY), vec!["wss://prompt"]);
    }

    #[test]
    fn bid_tags_advertise_everything_when_the_ask_is_unconstrained() {
        let tags = bid_payload_tags(&sample_attrs(), &sample_ask(vec![], false));
        assert_eq!(values(&tags, tag::FORMAT), vec!["text", "openai"]);
        // The asker did not advertise streaming, so neither does the bid.
        assert!(values(&tags, tag::STREAM_FLAG).is_empty());
        assert_eq!(values(&tags, tag::METHOD), vec!["lightning"]);
    }
}
