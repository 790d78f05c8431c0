// Path: crates/client/src/client.rs
//! The client façade.

use crate::handlers::QuoteHandler;
use crate::replies::Replies;
use nostr::{Event, Filter, JsonUtil, Kind, PublicKey, Tag, Timestamp};
use sensei_api::relay::Relay;
use sensei_crypto::{open_string, parse_event, seal, sign_event, validate_event, Keyring};
use sensei_payment::{error_proof, validate_quote};
use sensei_relay::RelayPool;
use sensei_stream::StreamWriter;
use sensei_types::config::{
    StreamReaderConfig, StreamWriterConfig, DISCOVERY_TIMEOUT, PROFILE_FETCH_TIMEOUT,
    PUBLISH_TIMEOUT, QUOTE_TIMEOUT,
};
use sensei_types::error::ProtocolError;
use sensei_types::event::{custom_tag, event_ref_tag, kind, kind_of, pubkey_ref_tag, tag};
use sensei_types::model::{CompressionMethod, EncryptionScheme, Format, PaymentMethod};
use sensei_types::payload::{ProofPayload, PromptPayload, QuotePayload};
use sensei_types::profile::{Bid, ExpertProfile, PromptTarget};
use sensei_types::stream::StreamMetadata;
use sensei_types::MAX_EVENT_CONTENT_BYTES;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters for [`Client::find_experts`].
#[derive(Debug, Clone)]
pub struct FindExpertsParams {
    /// Public, anonymized summary of the question. Required.
    pub summary: String,
    /// Topics to broadcast under. At least one is required.
    pub hashtags: Vec<String>,
    /// Formats the client can produce. Defaults to `text`.
    pub formats: Vec<Format>,
    /// Whether the client accepts streamed replies.
    pub stream: bool,
    /// Payment methods the client can pay over. Defaults to `lightning`.
    pub methods: Vec<PaymentMethod>,
    /// Discovery relays to use instead of the client's defaults.
    pub relays: Option<Vec<String>>,
    /// Bid collection window. Defaults to 10 s.
    pub timeout: Option<Duration>,
}

impl FindExpertsParams {
    /// Minimal parameters: a summary and one or more hashtags.
    pub fn new(summary: impl Into<String>, hashtags: Vec<String>) -> Self {
        Self {
            summary: summary.into(),
            hashtags,
            formats: vec![Format::Text],
            stream: true,
            methods: vec![PaymentMethod::Lightning],
            relays: None,
            timeout: None,
        }
    }
}

/// Parameters for [`Client::ask_expert`].
#[derive(Debug, Clone)]
pub struct AskParams {
    /// The expert to address, from a bid or a fetched profile.
    pub target: PromptTarget,
    /// The question payload; a string for `text`, an object for `openai`.
    pub content: Value,
    /// Desired format. Defaults to the first format the target supports.
    pub format: Option<Format>,
    /// Force or forbid the streamed prompt path. Default: stream when the
    /// payload demands it or the target supports it.
    pub stream: Option<bool>,
}

/// The client protocol state machine.
///
/// One `Client` may drive many concurrent exchanges; each exchange is scoped
/// to its own ephemeral keys and owns every subscription and stream it
/// opens. The relay pool is shared and disposed only by its creator.
pub struct Client<R: Relay> {
    pool: RelayPool<R>,
    discovery_relays: Vec<String>,
}

impl<R: Relay> Client<R> {
    /// Creates a client over a shared pool and a default discovery relay
    /// set.
    pub fn new(pool: RelayPool<R>, discovery_relays: Vec<String>) -> Self {
        Self {
            pool,
            discovery_relays,
        }
    }

    /// Broadcasts an anonymous ask and collects authenticated bids for the
    /// discovery window. At most one bid per distinct expert key is
    /// accepted; the first wins.
    pub async fn find_experts(
        &self,
        params: FindExpertsParams,
    ) -> Result<Vec<Bid>, ProtocolError> {
        if params.summary.trim().is_empty() {
            return Err(ProtocolError::Argument("summary must not be empty".into()));
        }
        if params.hashtags.is_empty() {
            return Err(ProtocolError::Argument(
                "at least one hashtag is required".into(),
            ));
        }
        let relays = params.relays.unwrap_or_else(|| self.discovery_relays.clone());
        let window = params.timeout.unwrap_or(DISCOVERY_TIMEOUT);

        let ask_keys = Keyring::generate();
        let mut tags: Vec<Tag> = params
            .hashtags
            .iter()
            .map(|t| Tag::hashtag(t.clone()))
            .collect();
        for format in &params.formats {
            tags.push(custom_tag(tag::FORMAT, format.as_str()));
        }
        if params.stream {
            tags.push(custom_tag(tag::STREAM_FLAG, "true"));
        }
        for method in &params.methods {
            tags.push(custom_tag(tag::METHOD, method.as_str()));
        }
        let ask = sign_event(kind::ASK, params.summary.clone(), tags, &ask_keys)?;

        // Subscribe before publishing: bid envelopes are ephemeral events.
        let filter = Filter::new()
            .kind(Kind::Custom(kind::BID_ENVELOPE))
            .event(ask.id);
        let mut subscription = self.pool.subscribe(filter, &relays).await;

        let accepted = self.pool.publish(&ask, &relays, PUBLISH_TIMEOUT).await?;
        info!(ask_id = %ask.id, relays = accepted.len(), "ask published");

        let mut bids = Vec::new();
        let mut seen_experts: HashSet<PublicKey> = HashSet::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(envelope)) =
            tokio::time::timeout_at(deadline, subscription.recv()).await
        {
            match decode_bid(&envelope, &ask.id, &ask_keys) {
                Ok(bid) => {
                    if seen_experts.insert(bid.expert_pubkey) {
                        bids.push(bid);
                    } else {
                        debug!(expert = %bid.expert_pubkey, "duplicate bid dropped");
                    }
                }
                Err(e) => debug!(envelope_id = %envelope.id, error = %e, "bid dropped"),
            }
        }
        subscription.close().await;
        Ok(bids)
    }

    /// One-shot historic fetch of expert profiles from the prior day,
    /// keeping the latest profile per key.
    pub async fn fetch_experts(
        &self,
        pubkeys: &[PublicKey],
        relays: Option<&[String]>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ExpertProfile>, ProtocolError> {
        if pubkeys.is_empty() {
            return Err(ProtocolError::Argument("no expert keys given".into()));
        }
        let relays = relays.map(<[String]>::to_vec).unwrap_or_else(|| self.discovery_relays.clone());
        let since = Timestamp::from(Timestamp::now().as_u64().saturating_sub(24 * 60 * 60));
        let filter = Filter::new()
            .kind(Kind::Custom(kind::EXPERT_PROFILE))
            .authors(pubkeys.iter().copied())
            .since(since);
        let events = self
            .pool
            .fetch(filter, &relays, timeout.unwrap_or(PROFILE_FETCH_TIMEOUT))
            .await;

        let mut latest: HashMap<PublicKey, Event> = HashMap::new();
        for event in events {
            let newer = latest
                .get(&event.pubkey)
                .map_or(true, |existing| existing.created_at < event.created_at);
            if newer {
                latest.insert(event.pubkey, event);
            }
        }
        Ok(latest
            .values()
            .filter_map(|event| match ExpertProfile::from_event(event) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    debug!(event_id = %event.id, error = %e, "profile dropped");
                    None
                }
            })
            .collect())
    }

    /// Runs one full exchange against an expert and returns the reply
    /// sequence. The handler decides whether to pay; rejection or failure
    /// sends an error proof so the expert releases state immediately.
    pub async fn ask_expert<H: QuoteHandler>(
        &self,
        params: AskParams,
        handler: &H,
    ) -> Result<Replies<R>, ProtocolError> {
        let target = params.target;
        if target.relays.is_empty() {
            return Err(ProtocolError::Argument(
                "target advertises no prompt relays".into(),
            ));
        }
        let format = match params.format {
            Some(format) if target.formats.contains(&format) => format,
            Some(format) => {
                return Err(ProtocolError::Argument(format!(
                    "target does not support the {format} format"
                )))
            }
            None => *target
                .formats
                .first()
                .ok_or_else(|| ProtocolError::Argument("target advertises no formats".into()))?,
        };

        let prompt_payload = PromptPayload {
            format,
            payload: params.content,
        };
        let serialized = serde_json::to_string(&prompt_payload)
            .map_err(|e| ProtocolError::Argument(format!("unserializable content: {e}")))?;
        let needs_stream = serialized.len() > MAX_EVENT_CONTENT_BYTES;
        if needs_stream && !target.stream_supported {
            return Err(ProtocolError::StreamUnsupported);
        }
        let use_stream = match params.stream {
            Some(false) if needs_stream => return Err(ProtocolError::StreamUnsupported),
            Some(explicit) => explicit,
            None => needs_stream || target.stream_supported,
        };

        let prompt_keys = Keyring::generate();
        let (prompt, stream_plan) = if use_stream {
            let stream_keys = Keyring::generate();
            let metadata = StreamMetadata::new(
                stream_keys.public_key(),
                target.relays.clone(),
                EncryptionScheme::Nip44,
                CompressionMethod::Gzip,
                false,
            );
            let meta_json = serde_json::to_string(&metadata)
                .map_err(|e| ProtocolError::Argument(format!("metadata: {e}")))?;
            let meta_event =
                sign_event(kind::STREAM_METADATA, meta_json, vec![], &prompt_keys)?;
            let cipher = seal(meta_event.as_json().as_bytes(), &target.pubkey, &prompt_keys)?;
            let prompt = sign_event(
                kind::PROMPT,
                "",
                vec![
                    pubkey_ref_tag(&target.pubkey),
                    custom_tag(tag::STREAM_FLAG, "true"),
                    custom_tag(tag::STREAM, cipher),
                ],
                &prompt_keys,
            )?;
            (prompt, Some((metadata, stream_keys)))
        } else {
            let cipher = seal(serialized.as_bytes(), &target.pubkey, &prompt_keys)?;
            let prompt = sign_event(
                kind::PROMPT,
                cipher,
                vec![
                    pubkey_ref_tag(&target.pubkey),
                    custom_tag(tag::STREAM_FLAG, "true"),
                ],
                &prompt_keys,
            )?;
            (prompt, None)
        };

        // Subscribe for the quote before anything is published.
        let quote_filter = Filter::new()
            .kind(Kind::Custom(kind::QUOTE))
            .author(target.pubkey)
            .event(prompt.id);
        let mut quote_sub = self.pool.subscribe(quote_filter, &target.relays).await;

        self.pool
            .publish(&prompt, &target.relays, PUBLISH_TIMEOUT)
            .await?;
        info!(prompt_id = %prompt.id, streamed = use_stream, "prompt published");

        if let Some((metadata, stream_keys)) = stream_plan {
            let mut writer = StreamWriter::new(
                self.pool.clone(),
                metadata,
                stream_keys,
                Some(target.pubkey),
                StreamWriterConfig::default(),
            )
            .map_err(ProtocolError::Stream)?;
            writer
                .write(serialized.as_bytes(), true)
                .await
                .map_err(ProtocolError::Stream)?;
        }

        let quote_event = tokio::time::timeout(QUOTE_TIMEOUT, quote_sub.recv())
            .await
            .ok()
            .flatten();
        quote_sub.close().await;
        let quote_event = quote_event.ok_or(ProtocolError::Timeout("quote"))?;

        let quote_body = open_string(&quote_event.content, &target.pubkey, &prompt_keys)?;
        let quote: QuotePayload = serde_json::from_str(&quote_body)
            .map_err(|e| ProtocolError::InvalidEvent(format!("malformed quote: {e}")))?;
        let invoices = match quote {
            QuotePayload::Error { error } => return Err(ProtocolError::Expert(error)),
            QuotePayload::Invoices { invoices } => invoices,
        };

        if let Err(e) = validate_quote(&invoices) {
            self.send_proof(&target, &prompt_keys, &prompt.id, error_proof(e.to_string()))
                .await;
            return Err(e.into());
        }
        match handler.on_quote(&invoices, &prompt.id).await {
            Ok(true) => {}
            Ok(false) => {
                self.send_proof(
                    &target,
                    &prompt_keys,
                    &prompt.id,
                    error_proof("Payment rejected by client"),
                )
                .await;
                return Err(ProtocolError::Payment(
                    sensei_types::error::PaymentError::Rejected(
                        "Payment rejected by client".into(),
                    ),
                ));
            }
            Err(e) => {
                self.send_proof(&target, &prompt_keys, &prompt.id, error_proof(e.to_string()))
                    .await;
                return Err(e);
            }
        }
        let proof = match handler.on_pay(&invoices, &prompt.id).await {
            Ok(proof) => proof,
            Err(e) => {
                self.send_proof(&target, &prompt_keys, &prompt.id, error_proof(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        // Subscribe for the reply before the proof goes out.
        let reply_filter = Filter::new()
            .kind(Kind::Custom(kind::REPLY))
            .author(target.pubkey)
            .event(prompt.id);
        let reply_sub = self.pool.subscribe(reply_filter, &target.relays).await;

        self.publish_proof(&target, &prompt_keys, &prompt.id, proof)
            .await?;

        Ok(Replies::new(
            self.pool.clone(),
            target.pubkey,
            prompt_keys,
            StreamReaderConfig::default(),
            reply_sub,
        ))
    }

    /// Best-effort error proof; failures are logged, the exchange is already
    /// over.
    async fn send_proof(
        &self,
        target: &PromptTarget,
        prompt_keys: &Keyring,
        prompt_id: &nostr::EventId,
        proof: ProofPayload,
    ) {
        if let Err(e) = self.publish_proof(target, prompt_keys, prompt_id, proof).await {
            warn!(error = %e, "error proof not delivered");
        }
    }

    async fn publish_proof(
        &self,
        target: &PromptTarget,
        prompt_keys: &Keyring,
        prompt_id: &nostr::EventId,
        proof: ProofPayload,
    ) -> Result<(), ProtocolError> {
        let body = serde_json::to_string(&proof)
            .map_err(|e| ProtocolError::Argument(format!("proof: {e}")))?;
        let cipher = seal(body.as_bytes(), &target.pubkey, prompt_keys)?;
        let event = sign_event(
            kind::PROOF,
            cipher,
            vec![pubkey_ref_tag(&target.pubkey), event_ref_tag(prompt_id)],
            prompt_keys,
        )?;
        self.pool
            .publish(&event, &target.relays, PUBLISH_TIMEOUT)
            .await?;
        Ok(())
    }
}

/// Decrypts a bid envelope, validates the embedded payload event, and
/// decodes the bid. Any failure drops the envelope without failing
/// discovery; signature failure on the embedded payload is the one fatal
/// trust-boundary violation, surfaced as `InvalidEvent` to the logs.
fn decode_bid(
    envelope: &Event,
    ask_id: &nostr::EventId,
    ask_keys: &Keyring,
) -> Result<Bid, ProtocolError> {
    if kind_of(envelope) != kind::BID_ENVELOPE {
        return Err(ProtocolError::InvalidEvent("not a bid envelope".into()));
    }
    let serialized = open_string(&envelope.content, &envelope.pubkey, ask_keys)?;
    let payload_event = parse_event(&serialized)?;
    if !validate_event(&payload_event) {
        return Err(ProtocolError::InvalidEvent(
            "bid payload signature invalid".into(),
        ));
    }
    Bid::from_payload_event(*ask_id, &payload_event)
}
