// Path: crates/client/tests/exchange.rs
//! Full-protocol scenarios over the in-memory relay network: discovery,
//! pricing, payment, and reply delivery on both the inline and streamed
//! paths.

use async_trait::async_trait;
use nostr::{EventId, JsonUtil};
use sensei_client::{
    AskParams, Client, FindExpertsParams, PayingQuoteHandler, QuoteHandler, ReplyContent,
    ReplyItem,
};
use sensei_crypto::{seal, sign_event, Keyring};
use sensei_expert::{Expert, ExpertAttributes, ExpertHandler, ExpertReply, Pricing, PromptRequest};
use sensei_payment::PaymentPolicy;
use sensei_relay::RelayPool;
use sensei_test_utils::{MemoryRelay, MemoryRelayNetwork, MockWallet, PaymentLedger};
use sensei_types::error::{PaymentError, ProtocolError};
use sensei_types::event::{custom_tag, event_ref_tag, kind, kind_of, tag};
use sensei_types::model::Format;
use sensei_types::payload::{InvoiceRecord, ProofPayload};
use sensei_types::profile::{Ask, PromptTarget};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const DISCOVERY: &str = "wss://discovery.mem";
const PROMPT_RELAY: &str = "wss://prompt.mem";

fn build_pool(network: &MemoryRelayNetwork) -> RelayPool<MemoryRelay> {
    let pool = RelayPool::new();
    pool.add_relay(network.relay(DISCOVERY));
    pool.add_relay(network.relay(PROMPT_RELAY));
    pool
}

fn attrs(hashtags: &[&str]) -> ExpertAttributes {
    ExpertAttributes {
        name: Some("sage".into()),
        picture: None,
        description: "I answer things".into(),
        hashtags: hashtags.iter().map(|s| s.to_string()).collect(),
        formats: vec![Format::Text],
        methods: vec![sensei_types::model::PaymentMethod::Lightning],
        stream_supported: true,
        prompt_relays: vec![PROMPT_RELAY.to_string()],
        discovery_relays: vec![DISCOVERY.to_string()],
    }
}

struct ScriptedHandler {
    offer: String,
    price: u64,
    reply: Value,
}

#[async_trait]
impl ExpertHandler for ScriptedHandler {
    async fn on_ask(&self, _ask: &Ask) -> Option<String> {
        Some(self.offer.clone())
    }

    async fn on_prompt_price(&self, _prompt: &PromptRequest) -> Result<Pricing, String> {
        Ok(Pricing {
            amount_sats: self.price,
            description: "answer".into(),
        })
    }

    async fn on_prompt_paid(&self, _prompt: &PromptRequest) -> Result<ExpertReply, String> {
        Ok(ExpertReply::Inline(self.reply.clone()))
    }
}

/// A wallet that encodes double the requested amount into its invoices,
/// modelling a mispriced quote.
struct InflatingWallet(MockWallet);

#[async_trait]
impl sensei_api::LightningWallet for InflatingWallet {
    async fn create_invoice(
        &self,
        amount_sats: u64,
        description: &str,
        expiry: Duration,
    ) -> Result<String, PaymentError> {
        self.0.create_invoice(amount_sats * 2, description, expiry).await
    }

    async fn pay_invoice(&self, bolt11: &str) -> Result<String, PaymentError> {
        self.0.pay_invoice(bolt11).await
    }

    async fn verify_payment(&self, bolt11: &str, preimage: &str) -> Result<bool, PaymentError> {
        self.0.verify_payment(bolt11, preimage).await
    }
}

async fn start_expert<W>(
    pool: RelayPool<MemoryRelay>,
    keys: Keyring,
    wallet: Arc<W>,
    handler: Arc<ScriptedHandler>,
    hashtags: &[&str],
) -> watch::Sender<bool>
where
    W: sensei_api::LightningWallet + 'static,
{
    let expert = Arc::new(Expert::new(pool, keys, wallet, handler, attrs(hashtags)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = expert.run(shutdown_rx).await;
    });
    shutdown_tx
}

/// The expert is ready once its profile landed; its subscriptions open
/// immediately after.
async fn wait_for_expert(network: &MemoryRelayNetwork) {
    for _ in 0..100 {
        if network
            .stored(DISCOVERY)
            .iter()
            .any(|e| kind_of(e) == kind::EXPERT_PROFILE)
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expert never published its profile");
}

fn stored_kinds(network: &MemoryRelayNetwork, url: &str) -> Vec<u16> {
    network.stored(url).iter().map(kind_of).collect()
}

fn discovery_params(summary: &str, hashtag: &str, window_ms: u64) -> FindExpertsParams {
    FindExpertsParams {
        timeout: Some(Duration::from_millis(window_ms)),
        ..FindExpertsParams::new(summary, vec![hashtag.to_string()])
    }
}

#[tokio::test]
async fn small_payload_happy_path() {
    let network = MemoryRelayNetwork::new();
    let pool = build_pool(&network);
    let ledger = PaymentLedger::new();
    let _shutdown = start_expert(
        pool.clone(),
        Keyring::generate(),
        Arc::new(MockWallet::new(ledger.clone())),
        Arc::new(ScriptedHandler {
            offer: "I know this one".into(),
            price: 10,
            reply: json!("pong"),
        }),
        &["demo"],
    )
    .await;
    wait_for_expert(&network).await;

    let client = Client::new(pool.clone(), vec![DISCOVERY.to_string()]);
    let bids = client
        .find_experts(discovery_params("Hi?", "demo", 1500))
        .await
        .unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].offer, "I know this one");

    let handler = PayingQuoteHandler::new(
        Arc::new(MockWallet::new(ledger)),
        PaymentPolicy {
            max_amount_sats: 100,
        },
    );
    let mut replies = client
        .ask_expert(
            AskParams {
                target: PromptTarget::from(&bids[0]),
                content: json!("ping"),
                format: None,
                stream: Some(false),
            },
            &handler,
        )
        .await
        .unwrap();

    let item = replies.next().await.unwrap().unwrap();
    assert_eq!(
        item,
        ReplyItem {
            content: ReplyContent::Json(json!("pong")),
            done: true
        }
    );
    assert!(replies.next().await.is_none());
}

#[tokio::test]
async fn amount_mismatch_is_rejected_and_the_expert_is_notified() {
    let network = MemoryRelayNetwork::new();
    let pool = build_pool(&network);
    let ledger = PaymentLedger::new();
    let _shutdown = start_expert(
        pool.clone(),
        Keyring::generate(),
        Arc::new(InflatingWallet(MockWallet::new(ledger.clone()))),
        Arc::new(ScriptedHandler {
            offer: "offer".into(),
            price: 10,
            reply: json!("never sent"),
        }),
        &["demo"],
    )
    .await;
    wait_for_expert(&network).await;

    let client = Client::new(pool.clone(), vec![DISCOVERY.to_string()]);
    let bids = client
        .find_experts(discovery_params("Hi?", "demo", 1500))
        .await
        .unwrap();
    let handler = PayingQuoteHandler::new(
        Arc::new(MockWallet::new(ledger)),
        PaymentPolicy {
            max_amount_sats: 100,
        },
    );
    let err = client
        .ask_expert(
            AskParams {
                target: PromptTarget::from(&bids[0]),
                content: json!("ping"),
                format: None,
                stream: Some(false),
            },
            &handler,
        )
        .await
        .unwrap_err();
    match err {
        ProtocolError::Payment(PaymentError::Rejected(message)) => assert_eq!(
            message,
            "Invoice amount mismatch: expected 10 sats, but invoice contains 20 sats"
        ),
        other => panic!("expected rejection, got {other:?}"),
    }

    // The expert was told immediately via an error proof, and never replied.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let kinds = stored_kinds(&network, PROMPT_RELAY);
    assert!(kinds.contains(&kind::PROOF));
    assert!(!kinds.contains(&kind::REPLY));
}

#[tokio::test]
async fn oversized_reply_streams_back_bit_exact() {
    let big_text: String = "abcdefgh".repeat(10_000); // 80 000 bytes
    let network = MemoryRelayNetwork::new();
    let pool = build_pool(&network);
    let ledger = PaymentLedger::new();
    let _shutdown = start_expert(
        pool.clone(),
        Keyring::generate(),
        Arc::new(MockWallet::new(ledger.clone())),
        Arc::new(ScriptedHandler {
            offer: "offer".into(),
            price: 10,
            reply: json!(big_text.clone()),
        }),
        &["demo"],
    )
    .await;
    wait_for_expert(&network).await;

    let client = Client::new(pool.clone(), vec![DISCOVERY.to_string()]);
    let bids = client
        .find_experts(discovery_params("Hi?", "demo", 1500))
        .await
        .unwrap();
    let handler = PayingQuoteHandler::new(
        Arc::new(MockWallet::new(ledger)),
        PaymentPolicy {
            max_amount_sats: 100,
        },
    );
    let mut replies = client
        .ask_expert(
            AskParams {
                target: PromptTarget::from(&bids[0]),
                content: json!("ping"),
                format: None,
                stream: Some(false),
            },
            &handler,
        )
        .await
        .unwrap();

    let mut collected = String::new();
    let mut saw_done = false;
    while let Some(item) = replies.next().await {
        let item = item.unwrap();
        match item.content {
            ReplyContent::Text(text) => {
                assert!(!item.done);
                collected.push_str(&text);
            }
            ReplyContent::Json(Value::Null) => {
                assert!(item.done);
                saw_done = true;
            }
            other => panic!("unexpected reply item: {other:?}"),
        }
    }
    assert!(saw_done);
    assert_eq!(collected, big_text);
}

#[tokio::test]
async fn oversized_prompt_streams_to_the_expert() {
    let network = MemoryRelayNetwork::new();
    let pool = build_pool(&network);
    let ledger = PaymentLedger::new();
    let _shutdown = start_expert(
        pool.clone(),
        Keyring::generate(),
        Arc::new(MockWallet::new(ledger.clone())),
        Arc::new(ScriptedHandler {
            offer: "offer".into(),
            price: 10,
            reply: json!("got it"),
        }),
        &["demo"],
    )
    .await;
    wait_for_expert(&network).await;

    let client = Client::new(pool.clone(), vec![DISCOVERY.to_string()]);
    let bids = client
        .find_experts(discovery_params("Hi?", "demo", 1500))
        .await
        .unwrap();
    let handler = PayingQuoteHandler::new(
        Arc::new(MockWallet::new(ledger)),
        PaymentPolicy {
            max_amount_sats: 100,
        },
    );
    // Over the event ceiling: streaming is mandatory and selected
    // automatically.
    let question: String = "why? ".repeat(20_000); // 100 000 bytes
    let mut replies = client
        .ask_expert(
            AskParams {
                target: PromptTarget::from(&bids[0]),
                content: json!(question),
                format: None,
                stream: None,
            },
            &handler,
        )
        .await
        .unwrap();
    let item = replies.next().await.unwrap().unwrap();
    assert_eq!(
        item,
        ReplyItem {
            content: ReplyContent::Json(json!("got it")),
            done: true
        }
    );
}

#[tokio::test]
async fn discovery_accepts_one_bid_per_expert() {
    let network = MemoryRelayNetwork::new();
    let pool = build_pool(&network);
    let ledger = PaymentLedger::new();
    let expert_keys = Keyring::generate();
    let _shutdown = start_expert(
        pool.clone(),
        expert_keys.clone(),
        Arc::new(MockWallet::new(ledger)),
        Arc::new(ScriptedHandler {
            offer: "first".into(),
            price: 10,
            reply: json!("x"),
        }),
        &["a", "b"],
    )
    .await;
    wait_for_expert(&network).await;

    // A second envelope from the same expert key arrives mid-window; the
    // first bid wins.
    {
        let network = network.clone();
        let pool = pool.clone();
        tokio::spawn(async move {
            let ask_event = loop {
                if let Some(event) = network
                    .stored(DISCOVERY)
                    .into_iter()
                    .find(|e| kind_of(e) == kind::ASK)
                {
                    break event;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            };
            let ask = Ask::from_event(&ask_event).unwrap();
            let payload = sign_event(
                kind::BID_PAYLOAD,
                "second",
                vec![custom_tag(tag::RELAY, PROMPT_RELAY)],
                &expert_keys,
            )
            .unwrap();
            let envelope_keys = Keyring::generate();
            let cipher =
                seal(payload.as_json().as_bytes(), &ask.author, &envelope_keys).unwrap();
            let envelope = sign_event(
                kind::BID_ENVELOPE,
                cipher,
                vec![event_ref_tag(&ask.id)],
                &envelope_keys,
            )
            .unwrap();
            pool.publish(&envelope, &[DISCOVERY.to_string()], Duration::from_secs(1))
                .await
                .unwrap();
        });
    }

    let client = Client::new(pool.clone(), vec![DISCOVERY.to_string()]);
    let bids = client
        .find_experts(discovery_params("Hi?", "a", 3000))
        .await
        .unwrap();
    // Two envelopes were published for the same expert key; only the first
    // to arrive is kept.
    assert_eq!(bids.len(), 1);
}

/// A handler that refuses every quote, standing in for a client that walks
/// away after pricing.
struct RefusingHandler;

#[async_trait]
impl QuoteHandler for RefusingHandler {
    async fn on_quote(
        &self,
        _invoices: &[InvoiceRecord],
        _prompt_id: &EventId,
    ) -> Result<bool, ProtocolError> {
        Ok(false)
    }

    async fn on_pay(
        &self,
        _invoices: &[InvoiceRecord],
        _prompt_id: &EventId,
    ) -> Result<ProofPayload, ProtocolError> {
        Err(ProtocolError::Payment(PaymentError::Rejected(
            "unreachable".into(),
        )))
    }
}

#[tokio::test]
async fn client_refusal_releases_the_expert_without_a_reply() {
    let network = MemoryRelayNetwork::new();
    let pool = build_pool(&network);
    let ledger = PaymentLedger::new();
    let _shutdown = start_expert(
        pool.clone(),
        Keyring::generate(),
        Arc::new(MockWallet::new(ledger)),
        Arc::new(ScriptedHandler {
            offer: "offer".into(),
            price: 10,
            reply: json!("never sent"),
        }),
        &["demo"],
    )
    .await;
    wait_for_expert(&network).await;

    let client = Client::new(pool.clone(), vec![DISCOVERY.to_string()]);
    let bids = client
        .find_experts(discovery_params("Hi?", "demo", 1500))
        .await
        .unwrap();
    let err = client
        .ask_expert(
            AskParams {
                target: PromptTarget::from(&bids[0]),
                content: json!("ping"),
                format: None,
                stream: Some(false),
            },
            &RefusingHandler,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Payment(PaymentError::Rejected(_))
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let kinds = stored_kinds(&network, PROMPT_RELAY);
    assert!(kinds.contains(&kind::PROOF), "error proof must be sent");
    assert!(!kinds.contains(&kind::REPLY), "expert must not reply");
}

#[tokio::test]
async fn fetch_experts_returns_the_latest_profile() {
    let network = MemoryRelayNetwork::new();
    let pool = build_pool(&network);
    let ledger = PaymentLedger::new();
    let expert_keys = Keyring::generate();
    let expert_pub = expert_keys.public_key();
    let _shutdown = start_expert(
        pool.clone(),
        expert_keys,
        Arc::new(MockWallet::new(ledger)),
        Arc::new(ScriptedHandler {
            offer: "offer".into(),
            price: 10,
            reply: json!("x"),
        }),
        &["demo"],
    )
    .await;
    wait_for_expert(&network).await;

    let client = Client::new(pool, vec![DISCOVERY.to_string()]);
    let profiles = client
        .fetch_experts(&[expert_pub], None, Some(Duration::from_millis(500)))
        .await
        .unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].pubkey, expert_pub);
    assert!(profiles[0].stream_supported);
    assert_eq!(profiles[0].relays, vec![PROMPT_RELAY.to_string()]);
}
