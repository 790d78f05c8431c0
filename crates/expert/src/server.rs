// Path: crates/expert/src/server.rs
//! The expert run loop: profile lifecycle and subscription dispatch.

use crate::handlers::ExpertHandler;
use crate::session;
use dashmap::DashSet;
use nostr::{EventId, Filter, Kind, SingleLetterTag, Timestamp};
use sensei_api::relay::Relay;
use sensei_api::wallet::LightningWallet;
use sensei_crypto::{sign_event, Keyring};
use sensei_relay::{RelayPool, Subscription};
use sensei_types::config::{EVENT_FRESHNESS_WINDOW, PROFILE_REPUBLISH_INTERVAL, PUBLISH_TIMEOUT};
use sensei_types::error::{ProtocolError, RelayError};
use sensei_types::event::kind;
use sensei_types::model::{Format, PaymentMethod};
use sensei_types::profile::ExpertProfile;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};

/// The expert's advertised attribute bag. Mutations schedule a profile
/// republish and an ask resubscribe on the run loop's next turn, never
/// inline, to avoid reentrancy on the protocol loop.
#[derive(Debug, Clone)]
pub struct ExpertAttributes {
    /// Display name, if any.
    pub name: Option<String>,
    /// Picture URL, if any.
    pub picture: Option<String>,
    /// Human description of the expert's services.
    pub description: String,
    /// Topics the expert answers on.
    pub hashtags: Vec<String>,
    /// Prompt formats the expert accepts.
    pub formats: Vec<Format>,
    /// Payment methods the expert accepts.
    pub methods: Vec<PaymentMethod>,
    /// Whether the expert supports chunked streaming.
    pub stream_supported: bool,
    /// The relays the expert listens on for prompts.
    pub prompt_relays: Vec<String>,
    /// The relays asks, bids, and the profile are published on.
    pub discovery_relays: Vec<String>,
}

impl ExpertAttributes {
    fn as_profile(&self, keys: &Keyring) -> ExpertProfile {
        ExpertProfile {
            pubkey: keys.public_key(),
            name: self.name.clone(),
            picture: self.picture.clone(),
            description: self.description.clone(),
            relays: self.prompt_relays.clone(),
            formats: self.formats.clone(),
            stream_supported: self.stream_supported,
            methods: self.methods.clone(),
            hashtags: self.hashtags.clone(),
            updated_at: Timestamp::now(),
        }
    }
}

pub(crate) struct ExpertInner<R: Relay, W, H> {
    pub(crate) pool: RelayPool<R>,
    pub(crate) wallet: Arc<W>,
    pub(crate) handler: Arc<H>,
    pub(crate) keys: Keyring,
    pub(crate) attrs: RwLock<ExpertAttributes>,
    pub(crate) seen_prompts: DashSet<EventId>,
}

/// The expert protocol state machine.
pub struct Expert<R: Relay, W, H> {
    inner: Arc<ExpertInner<R, W, H>>,
    update_tx: mpsc::Sender<()>,
    update_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl<R, W, H> Expert<R, W, H>
where
    R: Relay,
    W: LightningWallet + 'static,
    H: ExpertHandler + 'static,
{
    /// Creates an expert over a shared pool.
    pub fn new(
        pool: RelayPool<R>,
        keys: Keyring,
        wallet: Arc<W>,
        handler: Arc<H>,
        attrs: ExpertAttributes,
    ) -> Self {
        let (update_tx, update_rx) = mpsc::channel(8);
        Self {
            inner: Arc::new(ExpertInner {
                pool,
                wallet,
                handler,
                keys,
                attrs: RwLock::new(attrs),
                seen_prompts: DashSet::new(),
            }),
            update_tx,
            update_rx: tokio::sync::Mutex::new(update_rx),
        }
    }

    /// Mutates the advertised attributes; the run loop republishes the
    /// profile and resubscribes for asks on its next turn.
    pub async fn update_attributes<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ExpertAttributes),
    {
        {
            let mut attrs = self.inner.attrs.write().await;
            mutate(&mut attrs);
        }
        // A full queue already guarantees a pending refresh.
        let _ = self.update_tx.try_send(());
    }

    /// The expert's long-term public key.
    pub fn public_key(&self) -> nostr::PublicKey {
        self.inner.keys.public_key()
    }

    /// Runs the expert until `shutdown` flips to `true`: publishes the
    /// profile, republishes it every 12 h and on attribute change, bids on
    /// matching asks, and services prompts concurrently.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ProtocolError> {
        self.publish_profile().await?;
        let mut update_rx = self.update_rx.lock().await;
        let mut ask_sub = self.subscribe_asks().await;
        let mut prompt_sub = self.subscribe_prompts().await;
        let mut republish = interval_at(
            Instant::now() + PROFILE_REPUBLISH_INTERVAL,
            PROFILE_REPUBLISH_INTERVAL,
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = republish.tick() => {
                    if let Err(e) = self.publish_profile().await {
                        warn!(error = %e, "scheduled profile republish failed");
                    }
                }
                Some(()) = update_rx.recv() => {
                    if let Err(e) = self.publish_profile().await {
                        warn!(error = %e, "profile republish after update failed");
                    }
                    ask_sub.close().await;
                    ask_sub = self.subscribe_asks().await;
                }
                maybe_ask = ask_sub.recv() => {
                    let Some(event) = maybe_ask else {
                        return Err(ProtocolError::Relay(RelayError::Closed));
                    };
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        session::handle_ask(inner, event).await;
                    });
                }
                maybe_prompt = prompt_sub.recv() => {
                    let Some(event) = maybe_prompt else {
                        return Err(ProtocolError::Relay(RelayError::Closed));
                    };
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        session::handle_prompt(inner, event).await;
                    });
                }
            }
        }
        ask_sub.close().await;
        prompt_sub.close().await;
        Ok(())
    }

    async fn publish_profile(&self) -> Result<(), ProtocolError> {
        let (event, relays) = {
            let attrs = self.inner.attrs.read().await;
            let profile = attrs.as_profile(&self.inner.keys);
            let event = sign_event(
                kind::EXPERT_PROFILE,
                profile.description.clone(),
                profile.advertising_tags(),
                &self.inner.keys,
            )?;
            (event, attrs.discovery_relays.clone())
        };
        let accepted = self.inner.pool.publish(&event, &relays, PUBLISH_TIMEOUT).await?;
        info!(relays = accepted.len(), "expert profile published");
        Ok(())
    }

    /// Asks are filtered relay-side: fresh, on our topics, in a format and
    /// payment method we accept, from streaming-capable clients.
    async fn subscribe_asks(&self) -> Subscription<R> {
        let (filter, relays) = {
            let attrs = self.inner.attrs.read().await;
            let since =
                Timestamp::from(Timestamp::now().as_u64().saturating_sub(EVENT_FRESHNESS_WINDOW.as_secs()));
            let filter = Filter::new()
                .kind(Kind::Custom(kind::ASK))
                .since(since)
                .hashtags(attrs.hashtags.iter().cloned())
                .custom_tags(
                    SingleLetterTag::lowercase(nostr::Alphabet::F),
                    attrs.formats.iter().map(|f| f.as_str().to_string()),
                )
                .custom_tags(
                    SingleLetterTag::lowercase(nostr::Alphabet::S),
                    ["true".to_string()],
                )
                .custom_tags(
                    SingleLetterTag::lowercase(nostr::Alphabet::M),
                    attrs.methods.iter().map(|m| m.as_str().to_string()),
                );
            (filter, attrs.discovery_relays.clone())
        };
        self.inner.pool.subscribe(filter, &relays).await
    }

    async fn subscribe_prompts(&self) -> Subscription<R> {
        let (filter, relays) = {
            let attrs = self.inner.attrs.read().await;
            let since =
                Timestamp::from(Timestamp::now().as_u64().saturating_sub(EVENT_FRESHNESS_WINDOW.as_secs()));
            let filter = Filter::new()
                .kind(Kind::Custom(kind::PROMPT))
                .pubkey(self.inner.keys.public_key())
                .since(since);
            (filter, attrs.prompt_relays.clone())
        };
        self.inner.pool.subscribe(filter, &relays).await
    }
}
