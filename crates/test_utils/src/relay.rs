// Path: crates/test_utils/src/relay.rs
//! An in-memory relay network.
//!
//! Every relay stores published events and replays matches to new
//! subscriptions before switching to live delivery, the way a real relay
//! answers a REQ. Delivery order across relays is deliberately unspecified.

use async_trait::async_trait;
use dashmap::DashMap;
use nostr::filter::MatchEventOptions;
use nostr::{Event, Filter};
use sensei_api::relay::{Relay, SubscriptionToken};
use sensei_types::error::RelayError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct RelayStore {
    events: Mutex<Vec<Event>>,
    subs: DashMap<SubscriptionToken, (Filter, mpsc::Sender<Event>)>,
    next_token: AtomicU64,
}

#[derive(Default)]
struct NetworkInner {
    relays: DashMap<String, Arc<RelayStore>>,
}

/// A set of in-memory relays addressable by URL.
#[derive(Clone, Default)]
pub struct MemoryRelayNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryRelayNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a connection to the named relay, creating it on first use.
    pub fn relay(&self, url: &str) -> MemoryRelay {
        let store = self
            .inner
            .relays
            .entry(url.to_string())
            .or_default()
            .clone();
        MemoryRelay {
            url: url.to_string(),
            store,
        }
    }

    /// Every event currently stored on the named relay.
    pub fn stored(&self, url: &str) -> Vec<Event> {
        self.inner
            .relays
            .get(url)
            .map(|store| {
                store
                    .events
                    .lock()
                    .map(|events| events.to_vec())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

/// One connection to one in-memory relay.
pub struct MemoryRelay {
    url: String,
    store: Arc<RelayStore>,
}

impl MemoryRelay {
    fn matching(&self, filter: &Filter) -> Vec<Event> {
        self.store
            .events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|e| filter.match_event(e, MatchEventOptions::default()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&self, event: Event, _timeout: Duration) -> Result<(), RelayError> {
        if let Ok(mut events) = self.store.events.lock() {
            events.push(event.clone());
        }
        // Fan out to live subscriptions; dead receivers are pruned.
        let mut dead = Vec::new();
        for entry in self.store.subs.iter() {
            let (filter, sender) = entry.value();
            if filter.match_event(&event, MatchEventOptions::default())
                && sender.send(event.clone()).await.is_err()
            {
                dead.push(*entry.key());
            }
        }
        for token in dead {
            self.store.subs.remove(&token);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: Filter,
        sender: mpsc::Sender<Event>,
    ) -> Result<SubscriptionToken, RelayError> {
        // Replay stored matches first, as a relay answers a REQ.
        for event in self.matching(&filter) {
            if sender.send(event).await.is_err() {
                return Err(RelayError::Closed);
            }
        }
        let token = self.store.next_token.fetch_add(1, Ordering::Relaxed);
        self.store.subs.insert(token, (filter, sender));
        Ok(token)
    }

    async fn unsubscribe(&self, token: SubscriptionToken) {
        self.store.subs.remove(&token);
    }

    async fn query(&self, filter: Filter, _timeout: Duration) -> Result<Vec<Event>, RelayError> {
        Ok(self.matching(&filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Keys, Kind};

    fn event(keys: &Keys, kind: u16, content: &str) -> Event {
        EventBuilder::new(Kind::Custom(kind), content)
            .sign_with_keys(keys)
            .unwrap()
    }

    #[tokio::test]
    async fn replays_stored_events_to_new_subscriptions() {
        let network = MemoryRelayNetwork::new();
        let relay = network.relay("wss://mem.one");
        let keys = Keys::generate();

        let published = event(&keys, 20174, "early");
        relay
            .publish(published.clone(), Duration::from_secs(1))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let filter = Filter::new().kind(Kind::Custom(20174));
        relay.subscribe(filter, tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id, published.id);
    }

    #[tokio::test]
    async fn live_delivery_respects_the_filter() {
        let network = MemoryRelayNetwork::new();
        let relay = network.relay("wss://mem.one");
        let keys = Keys::generate();

        let (tx, mut rx) = mpsc::channel(8);
        relay
            .subscribe(Filter::new().kind(Kind::Custom(20178)), tx)
            .await
            .unwrap();

        relay
            .publish(event(&keys, 20174, "miss"), Duration::from_secs(1))
            .await
            .unwrap();
        let hit = event(&keys, 20178, "hit");
        relay
            .publish(hit.clone(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().id, hit.id);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let network = MemoryRelayNetwork::new();
        let relay = network.relay("wss://mem.one");
        let keys = Keys::generate();

        let (tx, mut rx) = mpsc::channel(8);
        let token = relay
            .subscribe(Filter::new().kind(Kind::Custom(20178)), tx)
            .await
            .unwrap();
        relay.unsubscribe(token).await;

        relay
            .publish(event(&keys, 20178, "late"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
