// Path: crates/relay/src/pool.rs
//! The shared relay pool.

use crate::subscription::Subscription;
use dashmap::DashMap;
use futures::future::join_all;
use nostr::{Event, EventId, Filter};
use sensei_api::relay::Relay;
use sensei_types::error::RelayError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const SUBSCRIPTION_BUFFER: usize = 256;

/// A connection multiplexer over a set of relays.
///
/// Operations address relays by URL; URLs with no registered connection are
/// skipped with a warning rather than failing the operation, so a peer
/// advertising an unknown relay degrades to the relays we do know.
pub struct RelayPool<R: Relay> {
    relays: Arc<DashMap<String, Arc<R>>>,
}

impl<R: Relay> Clone for RelayPool<R> {
    fn clone(&self) -> Self {
        Self {
            relays: Arc::clone(&self.relays),
        }
    }
}

impl<R: Relay> Default for RelayPool<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Relay> RelayPool<R> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            relays: Arc::new(DashMap::new()),
        }
    }

    /// Registers a relay connection under its URL.
    pub fn add_relay(&self, relay: R) {
        self.relays.insert(relay.url().to_string(), Arc::new(relay));
    }

    /// The URLs of every registered relay.
    pub fn urls(&self) -> Vec<String> {
        self.relays.iter().map(|e| e.key().clone()).collect()
    }

    fn select(&self, urls: &[String]) -> Vec<Arc<R>> {
        let mut selected = Vec::with_capacity(urls.len());
        for url in urls {
            match self.relays.get(url) {
                Some(entry) => selected.push(Arc::clone(entry.value())),
                None => warn!(%url, "no connection for relay, skipping"),
            }
        }
        selected
    }

    /// Publishes an event to all named relays in parallel, returning the
    /// subset that acknowledged before the timeout.
    ///
    /// Fails with [`RelayError::Unreachable`] only when that subset is empty.
    pub async fn publish(
        &self,
        event: &Event,
        relays: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>, RelayError> {
        let selected = self.select(relays);
        let attempts = selected.iter().map(|relay| {
            let event = event.clone();
            async move {
                match relay.publish(event, timeout).await {
                    Ok(()) => Some(relay.url().to_string()),
                    Err(e) => {
                        debug!(url = relay.url(), error = %e, "publish not accepted");
                        None
                    }
                }
            }
        });
        let accepted: Vec<String> = join_all(attempts).await.into_iter().flatten().collect();
        if accepted.is_empty() {
            return Err(RelayError::Unreachable);
        }
        Ok(accepted)
    }

    /// Opens a deduplicating subscription across the named relays.
    ///
    /// Per-relay failures are logged and skipped; a subscription serving zero
    /// relays yields no events, which upper layers observe as a timeout.
    pub async fn subscribe(
        &self,
        filter: Filter,
        relays: &[String],
    ) -> Subscription<R> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut handles = Vec::new();
        for relay in self.select(relays) {
            match relay.subscribe(filter.clone(), tx.clone()).await {
                Ok(token) => handles.push((relay, token)),
                Err(e) => debug!(url = relay.url(), error = %e, "subscribe failed"),
            }
        }
        Subscription::new(rx, handles)
    }

    /// One-shot historic query across the named relays, deduplicated by
    /// event id. Per-relay failures are logged and skipped.
    pub async fn fetch(
        &self,
        filter: Filter,
        relays: &[String],
        timeout: Duration,
    ) -> Vec<Event> {
        let selected = self.select(relays);
        let queries = selected.iter().map(|relay| {
            let filter = filter.clone();
            async move {
                match relay.query(filter, timeout).await {
                    Ok(events) => events,
                    Err(e) => {
                        debug!(url = relay.url(), error = %e, "query failed");
                        Vec::new()
                    }
                }
            }
        });
        let mut seen = std::collections::HashSet::<EventId>::new();
        join_all(queries)
            .await
            .into_iter()
            .flatten()
            .filter(|event| seen.insert(event.id))
            .collect()
    }

    /// Resolves with the first event matching the filter, or `None` on
    /// timeout.
    pub async fn wait_for_event(
        &self,
        filter: Filter,
        relays: &[String],
        timeout: Duration,
    ) -> Option<Event> {
        let mut subscription = self.subscribe(filter, relays).await;
        let result = tokio::time::timeout(timeout, subscription.recv())
            .await
            .ok()
            .flatten();
        subscription.close().await;
        result
    }
}
