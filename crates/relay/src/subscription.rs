// Path: crates/relay/src/subscription.rs
//! A deduplicating subscription handle spanning several relay connections.

use nostr::{Event, EventId};
use sensei_api::relay::{Relay, SubscriptionToken};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A live subscription across one or more relays.
///
/// Every relay pushes into the same channel; `recv` suppresses duplicate
/// event ids (the same event arriving from multiple relays). Dropping the
/// handle tears the per-relay subscriptions down within one scheduler turn;
/// calling [`Subscription::close`] does so deterministically.
pub struct Subscription<R: Relay> {
    rx: mpsc::Receiver<Event>,
    seen: HashSet<EventId>,
    handles: Vec<(Arc<R>, SubscriptionToken)>,
}

impl<R: Relay> Subscription<R> {
    pub(crate) fn new(
        rx: mpsc::Receiver<Event>,
        handles: Vec<(Arc<R>, SubscriptionToken)>,
    ) -> Self {
        Self {
            rx,
            seen: HashSet::new(),
            handles,
        }
    }

    /// The number of relays actually serving this subscription.
    pub fn relay_count(&self) -> usize {
        self.handles.len()
    }

    /// Receives the next distinct event, or `None` once every serving relay
    /// has dropped its sender.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let event = self.rx.recv().await?;
            if self.seen.insert(event.id) {
                return Some(event);
            }
            debug!(event_id = %event.id, "duplicate event suppressed");
        }
    }

    /// Closes the subscription on every relay.
    pub async fn close(mut self) {
        let handles = std::mem::take(&mut self.handles);
        for (relay, token) in handles {
            relay.unsubscribe(token).await;
        }
    }
}

impl<R: Relay> Drop for Subscription<R> {
    fn drop(&mut self) {
        // Dropping the receiver already severs delivery; the per-relay
        // teardown runs on the next scheduler turn.
        let handles = std::mem::take(&mut self.handles);
        if handles.is_empty() {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                for (relay, token) in handles {
                    relay.unsubscribe(token).await;
                }
            });
        }
    }
}
