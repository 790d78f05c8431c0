// Path: crates/api/src/relay.rs
//! The per-relay transport seam.
//!
//! A [`Relay`] is one connection to one relay URL. The pool in
//! `sensei-relay` composes many of these into publish/subscribe/fetch
//! operations with deduplication; test environments substitute an in-memory
//! implementation. The transport is trusted to have validated signatures on
//! delivery; consumers re-validate only at trust boundaries.

use async_trait::async_trait;
use nostr::{Event, Filter};
use sensei_types::error::RelayError;
use std::time::Duration;
use tokio::sync::mpsc;

/// Identifies one live subscription on one relay connection.
pub type SubscriptionToken = u64;

/// One connection to one relay.
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// The relay's URL, used as its identity inside the pool.
    fn url(&self) -> &str;

    /// Publishes a signed event, resolving once the relay acknowledges it or
    /// the timeout elapses.
    async fn publish(&self, event: Event, timeout: Duration) -> Result<(), RelayError>;

    /// Opens a subscription; matching events are pushed into `sender` until
    /// [`Relay::unsubscribe`] is called or the sender is dropped.
    async fn subscribe(
        &self,
        filter: Filter,
        sender: mpsc::Sender<Event>,
    ) -> Result<SubscriptionToken, RelayError>;

    /// Tears down a subscription. Unknown tokens are ignored.
    async fn unsubscribe(&self, token: SubscriptionToken);

    /// One-shot historic query resolving with everything the relay returns
    /// before the timeout.
    async fn query(&self, filter: Filter, timeout: Duration) -> Result<Vec<Event>, RelayError>;
}
