// Path: crates/relay/tests/pool.rs
//! Pool behavior over the in-memory relay network.

use nostr::{Filter, Kind};
use sensei_crypto::{sign_event, Keyring};
use sensei_relay::RelayPool;
use sensei_test_utils::{MemoryRelay, MemoryRelayNetwork};
use sensei_types::error::RelayError;
use sensei_types::event::kind;
use std::time::Duration;

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn publish_returns_the_accepting_subset() {
    let network = MemoryRelayNetwork::new();
    let pool: RelayPool<MemoryRelay> = RelayPool::new();
    pool.add_relay(network.relay("wss://a"));
    pool.add_relay(network.relay("wss://b"));

    let event = sign_event(kind::ASK, "hi", vec![], &Keyring::generate()).unwrap();
    let mut accepted = pool
        .publish(&event, &urls(&["wss://a", "wss://b", "wss://unknown"]), Duration::from_secs(1))
        .await
        .unwrap();
    accepted.sort();
    assert_eq!(accepted, urls(&["wss://a", "wss://b"]));
}

#[tokio::test]
async fn publish_with_no_reachable_relay_is_unreachable() {
    let pool: RelayPool<MemoryRelay> = RelayPool::new();
    let event = sign_event(kind::ASK, "hi", vec![], &Keyring::generate()).unwrap();
    let err = pool
        .publish(&event, &urls(&["wss://nowhere"]), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Unreachable));
}

#[tokio::test]
async fn subscriptions_deduplicate_across_relays() {
    let network = MemoryRelayNetwork::new();
    let pool: RelayPool<MemoryRelay> = RelayPool::new();
    pool.add_relay(network.relay("wss://a"));
    pool.add_relay(network.relay("wss://b"));
    let relays = urls(&["wss://a", "wss://b"]);

    let mut subscription = pool
        .subscribe(Filter::new().kind(Kind::Custom(kind::ASK)), &relays)
        .await;
    assert_eq!(subscription.relay_count(), 2);

    // The same event lands on both relays; one delivery reaches the
    // consumer.
    let event = sign_event(kind::ASK, "hi", vec![], &Keyring::generate()).unwrap();
    pool.publish(&event, &relays, Duration::from_secs(1)).await.unwrap();

    assert_eq!(subscription.recv().await.unwrap().id, event.id);
    let second = tokio::time::timeout(Duration::from_millis(100), subscription.recv()).await;
    assert!(second.is_err(), "duplicate delivery must be suppressed");
    subscription.close().await;
}

#[tokio::test]
async fn fetch_deduplicates_historic_events() {
    let network = MemoryRelayNetwork::new();
    let pool: RelayPool<MemoryRelay> = RelayPool::new();
    pool.add_relay(network.relay("wss://a"));
    pool.add_relay(network.relay("wss://b"));
    let relays = urls(&["wss://a", "wss://b"]);

    let event = sign_event(kind::EXPERT_PROFILE, "profile", vec![], &Keyring::generate()).unwrap();
    pool.publish(&event, &relays, Duration::from_secs(1)).await.unwrap();

    let fetched = pool
        .fetch(
            Filter::new().kind(Kind::Custom(kind::EXPERT_PROFILE)),
            &relays,
            Duration::from_secs(1),
        )
        .await;
    assert_eq!(fetched.len(), 1);
}

#[tokio::test]
async fn wait_for_event_times_out_to_none() {
    let network = MemoryRelayNetwork::new();
    let pool: RelayPool<MemoryRelay> = RelayPool::new();
    pool.add_relay(network.relay("wss://a"));

    let waited = pool
        .wait_for_event(
            Filter::new().kind(Kind::Custom(kind::QUOTE)),
            &urls(&["wss://a"]),
            Duration::from_millis(100),
        )
        .await;
    assert!(waited.is_none());
}
