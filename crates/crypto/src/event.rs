// Path: crates/crypto/src/event.rs
//! Event signing, serialization, and trust-boundary validation.

use crate::error::CryptoError;
use crate::keys::Keyring;
use nostr::{Event, EventBuilder, JsonUtil, Kind, Tag};

/// Signs a new event under the given keyring.
pub fn sign_event(
    kind: u16,
    content: impl Into<String>,
    tags: Vec<Tag>,
    signer: &Keyring,
) -> Result<Event, CryptoError> {
    EventBuilder::new(Kind::Custom(kind), content)
        .tags(tags)
        .sign_with_keys(signer.keys())
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

/// Verifies an event's id and signature.
///
/// Used only where the consumer does not trust the producer: the relay
/// transport validates everything it delivers, but an event embedded inside
/// another event's content (the bid payload) arrives unvetted.
pub fn validate_event(event: &Event) -> bool {
    event.verify().is_ok()
}

/// Parses an event from its JSON serialization without validating it.
pub fn parse_event(json: &str) -> Result<Event, CryptoError> {
    Event::from_json(json).map_err(|e| CryptoError::InvalidEvent(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensei_types::event::kind;

    #[test]
    fn signed_events_validate() {
        let ring = Keyring::generate();
        let event = sign_event(kind::ASK, "Hi?", vec![Tag::hashtag("demo")], &ring).unwrap();
        assert!(validate_event(&event));
        assert_eq!(event.pubkey, ring.public_key());
    }

    #[test]
    fn tampered_events_fail_validation() {
        let ring = Keyring::generate();
        let event = sign_event(kind::BID_PAYLOAD, "offer", vec![], &ring).unwrap();
        let json = event.as_json().replace("offer", "forged");
        let forged = parse_event(&json).unwrap();
        assert!(!validate_event(&forged));
    }

    #[test]
    fn serialization_roundtrip() {
        let ring = Keyring::generate();
        let event = sign_event(kind::BID_PAYLOAD, "offer", vec![], &ring).unwrap();
        let back = parse_event(&event.as_json()).unwrap();
        assert_eq!(back.id, event.id);
        assert!(validate_event(&back));
    }
}
