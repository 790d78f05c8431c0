// Path: crates/types/src/profile.rs
//! Decoded views of the discovery entities.
//!
//! Each view parses one event kind into explicit fields. Unknown tag values
//! inside closed vocabularies (formats, methods) are skipped rather than
//! failing the whole event: a newer peer advertising a format we do not know
//! must not make its profile unreadable.

use crate::error::ProtocolError;
use crate::event::{self, kind, tag};
use crate::model::{Format, PaymentMethod};
use nostr::{Event, EventId, PublicKey, Tag, Timestamp};

fn parsed_values<T: std::str::FromStr>(event: &Event, name: &str) -> Vec<T> {
    event::tag_values(event, name)
        .filter_map(|v| v.parse().ok())
        .collect()
}

/// An expert's advertised attributes, decoded from an `ExpertProfile` event.
#[derive(Debug, Clone)]
pub struct ExpertProfile {
    /// The expert's long-term public key.
    pub pubkey: PublicKey,
    /// Display name, if advertised.
    pub name: Option<String>,
    /// Picture URL, if advertised.
    pub picture: Option<String>,
    /// Human description of the expert's services.
    pub description: String,
    /// The relays the expert listens on for prompts.
    pub relays: Vec<String>,
    /// Prompt formats the expert accepts.
    pub formats: Vec<Format>,
    /// Whether the expert supports chunked streaming.
    pub stream_supported: bool,
    /// Payment methods the expert accepts.
    pub methods: Vec<PaymentMethod>,
    /// Topics the expert answers on.
    pub hashtags: Vec<String>,
    /// When the profile event was created.
    pub updated_at: Timestamp,
}

impl ExpertProfile {
    /// Decodes a profile from its event.
    pub fn from_event(event: &Event) -> Result<Self, ProtocolError> {
        if event::kind_of(event) != kind::EXPERT_PROFILE {
            return Err(ProtocolError::InvalidEvent(format!(
                "expected expert profile kind, got {}",
                event::kind_of(event)
            )));
        }
        Ok(Self {
            pubkey: event.pubkey,
            name: event::first_tag_value(event, tag::NAME).map(str::to_string),
            picture: event::first_tag_value(event, tag::PICTURE).map(str::to_string),
            description: event.content.clone(),
            relays: event::tag_values(event, tag::RELAY).map(str::to_string).collect(),
            formats: parsed_values(event, tag::FORMAT),
            stream_supported: event::flag_tag(event, tag::STREAM_FLAG),
            methods: parsed_values(event, tag::METHOD),
            hashtags: event::tag_values(event, tag::HASHTAG).map(str::to_string).collect(),
            updated_at: event.created_at,
        })
    }

    /// Builds the advertising tag set for a profile or bid payload event.
    pub fn advertising_tags(&self) -> Vec<Tag> {
        let mut tags = Vec::new();
        for relay in &self.relays {
            tags.push(event::custom_tag(tag::RELAY, relay.clone()));
        }
        for format in &self.formats {
            tags.push(event::custom_tag(tag::FORMAT, format.as_str()));
        }
        if self.stream_supported {
            tags.push(event::custom_tag(tag::STREAM_FLAG, "true"));
        }
        for method in &self.methods {
            tags.push(event::custom_tag(tag::METHOD, method.as_str()));
        }
        for hashtag in &self.hashtags {
            tags.push(Tag::hashtag(hashtag.clone()));
        }
        if let Some(name) = &self.name {
            tags.push(event::custom_tag(tag::NAME, name.clone()));
        }
        if let Some(picture) = &self.picture {
            tags.push(event::custom_tag(tag::PICTURE, picture.clone()));
        }
        tags
    }
}

/// A public request-for-bids, decoded from an `Ask` event.
#[derive(Debug, Clone)]
pub struct Ask {
    /// The ask id; the correlation handle for bids.
    pub id: EventId,
    /// The ephemeral key the ask was signed with.
    pub author: PublicKey,
    /// Public, anonymized summary of the question.
    pub summary: String,
    /// Requested topics. At least one is required on the wire.
    pub hashtags: Vec<String>,
    /// Formats the asker can produce, empty meaning any.
    pub formats: Vec<Format>,
    /// Whether the asker supports streamed replies.
    pub stream: bool,
    /// Payment methods the asker can pay over, empty meaning any.
    pub methods: Vec<PaymentMethod>,
    /// When the ask was created.
    pub created_at: Timestamp,
}

impl Ask {
    /// Decodes an ask from its event.
    pub fn from_event(event: &Event) -> Result<Self, ProtocolError> {
        if event::kind_of(event) != kind::ASK {
            return Err(ProtocolError::InvalidEvent(format!(
                "expected ask kind, got {}",
                event::kind_of(event)
            )));
        }
        let hashtags: Vec<String> =
            event::tag_values(event, tag::HASHTAG).map(str::to_string).collect();
        if hashtags.is_empty() {
            return Err(ProtocolError::InvalidEvent("ask carries no hashtags".into()));
        }
        Ok(Self {
            id: event.id,
            author: event.pubkey,
            summary: event.content.clone(),
            hashtags,
            formats: parsed_values(event, tag::FORMAT),
            stream: event::flag_tag(event, tag::STREAM_FLAG),
            methods: parsed_values(event, tag::METHOD),
            created_at: event.created_at,
        })
    }
}

/// An expert's offer for a specific ask, decoded from the authenticated bid
/// payload embedded inside a bid envelope.
#[derive(Debug, Clone)]
pub struct Bid {
    /// The ask this bid answers.
    pub ask_id: EventId,
    /// The expert's long-term public key. Revealed only to the ask's holder;
    /// the envelope on the wire is signed by an ephemeral key.
    pub expert_pubkey: PublicKey,
    /// The expert's offer text.
    pub offer: String,
    /// The relays the expert listens on for prompts.
    pub relays: Vec<String>,
    /// Formats the expert accepts for this exchange.
    pub formats: Vec<Format>,
    /// Whether the expert supports chunked streaming.
    pub stream_supported: bool,
    /// Payment methods the expert accepts.
    pub methods: Vec<PaymentMethod>,
    /// Topics the expert advertises.
    pub hashtags: Vec<String>,
}

impl Bid {
    /// Decodes a bid from the embedded, already signature-validated payload
    /// event.
    pub fn from_payload_event(ask_id: EventId, payload: &Event) -> Result<Self, ProtocolError> {
        if event::kind_of(payload) != kind::BID_PAYLOAD {
            return Err(ProtocolError::InvalidEvent(format!(
                "expected bid payload kind, got {}",
                event::kind_of(payload)
            )));
        }
        Ok(Self {
            ask_id,
            expert_pubkey: payload.pubkey,
            offer: payload.content.clone(),
            relays: event::tag_values(payload, tag::RELAY).map(str::to_string).collect(),
            formats: parsed_values(payload, tag::FORMAT),
            stream_supported: event::flag_tag(payload, tag::STREAM_FLAG),
            methods: parsed_values(payload, tag::METHOD),
            hashtags: event::tag_values(payload, tag::HASHTAG).map(str::to_string).collect(),
        })
    }
}

/// The target of an `ask_expert` call: either a collected bid or a fetched
/// profile. Both carry the attributes the client needs to address a prompt.
#[derive(Debug, Clone)]
pub struct PromptTarget {
    /// The expert's long-term public key.
    pub pubkey: PublicKey,
    /// The expert's prompt relays.
    pub relays: Vec<String>,
    /// Formats the expert accepts.
    pub formats: Vec<Format>,
    /// Whether the expert supports chunked streaming.
    pub stream_supported: bool,
    /// Payment methods the expert accepts.
    pub methods: Vec<PaymentMethod>,
}

impl From<&Bid> for PromptTarget {
    fn from(bid: &Bid) -> Self {
        Self {
            pubkey: bid.expert_pubkey,
            relays: bid.relays.clone(),
            formats: bid.formats.clone(),
            stream_supported: bid.stream_supported,
            methods: bid.methods.clone(),
        }
    }
}

impl From<&ExpertProfile> for PromptTarget {
    fn from(profile: &ExpertProfile) -> Self {
        Self {
            pubkey: profile.pubkey,
            relays: profile.relays.clone(),
            formats: profile.formats.clone(),
            stream_supported: profile.stream_supported,
            methods: profile.methods.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Keys, Kind};

    #[test]
    fn profile_roundtrips_through_tags() {
        let keys = Keys::generate();
        let profile = ExpertProfile {
            pubkey: keys.public_key(),
            name: Some("sage".into()),
            picture: None,
            description: "I answer things".into(),
            relays: vec!["wss://relay.one".into()],
            formats: vec![Format::Text, Format::Openai],
            stream_supported: true,
            methods: vec![PaymentMethod::Lightning],
            hashtags: vec!["a".into(), "b".into()],
            updated_at: Timestamp::now(),
        };
        let event = EventBuilder::new(Kind::Custom(kind::EXPERT_PROFILE), "I answer things")
            .tags(profile.advertising_tags())
            .sign_with_keys(&keys)
            .unwrap();

        let decoded = ExpertProfile::from_event(&event).unwrap();
        assert_eq!(decoded.pubkey, keys.public_key());
        assert_eq!(decoded.name.as_deref(), Some("sage"));
        assert_eq!(decoded.relays, profile.relays);
        assert_eq!(decoded.formats, profile.formats);
        assert!(decoded.stream_supported);
        assert_eq!(decoded.hashtags, profile.hashtags);
    }

    #[test]
    fn ask_requires_a_hashtag() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::Custom(kind::ASK), "Hi?")
            .sign_with_keys(&keys)
            .unwrap();
        assert!(Ask::from_event(&event).is_err());
    }

    #[test]
    fn unknown_vocabulary_values_are_skipped() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::Custom(kind::EXPERT_PROFILE), "")
            .tags([
                crate::event::custom_tag(tag::FORMAT, "text"),
                crate::event::custom_tag(tag::FORMAT, "carrier-pigeon"),
            ])
            .sign_with_keys(&keys)
            .unwrap();
        let decoded = ExpertProfile::from_event(&event).unwrap();
        assert_eq!(decoded.formats, vec![Format::Text]);
    }
}
