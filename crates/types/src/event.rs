// Path: crates/types/src/event.rs
//! Event kinds, the tag vocabulary, and tag access helpers.
//!
//! All tag names in this protocol are fixed, so decoded views expose them as
//! explicit fields; the helpers here are the single place that touches the
//! raw tag arrays.

use nostr::{Event, EventId, PublicKey, Tag, TagKind, Timestamp};

/// Event kinds used on the wire.
pub mod kind {
    /// Expert profile, authored by the expert's long-term key.
    pub const EXPERT_PROFILE: u16 = 10174;
    /// Public anonymous request-for-bids, authored by an ephemeral key.
    pub const ASK: u16 = 20174;
    /// Anonymized outer bid event carrying an encrypted bid payload.
    pub const BID_ENVELOPE: u16 = 20175;
    /// The authenticated inner bid event, embedded in the envelope content.
    pub const BID_PAYLOAD: u16 = 20176;
    /// Encrypted question addressed to a specific expert.
    pub const PROMPT: u16 = 20177;
    /// The expert's priced response.
    pub const QUOTE: u16 = 20178;
    /// The client's claim of payment (or of refusal).
    pub const PROOF: u16 = 20179;
    /// The expert's final answer, inline or via a stream.
    pub const REPLY: u16 = 20180;
    /// One chunk of a chunked stream, authored by the stream key.
    pub const STREAM_CHUNK: u16 = 20181;
    /// The serialized stream-metadata event carried in a `stream` tag.
    pub const STREAM_METADATA: u16 = 20182;
}

/// Tag names used on the wire.
pub mod tag {
    /// Referenced event id.
    pub const EVENT: &str = "e";
    /// Referenced public key.
    pub const PUBKEY: &str = "p";
    /// Hashtag.
    pub const HASHTAG: &str = "t";
    /// Payload format.
    pub const FORMAT: &str = "f";
    /// `"true"` iff chunked streaming is accepted.
    pub const STREAM_FLAG: &str = "s";
    /// Payment method.
    pub const METHOD: &str = "m";
    /// Legacy single-event compression method. Accepted on ingest, never
    /// emitted.
    pub const COMPRESSION: &str = "c";
    /// A relay URL.
    pub const RELAY: &str = "relay";
    /// Profile display name.
    pub const NAME: &str = "name";
    /// Profile picture URL.
    pub const PICTURE: &str = "picture";
    /// Ciphertext of a serialized stream-metadata event.
    pub const STREAM: &str = "stream";
    /// Chunk sequence number, monotonically increasing from 0.
    pub const SEQ: &str = "i";
    /// `"true"` on the last chunk of a stream.
    pub const DONE: &str = "done";
    /// `"<code>:<message>"` on an abnormal terminal chunk.
    pub const ERROR: &str = "error";
}

/// Returns the raw kind number of an event.
pub fn kind_of(event: &Event) -> u16 {
    event.kind.as_u16()
}

/// Iterates the values of every tag named `name`.
pub fn tag_values<'a>(event: &'a Event, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    event.tags.iter().filter_map(move |t| {
        let slice = t.as_slice();
        match (slice.first(), slice.get(1)) {
            (Some(n), Some(v)) if n == name => Some(v.as_str()),
            _ => None,
        }
    })
}

/// Returns the first value of the tag named `name`, if present.
pub fn first_tag_value<'a>(event: &'a Event, name: &'a str) -> Option<&'a str> {
    tag_values(event, name).next()
}

/// Returns true iff the tag named `name` is present with the value `"true"`.
pub fn flag_tag(event: &Event, name: &str) -> bool {
    first_tag_value(event, name) == Some("true")
}

/// Builds a tag with an arbitrary name and a single value.
pub fn custom_tag(name: &str, value: impl Into<String>) -> Tag {
    Tag::custom(TagKind::custom(name.to_string()), [value.into()])
}

/// Builds an `e` tag referencing an event id.
pub fn event_ref_tag(id: &EventId) -> Tag {
    Tag::event(*id)
}

/// Builds a `p` tag referencing a public key.
pub fn pubkey_ref_tag(pk: &PublicKey) -> Tag {
    Tag::public_key(*pk)
}

/// Returns true iff the event was created within `window_secs` of `now`.
///
/// Subscriptions already push `since` to the relay; this is the local check
/// applied to anything that slips through.
pub fn is_fresh(event: &Event, now: Timestamp, window_secs: u64) -> bool {
    event.created_at.as_u64() + window_secs >= now.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Keys, Kind};

    fn sample_event() -> Event {
        let keys = Keys::generate();
        EventBuilder::new(Kind::Custom(kind::ASK), "hello")
            .tags([
                Tag::hashtag("demo"),
                custom_tag(tag::FORMAT, "text"),
                custom_tag(tag::STREAM_FLAG, "true"),
            ])
            .sign_with_keys(&keys)
            .unwrap()
    }

    #[test]
    fn reads_tags_by_name() {
        let event = sample_event();
        assert_eq!(kind_of(&event), kind::ASK);
        assert_eq!(first_tag_value(&event, tag::HASHTAG), Some("demo"));
        assert_eq!(first_tag_value(&event, tag::FORMAT), Some("text"));
        assert!(flag_tag(&event, tag::STREAM_FLAG));
        assert!(!flag_tag(&event, tag::METHOD));
        assert_eq!(tag_values(&event, tag::HASHTAG).count(), 1);
    }
}
