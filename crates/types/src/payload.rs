// Path: crates/types/src/payload.rs
//! Encrypted payload schemas.
//!
//! These are the JSON bodies carried inside event content after decryption.
//! Their shapes are fixed by the wire protocol; parsing failures surface as
//! [`ProtocolError::InvalidEvent`] because a malformed payload from an
//! authenticated peer is a trust-boundary violation, not a local bug.

use crate::error::ProtocolError;
use crate::model::{Format, PaymentMethod};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The decrypted body of a non-streamed prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPayload {
    /// The format the payload is expressed in.
    pub format: Format,
    /// The question itself; a string for `text`, an object for `openai`.
    pub payload: Value,
}

/// One priced invoice inside a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// The payment method this invoice belongs to.
    pub method: PaymentMethod,
    /// The denomination of `amount`. Always `"sat"` for Lightning.
    pub unit: String,
    /// The stated amount, in integer satoshis for Lightning.
    pub amount: u64,
    /// The raw invoice, a BOLT-11 string for Lightning.
    pub invoice: String,
}

/// The decrypted body of a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuotePayload {
    /// The expert declined or failed to price the prompt.
    Error {
        /// Short code and message, never a stack trace.
        error: String,
    },
    /// One invoice per payment method the expert supports.
    Invoices {
        /// The priced invoices.
        invoices: Vec<InvoiceRecord>,
    },
}

/// The decrypted body of a proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProofPayload {
    /// The client aborted after receiving the quote; the expert releases its
    /// per-prompt state immediately instead of waiting for the timeout.
    Error {
        /// The client's stated reason.
        error: String,
    },
    /// A claim of payment.
    Payment {
        /// The method the invoice was paid over.
        method: PaymentMethod,
        /// The hex payment preimage.
        preimage: String,
    },
}

/// The decrypted body of a non-streamed reply.
///
/// The wire form allows `payload` or `error`; this view enforces that exactly
/// one of the two is present.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    /// The answer content.
    Content {
        /// The answer; a string for `text`, an object for `openai`.
        payload: Value,
        /// Whether this is the final reply item.
        done: bool,
    },
    /// The expert's reply pipeline failed after payment verification.
    Error {
        /// Short code and message.
        error: String,
    },
}

#[derive(Serialize, Deserialize)]
struct RawReplyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
}

impl ReplyPayload {
    /// Parses and validates a decrypted reply body.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let raw: RawReplyPayload = serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::InvalidEvent(format!("malformed reply payload: {e}")))?;
        match (raw.payload, raw.error) {
            (Some(payload), None) => Ok(Self::Content {
                payload,
                done: raw.done.unwrap_or(true),
            }),
            (None, Some(error)) => Ok(Self::Error { error }),
            (Some(_), Some(_)) => Err(ProtocolError::InvalidEvent(
                "reply payload carries both payload and error".into(),
            )),
            (None, None) => Err(ProtocolError::InvalidEvent(
                "reply payload carries neither payload nor error".into(),
            )),
        }
    }

    /// Serializes the reply body to its wire JSON.
    pub fn to_json(&self) -> String {
        let raw = match self {
            Self::Content { payload, done } => RawReplyPayload {
                payload: Some(payload.clone()),
                error: None,
                done: Some(*done),
            },
            Self::Error { error } => RawReplyPayload {
                payload: None,
                error: Some(error.clone()),
                done: None,
            },
        };
        // RawReplyPayload has no non-serializable fields.
        serde_json::to_string(&raw).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_payload_discriminates_error_from_invoices() {
        let q: QuotePayload = serde_json::from_str(r#"{"error":"busy"}"#).unwrap();
        assert!(matches!(q, QuotePayload::Error { .. }));

        let q: QuotePayload = serde_json::from_str(
            r#"{"invoices":[{"method":"lightning","unit":"sat","amount":10,"invoice":"lnbc..."}]}"#,
        )
        .unwrap();
        match q {
            QuotePayload::Invoices { invoices } => {
                assert_eq!(invoices.len(), 1);
                assert_eq!(invoices[0].amount, 10);
            }
            QuotePayload::Error { .. } => panic!("parsed as error"),
        }
    }

    #[test]
    fn proof_payload_roundtrip() {
        let p = ProofPayload::Payment {
            method: PaymentMethod::Lightning,
            preimage: "00ff".into(),
        };
        let s = serde_json::to_string(&p).unwrap();
        let back: ProofPayload = serde_json::from_str(&s).unwrap();
        assert!(matches!(back, ProofPayload::Payment { .. }));
    }

    #[test]
    fn reply_payload_requires_exactly_one_of_payload_or_error() {
        let ok = ReplyPayload::parse(br#"{"payload":"pong","done":true}"#).unwrap();
        assert_eq!(
            ok,
            ReplyPayload::Content {
                payload: json!("pong"),
                done: true
            }
        );

        let err = ReplyPayload::parse(br#"{"error":"boom"}"#).unwrap();
        assert!(matches!(err, ReplyPayload::Error { .. }));

        assert!(ReplyPayload::parse(br#"{"payload":"x","error":"y"}"#).is_err());
        assert!(ReplyPayload::parse(br#"{}"#).is_err());
    }

    #[test]
    fn reply_payload_done_defaults_to_true() {
        match ReplyPayload::parse(br#"{"payload":"pong"}"#).unwrap() {
            ReplyPayload::Content { done, .. } => assert!(done),
            ReplyPayload::Error { .. } => panic!("parsed as error"),
        }
    }
}
