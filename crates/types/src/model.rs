// Path: crates/types/src/model.rs
//! Closed protocol vocabularies.
//!
//! Each of these enums has a fixed wire spelling; unknown spellings observed
//! on a subscription are dropped by the caller rather than failing the
//! exchange, so `FromStr` returns the raw input on error for logging.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The serialization format of a prompt or reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Plain UTF-8 text.
    Text,
    /// An OpenAI-style chat-completion request/response object.
    Openai,
}

impl Format {
    /// The wire spelling of this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Openai => "openai",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "openai" => Ok(Self::Openai),
            other => Err(other.to_string()),
        }
    }
}

/// A supported payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Lightning network BOLT-11 invoices, amounts in integer satoshis.
    Lightning,
}

impl PaymentMethod {
    /// The wire spelling of this payment method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lightning => "lightning",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lightning" => Ok(Self::Lightning),
            other => Err(other.to_string()),
        }
    }
}

/// The compression method applied to a payload or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    /// Pass-through, no compression.
    #[default]
    None,
    /// Incremental gzip.
    Gzip,
}

impl CompressionMethod {
    /// The wire spelling of this compression method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
        }
    }
}

impl FromStr for CompressionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(other.to_string()),
        }
    }
}

/// The per-chunk encryption scheme of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionScheme {
    /// Plaintext chunks.
    #[default]
    None,
    /// NIP-44 v2 authenticated encryption between the stream key and the
    /// receiver.
    Nip44,
}

impl EncryptionScheme {
    /// The wire spelling of this encryption scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Nip44 => "nip44",
        }
    }
}

impl FromStr for EncryptionScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "nip44" => Ok(Self::Nip44),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_spellings_roundtrip() {
        for f in [Format::Text, Format::Openai] {
            assert_eq!(f.as_str().parse::<Format>().unwrap(), f);
        }
        assert_eq!("gzip".parse::<CompressionMethod>().unwrap(), CompressionMethod::Gzip);
        assert_eq!("nip44".parse::<EncryptionScheme>().unwrap(), EncryptionScheme::Nip44);
        assert!("zstd".parse::<CompressionMethod>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Format::Openai).unwrap(), "\"openai\"");
        assert_eq!(
            serde_json::from_str::<PaymentMethod>("\"lightning\"").unwrap(),
            PaymentMethod::Lightning
        );
    }
}
