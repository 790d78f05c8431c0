// Path: crates/crypto/src/keys.rs
//! Key rings for long-term and ephemeral identities.

use crate::error::CryptoError;
use nostr::{Keys, PublicKey, SecretKey};

/// A signing/decryption key pair.
///
/// One keyring per scope: an expert's long-term identity, or the ephemeral
/// pair minted for a single ask, bid envelope, prompt, or stream writer.
/// Ephemeral rings must never be reused across scopes. The secret key never
/// leaves this module: sealing and signing take a `&Keyring`, plaintext
/// buffers derived from it travel in zeroizing wrappers, and the ring itself
/// lives exactly as long as its exchange.
#[derive(Clone)]
pub struct Keyring {
    keys: Keys,
}

impl Keyring {
    /// Mints a fresh key pair.
    pub fn generate() -> Self {
        Self {
            keys: Keys::generate(),
        }
    }

    /// Restores a keyring from a hex or bech32 secret key.
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        let secret_key =
            SecretKey::parse(secret).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            keys: Keys::new(secret_key),
        })
    }

    /// The public half of this ring.
    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    pub(crate) fn keys(&self) -> &Keys {
        &self.keys
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        self.keys.secret_key()
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose secret material through Debug.
        f.debug_struct("Keyring")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_rings_are_distinct() {
        let a = Keyring::generate();
        let b = Keyring::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn debug_hides_secret_material() {
        let ring = Keyring::generate();
        let rendered = format!("{ring:?}");
        assert!(rendered.contains("public_key"));
        assert!(!rendered.contains(&ring.secret_key().to_secret_hex()));
    }
}
