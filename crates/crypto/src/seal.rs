// Path: crates/crypto/src/seal.rs
//! NIP-44 v2 authenticated sealing.
//!
//! `seal` encrypts from a sender keyring to a receiver public key; `open` is
//! the inverse. The receiver authenticates the sender: opening fails unless
//! the ciphertext was produced under the claimed sender key.

use crate::error::CryptoError;
use crate::keys::Keyring;
use nostr::nips::nip44::{self, Version};
use nostr::PublicKey;
use zeroize::Zeroizing;

/// Encrypts `plaintext` from `sender` to `receiver`.
pub fn seal(
    plaintext: &[u8],
    receiver: &PublicKey,
    sender: &Keyring,
) -> Result<String, CryptoError> {
    nip44::encrypt(sender.secret_key(), receiver, plaintext, Version::V2)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Decrypts a payload sealed by `sender_pub` for `receiver`.
///
/// The plaintext is returned in a zeroizing buffer; callers that keep it
/// longer than one exchange copy what they need out of it.
pub fn open(
    ciphertext: &str,
    sender_pub: &PublicKey,
    receiver: &Keyring,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    nip44::decrypt_to_bytes(receiver.secret_key(), sender_pub, ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decryption)
}

/// Decrypts a payload expected to be UTF-8 text.
pub fn open_string(
    ciphertext: &str,
    sender_pub: &PublicKey,
    receiver: &Keyring,
) -> Result<String, CryptoError> {
    let bytes = open(ciphertext, sender_pub, receiver)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CryptoError::Decryption)
}
