// Path: crates/test_utils/src/invoice.rs
//! Signed BOLT-11 invoice fixtures.
//!
//! The payment gate parses real invoices, so the fixtures must be genuinely
//! signed. The node key is throwaway; only the payment hash and amount
//! matter to the tests.

use bitcoin::hashes::{sha256, Hash};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};
use rand::RngCore;
use secp256k1::{Secp256k1, SecretKey};
use std::time::Duration;

/// Builds a signed BOLT-11 invoice for `amount_sats` whose payment hash
/// commits to `preimage`.
pub fn signed_invoice(
    amount_sats: u64,
    description: &str,
    preimage: &[u8; 32],
    expiry: Duration,
) -> String {
    let secp = Secp256k1::new();
    let node_key = SecretKey::new(&mut rand::thread_rng());
    let payment_hash = sha256::Hash::hash(preimage);
    let mut payment_secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut payment_secret);

    InvoiceBuilder::new(Currency::Bitcoin)
        .description(description.to_string())
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret(payment_secret))
        .amount_milli_satoshis(amount_sats * 1000)
        .current_timestamp()
        .min_final_cltv_expiry_delta(144)
        .expiry_time(expiry)
        .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &node_key))
        .expect("fixture invoice must build")
        .to_string()
}

/// A random 32-byte preimage.
pub fn random_preimage() -> [u8; 32] {
    let mut preimage = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut preimage);
    preimage
}
