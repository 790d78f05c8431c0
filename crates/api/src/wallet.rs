// Path: crates/api/src/wallet.rs
//! The opaque Lightning wallet seam.

use async_trait::async_trait;
use sensei_types::error::PaymentError;
use std::time::Duration;

/// A Lightning wallet: produces invoices, pays invoices, verifies preimages.
///
/// The wallet protocol itself is out of scope; implementations may proxy to
/// NWC, LND, or anything else. Amounts are integer satoshis throughout.
#[async_trait]
pub trait LightningWallet: Send + Sync {
    /// Creates a BOLT-11 invoice for `amount_sats` with the given expiry.
    async fn create_invoice(
        &self,
        amount_sats: u64,
        description: &str,
        expiry: Duration,
    ) -> Result<String, PaymentError>;

    /// Pays a BOLT-11 invoice and returns the hex payment preimage.
    async fn pay_invoice(&self, bolt11: &str) -> Result<String, PaymentError>;

    /// Verifies that `preimage` settles `bolt11`.
    async fn verify_payment(&self, bolt11: &str, preimage: &str) -> Result<bool, PaymentError>;
}
