// Path: crates/test_utils/src/wallet.rs
//! A mock Lightning wallet over a shared in-memory payment ledger.

use crate::invoice::{random_preimage, signed_invoice};
use async_trait::async_trait;
use bitcoin::hashes::{sha256, Hash};
use dashmap::DashMap;
use lightning_invoice::Bolt11Invoice;
use sensei_api::wallet::LightningWallet;
use sensei_types::error::PaymentError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// The shared settlement fabric: payment hash (hex) to preimage (hex).
///
/// An expert wallet records invoices here; a client wallet "pays" by looking
/// the preimage up, standing in for the Lightning network.
#[derive(Clone, Default)]
pub struct PaymentLedger {
    preimages: Arc<DashMap<String, String>>,
}

impl PaymentLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

/// A wallet participating in one [`PaymentLedger`].
pub struct MockWallet {
    ledger: PaymentLedger,
    refuse_payments: bool,
}

impl MockWallet {
    /// A wallet that settles every known invoice.
    pub fn new(ledger: PaymentLedger) -> Self {
        Self {
            ledger,
            refuse_payments: false,
        }
    }

    /// A wallet whose `pay_invoice` always fails, for failure-path tests.
    pub fn refusing(ledger: PaymentLedger) -> Self {
        Self {
            ledger,
            refuse_payments: true,
        }
    }
}

fn parse(bolt11: &str) -> Result<Bolt11Invoice, PaymentError> {
    Bolt11Invoice::from_str(bolt11).map_err(|e| PaymentError::Failed(format!("bad invoice: {e}")))
}

#[async_trait]
impl LightningWallet for MockWallet {
    async fn create_invoice(
        &self,
        amount_sats: u64,
        description: &str,
        expiry: Duration,
    ) -> Result<String, PaymentError> {
        let preimage = random_preimage();
        let bolt11 = signed_invoice(amount_sats, description, &preimage, expiry);
        let payment_hash = sha256::Hash::hash(&preimage);
        self.ledger
            .preimages
            .insert(payment_hash.to_string(), hex::encode(preimage));
        Ok(bolt11)
    }

    async fn pay_invoice(&self, bolt11: &str) -> Result<String, PaymentError> {
        if self.refuse_payments {
            return Err(PaymentError::Failed("wallet refused payment".into()));
        }
        let invoice = parse(bolt11)?;
        let payment_hash = invoice.payment_hash().to_string();
        self.ledger
            .preimages
            .get(&payment_hash)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PaymentError::Failed("no route to invoice".into()))
    }

    async fn verify_payment(&self, bolt11: &str, preimage: &str) -> Result<bool, PaymentError> {
        let invoice = parse(bolt11)?;
        let preimage_bytes =
            hex::decode(preimage).map_err(|_| PaymentError::Failed("bad preimage hex".into()))?;
        Ok(sha256::Hash::hash(&preimage_bytes) == *invoice.payment_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoice_pays_and_verifies_through_the_ledger() {
        let ledger = PaymentLedger::new();
        let expert_wallet = MockWallet::new(ledger.clone());
        let client_wallet = MockWallet::new(ledger);

        let bolt11 = expert_wallet
            .create_invoice(10, "answer", Duration::from_secs(120))
            .await
            .unwrap();
        let preimage = client_wallet.pay_invoice(&bolt11).await.unwrap();
        assert!(expert_wallet.verify_payment(&bolt11, &preimage).await.unwrap());
        assert!(!expert_wallet.verify_payment(&bolt11, "00").await.is_ok_and(|ok| ok));
    }

    #[tokio::test]
    async fn unknown_invoices_do_not_pay() {
        let ledger = PaymentLedger::new();
        let wallet = MockWallet::new(ledger);
        let foreign = signed_invoice(5, "elsewhere", &random_preimage(), Duration::from_secs(60));
        assert!(wallet.pay_invoice(&foreign).await.is_err());
    }
}
