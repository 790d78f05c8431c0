// Path: crates/client/src/handlers.rs
//! The quote/pay decision seam.

use async_trait::async_trait;
use nostr::EventId;
use sensei_api::wallet::LightningWallet;
use sensei_payment::{payment_proof, PaymentPolicy};
use sensei_types::error::ProtocolError;
use sensei_types::payload::{InvoiceRecord, ProofPayload};
use std::sync::Arc;

/// Decides whether to pay a quote and produces the proof.
///
/// Both callbacks must be cancellation-safe: an abandoned await frees
/// whatever it held. Returning `Ok(false)` from `on_quote`, or any error
/// from either callback, makes the client send an error proof so the expert
/// releases its state immediately.
#[async_trait]
pub trait QuoteHandler: Send + Sync {
    /// Inspect a validated quote; `true` proceeds to payment.
    async fn on_quote(
        &self,
        invoices: &[InvoiceRecord],
        prompt_id: &EventId,
    ) -> Result<bool, ProtocolError>;

    /// Pay and return the proof payload.
    async fn on_pay(
        &self,
        invoices: &[InvoiceRecord],
        prompt_id: &EventId,
    ) -> Result<ProofPayload, ProtocolError>;
}

/// The default paying handler: accept anything within the policy ceiling,
/// pay over the wallet, and prove with the returned preimage.
pub struct PayingQuoteHandler<W> {
    wallet: Arc<W>,
    policy: PaymentPolicy,
}

impl<W> PayingQuoteHandler<W> {
    /// Creates a handler paying through `wallet` within `policy`.
    pub fn new(wallet: Arc<W>, policy: PaymentPolicy) -> Self {
        Self { wallet, policy }
    }
}

#[async_trait]
impl<W: LightningWallet> QuoteHandler for PayingQuoteHandler<W> {
    async fn on_quote(
        &self,
        invoices: &[InvoiceRecord],
        _prompt_id: &EventId,
    ) -> Result<bool, ProtocolError> {
        self.policy.select(invoices)?;
        Ok(true)
    }

    async fn on_pay(
        &self,
        invoices: &[InvoiceRecord],
        _prompt_id: &EventId,
    ) -> Result<ProofPayload, ProtocolError> {
        let record = self.policy.select(invoices)?;
        let preimage = self.wallet.pay_invoice(&record.invoice).await?;
        Ok(payment_proof(preimage))
    }
}
