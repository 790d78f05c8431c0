// Path: crates/payment/src/gate.rs
//! BOLT-11 validation and proof construction.

use bitcoin::hashes::{sha256, Hash};
use lightning_invoice::Bolt11Invoice;
use sensei_types::error::PaymentError;
use sensei_types::model::PaymentMethod;
use sensei_types::payload::{InvoiceRecord, ProofPayload};
use std::str::FromStr;

/// Parses a BOLT-11 invoice. Malformed invoices are a rejection, not a
/// wallet failure: the quote that carried them is unacceptable.
pub fn parse_invoice(bolt11: &str) -> Result<Bolt11Invoice, PaymentError> {
    Bolt11Invoice::from_str(bolt11)
        .map_err(|e| PaymentError::Rejected(format!("Malformed invoice: {e}")))
}

/// Extracts the encoded amount in whole satoshis.
pub fn invoice_amount_sats(invoice: &Bolt11Invoice) -> Result<u64, PaymentError> {
    invoice
        .amount_milli_satoshis()
        .map(|msat| msat / 1000)
        .ok_or_else(|| PaymentError::Rejected("Invoice carries no amount".into()))
}

/// Validates a quote's invoices: every Lightning invoice must parse and its
/// encoded amount must equal the stated `amount` field.
pub fn validate_quote(invoices: &[InvoiceRecord]) -> Result<(), PaymentError> {
    for record in invoices {
        if record.method != PaymentMethod::Lightning {
            continue;
        }
        let parsed = parse_invoice(&record.invoice)?;
        let encoded = invoice_amount_sats(&parsed)?;
        if encoded != record.amount {
            return Err(PaymentError::Rejected(format!(
                "Invoice amount mismatch: expected {} sats, but invoice contains {} sats",
                record.amount, encoded
            )));
        }
    }
    Ok(())
}

/// The client's default acceptance policy: a Lightning invoice must exist
/// and its encoded amount must not exceed the configured ceiling.
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    /// The most the client will pay for one prompt, in satoshis.
    pub max_amount_sats: u64,
}

impl PaymentPolicy {
    /// Picks the invoice this policy is willing to pay.
    pub fn select(&self, invoices: &[InvoiceRecord]) -> Result<InvoiceRecord, PaymentError> {
        let record = invoices
            .iter()
            .find(|r| r.method == PaymentMethod::Lightning)
            .ok_or_else(|| PaymentError::Rejected("No lightning invoice in quote".into()))?;
        let parsed = parse_invoice(&record.invoice)?;
        let encoded = invoice_amount_sats(&parsed)?;
        if encoded > self.max_amount_sats {
            return Err(PaymentError::Rejected(format!(
                "Invoice amount {} sats exceeds the {} sats limit",
                encoded, self.max_amount_sats
            )));
        }
        Ok(record.clone())
    }
}

/// Checks a preimage against the invoice's payment hash locally, without
/// consulting the wallet.
pub fn verify_preimage(bolt11: &str, preimage_hex: &str) -> Result<bool, PaymentError> {
    let invoice = parse_invoice(bolt11)?;
    let preimage = hex::decode(preimage_hex)
        .map_err(|_| PaymentError::Failed("preimage is not valid hex".into()))?;
    Ok(sha256::Hash::hash(&preimage) == *invoice.payment_hash())
}

/// Builds the proof payload for a settled Lightning payment.
pub fn payment_proof(preimage: String) -> ProofPayload {
    ProofPayload::Payment {
        method: PaymentMethod::Lightning,
        preimage,
    }
}

/// Builds the proof payload a client sends when it refuses to pay, letting
/// the expert release its per-prompt state immediately.
pub fn error_proof(reason: impl Into<String>) -> ProofPayload {
    ProofPayload::Error {
        error: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensei_test_utils::invoice::{random_preimage, signed_invoice};
    use std::time::Duration;

    fn record(amount: u64, bolt11: String) -> InvoiceRecord {
        InvoiceRecord {
            method: PaymentMethod::Lightning,
            unit: "sat".into(),
            amount,
            invoice: bolt11,
        }
    }

    #[test]
    fn matching_amounts_validate() {
        let bolt11 = signed_invoice(10, "q", &random_preimage(), Duration::from_secs(120));
        validate_quote(&[record(10, bolt11)]).unwrap();
    }

    #[test]
    fn amount_mismatch_is_rejected_with_the_exact_message() {
        let bolt11 = signed_invoice(20, "q", &random_preimage(), Duration::from_secs(120));
        let err = validate_quote(&[record(10, bolt11)]).unwrap_err();
        match err {
            PaymentError::Rejected(message) => assert_eq!(
                message,
                "Invoice amount mismatch: expected 10 sats, but invoice contains 20 sats"
            ),
            PaymentError::Failed(_) => panic!("wrong kind"),
        }
    }

    #[test]
    fn malformed_invoices_are_rejected() {
        let err = validate_quote(&[record(10, "lnbc-definitely-not".into())]).unwrap_err();
        assert!(matches!(err, PaymentError::Rejected(_)));
    }

    #[test]
    fn policy_enforces_the_ceiling() {
        let policy = PaymentPolicy {
            max_amount_sats: 15,
        };
        let cheap = signed_invoice(10, "q", &random_preimage(), Duration::from_secs(120));
        policy.select(&[record(10, cheap)]).unwrap();

        let pricey = signed_invoice(50, "q", &random_preimage(), Duration::from_secs(120));
        assert!(policy.select(&[record(50, pricey)]).is_err());
    }

    #[test]
    fn preimage_verification_is_local() {
        let preimage = random_preimage();
        let bolt11 = signed_invoice(10, "q", &preimage, Duration::from_secs(120));
        assert!(verify_preimage(&bolt11, &hex::encode(preimage)).unwrap());
        assert!(!verify_preimage(&bolt11, &hex::encode([0u8; 32])).unwrap());
    }
}
