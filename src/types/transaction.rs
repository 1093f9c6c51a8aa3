//! Transaction data structures and the webhook wire envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized bank transaction extracted from a webhook event.
///
/// Immutable once stored; the provider transaction id doubles as the
/// idempotency key at the store boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Provider transaction identifier (unique, idempotency key)
    pub transaction_id: String,

    /// Signed amount in currency minor units (negative = debit)
    pub amount_minor: i64,

    /// Payee description as reported by the bank
    pub payee: String,

    /// Raw transaction text before any cleanup
    pub raw_text: String,

    /// When the transaction was created at the provider
    pub posted_at: DateTime<Utc>,

    /// Account balance snapshot in minor units, when the provider supplies one
    pub balance_minor: Option<i64>,
}

impl Transaction {
    /// Absolute amount in major currency units.
    pub fn amount_major(&self) -> f64 {
        self.amount_minor.unsigned_abs() as f64 / 100.0
    }
}

/// Recognized webhook event kinds.
///
/// Anything the pipeline does not handle maps to `Other` and is acknowledged
/// without processing so the provider does not retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TransactionCreated,
    Other,
}

impl EventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "transaction.created" => EventKind::TransactionCreated,
            _ => EventKind::Other,
        }
    }
}

/// Webhook event envelope as delivered by the provider.
///
/// Providers differ on whether the transaction arrives as a nested resource
/// or inline beside the event type; both shapes are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(alias = "eventType", alias = "event", alias = "type")]
    pub event_type: String,

    #[serde(default, alias = "data")]
    pub transaction: Option<TransactionPayload>,

    #[serde(flatten)]
    inline: TransactionPayload,
}

impl WebhookEnvelope {
    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    /// The transaction resource, preferring the nested form.
    pub fn into_payload(self) -> TransactionPayload {
        self.transaction.unwrap_or(self.inline)
    }
}

/// Inline transaction resource inside the envelope.
///
/// Every field except the id is optional; normalization substitutes
/// documented defaults instead of failing the event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionPayload {
    #[serde(default, alias = "transactionId")]
    pub id: Option<String>,

    /// Amount in major currency units as reported on the wire
    #[serde(default)]
    pub amount: Option<f64>,

    #[serde(default, alias = "payee")]
    pub description: Option<String>,

    #[serde(default, alias = "rawText")]
    pub raw_text: Option<String>,

    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub balance: Option<f64>,
}

impl TransactionPayload {
    /// Normalize the wire payload into a `Transaction`.
    ///
    /// A missing transaction id is a hard rejection; a missing amount
    /// defaults to zero and a missing description to "Unknown".
    pub fn normalize(self) -> Result<Transaction, MissingTransactionId> {
        let transaction_id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(MissingTransactionId),
        };

        let description = self
            .description
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(Transaction {
            transaction_id,
            amount_minor: self.amount.map(to_minor_units).unwrap_or(0),
            raw_text: self.raw_text.unwrap_or_else(|| description.clone()),
            payee: description,
            posted_at: self.created_at.unwrap_or_else(Utc::now),
            balance_minor: self.balance.map(to_minor_units),
        })
    }
}

fn to_minor_units(major: f64) -> i64 {
    (major * 100.0).round() as i64
}

/// The envelope carried no usable transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingTransactionId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_parse() {
        assert_eq!(
            EventKind::parse("transaction.created"),
            EventKind::TransactionCreated
        );
        assert_eq!(EventKind::parse("transaction.updated"), EventKind::Other);
        assert_eq!(EventKind::parse(""), EventKind::Other);
    }

    #[test]
    fn test_normalize_defaults() {
        let payload = TransactionPayload {
            id: Some("tx_1".to_string()),
            ..Default::default()
        };

        let tx = payload.normalize().unwrap();
        assert_eq!(tx.transaction_id, "tx_1");
        assert_eq!(tx.amount_minor, 0);
        assert_eq!(tx.payee, "Unknown");
    }

    #[test]
    fn test_normalize_requires_id() {
        let payload = TransactionPayload {
            amount: Some(50.0),
            description: Some("Sportsbet".to_string()),
            ..Default::default()
        };

        assert!(payload.normalize().is_err());
    }

    #[test]
    fn test_amount_conversion() {
        let payload = TransactionPayload {
            id: Some("tx_2".to_string()),
            amount: Some(-50.0),
            description: Some("Sportsbet".to_string()),
            ..Default::default()
        };

        let tx = payload.normalize().unwrap();
        assert_eq!(tx.amount_minor, -5000);
        assert!((tx.amount_major() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_envelope_with_nested_transaction() {
        let json = r#"{
            "event_type": "transaction.created",
            "transaction": {"id": "tx_3", "amount": 20.0, "description": "TAB"}
        }"#;

        let envelope: WebhookEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.kind(), EventKind::TransactionCreated);
        assert_eq!(envelope.into_payload().id.unwrap(), "tx_3");
    }

    #[test]
    fn test_envelope_with_inline_fields() {
        let json = r#"{
            "event": "transaction.created",
            "id": "tx_4",
            "amount": 50.0,
            "payee": "Sportsbet"
        }"#;

        let envelope: WebhookEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.kind(), EventKind::TransactionCreated);

        let tx = envelope.into_payload().normalize().unwrap();
        assert_eq!(tx.transaction_id, "tx_4");
        assert_eq!(tx.amount_minor, 5000);
        assert_eq!(tx.payee, "Sportsbet");
    }
}
