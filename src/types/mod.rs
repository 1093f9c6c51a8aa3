//! Type definitions for the gambling detection pipeline

pub mod classification;
pub mod intervention;
pub mod transaction;

pub use classification::{ClassificationResult, GamblingType, Trigger, TriggerScore};
pub use intervention::{InterventionRecord, Rationale};
pub use transaction::{EventKind, Transaction, TransactionPayload, WebhookEnvelope};
