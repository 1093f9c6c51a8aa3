//! Gamble-Guard Detection Library
//!
//! Real-time gambling-transaction detection: webhook ingestion with HMAC
//! authentication and idempotency, multi-band feature extraction, and a
//! multi-head classifier driving intervention decisions.

pub mod config;
pub mod features;
pub mod intervention;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod publisher;
pub mod signature;
pub mod store;
pub mod types;
pub mod webhook;

pub use config::AppConfig;
pub use features::{FeatureExtractor, FeatureVector, HistoricalContext};
pub use intervention::InterventionPolicy;
pub use model::RiskClassifier;
pub use pipeline::TransactionPipeline;
pub use publisher::InterventionPublisher;
pub use signature::SignatureValidator;
pub use store::{MemoryStore, TransactionStore};
pub use types::{ClassificationResult, InterventionRecord, Transaction};
