//! Per-transaction processing pipeline
//!
//! Each webhook event is an isolated unit of work. The ordering invariant
//! inside one transaction is fixed: duplicate and whitelist checks, then
//! feature extraction and classification, then persistence, then alerting.
//! Nothing is alerted before the store write succeeds, and a concurrent
//! duplicate delivery resolves to exactly one stored record and at most one
//! alert.

use crate::features::{ContextProvider, FeatureExtractor};
use crate::intervention::InterventionPolicy;
use crate::metrics::PipelineMetrics;
use crate::model::{ModelInfo, RiskClassifier};
use crate::publisher::InterventionPublisher;
use crate::store::{InsertOutcome, StoreError, StoredTransaction, TransactionStore};
use crate::types::{ClassificationResult, Transaction};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Failures that abort processing and surface as HTTP 500.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to one delivered event.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// The transaction id was already on record; idempotent no-op
    Duplicate,
    Processed {
        whitelisted: bool,
        alerted: bool,
        classification: Option<ClassificationResult>,
    },
}

/// The wired-up detection pipeline shared across webhook requests.
pub struct TransactionPipeline {
    store: Arc<dyn TransactionStore>,
    context: Arc<dyn ContextProvider>,
    extractor: FeatureExtractor,
    classifier: Arc<RiskClassifier>,
    policy: InterventionPolicy,
    metrics: Arc<PipelineMetrics>,
    publisher: Option<InterventionPublisher>,
}

impl TransactionPipeline {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        context: Arc<dyn ContextProvider>,
        classifier: Arc<RiskClassifier>,
        policy: InterventionPolicy,
        metrics: Arc<PipelineMetrics>,
        publisher: Option<InterventionPublisher>,
    ) -> Self {
        Self {
            store,
            context,
            extractor: FeatureExtractor::new(),
            classifier,
            policy,
            metrics,
            publisher,
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        self.classifier.model_info()
    }

    /// Process one validated transaction event.
    pub async fn process(&self, transaction: Transaction) -> Result<ProcessOutcome, PipelineError> {
        let started = Instant::now();
        let tx_id = transaction.transaction_id.clone();

        if self.store.exists(&tx_id)? {
            self.metrics.record_duplicate();
            debug!(transaction_id = %tx_id, "Duplicate delivery skipped");
            return Ok(ProcessOutcome::Duplicate);
        }

        // Whitelist infrastructure failure fails safe to "not whitelisted":
        // showing a spurious alert beats silently suppressing a real one
        let whitelisted = match self.store.is_whitelisted(&transaction.payee) {
            Ok(whitelisted) => whitelisted,
            Err(e) => {
                warn!(
                    transaction_id = %tx_id,
                    error = %e,
                    "Whitelist lookup failed, treating payee as not whitelisted"
                );
                false
            }
        };

        let classification = if whitelisted {
            None
        } else {
            let context = self.context.context_for(&transaction);
            let features = self.extractor.extract(&transaction, &context);
            match self.classifier.predict(&features) {
                Ok(result) => Some(result),
                Err(e) => {
                    self.metrics.record_inference_failure();
                    error!(
                        transaction_id = %tx_id,
                        error = %e,
                        "Classification failed, failing toward alert"
                    );
                    None
                }
            }
        };

        // Persist before deciding or publishing anything: no alert may ever
        // reference a transaction that was not durably recorded
        let stored = StoredTransaction {
            transaction: transaction.clone(),
            whitelisted,
            classification: classification.clone(),
            stored_at: Utc::now(),
        };
        if self.store.insert(stored)? == InsertOutcome::Duplicate {
            // A concurrent delivery won the insert race
            self.metrics.record_duplicate();
            debug!(transaction_id = %tx_id, "Lost duplicate insert race, skipping");
            return Ok(ProcessOutcome::Duplicate);
        }

        let record = self
            .policy
            .decide(&transaction, classification.as_ref(), whitelisted);
        self.store.record_intervention(record.clone())?;

        if whitelisted {
            self.metrics.record_whitelisted();
        }
        let confidence = classification
            .as_ref()
            .map(|c| c.gambling_confidence)
            .unwrap_or(0.0);
        self.metrics.record_transaction(started.elapsed(), confidence);

        if record.alert {
            self.metrics.record_alert(record.rationale.label());
            info!(
                transaction_id = %tx_id,
                payee = %transaction.payee,
                rationale = record.rationale.label(),
                gambling_confidence = confidence,
                relapse_risk = record.relapse_risk,
                processing_time_us = started.elapsed().as_micros(),
                "Intervention alert raised"
            );
        } else {
            debug!(
                transaction_id = %tx_id,
                rationale = record.rationale.label(),
                gambling_confidence = confidence,
                "Transaction processed without alert"
            );
        }

        // Best-effort: the record is durable, collaborators can catch up
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(&record).await {
                error!(
                    intervention_id = %record.intervention_id,
                    error = %e,
                    "Failed to publish intervention record"
                );
            }
        }

        Ok(ProcessOutcome::Processed {
            whitelisted,
            alerted: record.alert,
            classification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::NeutralContextProvider;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn transaction(id: &str, payee: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            amount_minor: -5000,
            payee: payee.to_string(),
            raw_text: payee.to_string(),
            posted_at: Utc::now(),
            balance_minor: Some(100_000),
        }
    }

    fn pipeline_with(
        store: Arc<MemoryStore>,
        dir: &tempfile::TempDir,
    ) -> TransactionPipeline {
        TransactionPipeline::new(
            store,
            Arc::new(NeutralContextProvider),
            Arc::new(RiskClassifier::from_path(dir.path().join("model.json"))),
            InterventionPolicy::default(),
            Arc::new(PipelineMetrics::new()),
            None,
        )
    }

    #[tokio::test]
    async fn test_processing_stores_and_decides() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(store.clone(), &dir);

        let outcome = pipeline
            .process(transaction("tx_1", "Sportsbet"))
            .await
            .unwrap();

        assert!(matches!(outcome, ProcessOutcome::Processed { .. }));
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(store.interventions().len(), 1);

        let stored = store.get("tx_1").unwrap();
        assert!(!stored.whitelisted);
        assert!(stored.classification.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(store.clone(), &dir);

        pipeline
            .process(transaction("tx_1", "Sportsbet"))
            .await
            .unwrap();
        let second = pipeline
            .process(transaction("tx_1", "Sportsbet"))
            .await
            .unwrap();

        assert!(matches!(second, ProcessOutcome::Duplicate));
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(store.interventions().len(), 1);
    }

    #[tokio::test]
    async fn test_whitelisted_payee_never_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::with_whitelist(["Woolworths"]));
        let pipeline = pipeline_with(store.clone(), &dir);

        let outcome = pipeline
            .process(transaction("tx_w", "Woolworths Metro"))
            .await
            .unwrap();

        match outcome {
            ProcessOutcome::Processed {
                whitelisted,
                alerted,
                classification,
            } => {
                assert!(whitelisted);
                assert!(!alerted);
                assert!(classification.is_none());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let stored = store.get("tx_w").unwrap();
        assert!(stored.whitelisted);
        assert_eq!(store.alert_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_alert_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(pipeline_with(store.clone(), &dir));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                pipeline.process(transaction("tx_race", "Sportsbet")).await
            }));
        }

        let mut processed = 0;
        for handle in handles {
            if let ProcessOutcome::Processed { .. } = handle.await.unwrap().unwrap() {
                processed += 1;
            }
        }

        assert_eq!(processed, 1);
        assert_eq!(store.transaction_count(), 1);
        assert!(store.interventions().len() <= 1);
    }
}
