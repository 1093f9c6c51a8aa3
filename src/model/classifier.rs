//! Stateless inference facade over the shared model handle

use crate::features::FeatureVector;
use crate::model::handle::{ModelBundle, ModelHandle, ModelInfo};
use crate::model::network::{EvalReport, LabeledExample, TrainOptions, TrainingHistory};
use crate::model::ModelError;
use crate::types::{ClassificationResult, GamblingType, Trigger, TriggerScore};
use std::path::PathBuf;
use tracing::info;

/// Number of ranked trigger alternatives reported per prediction.
const TOP_TRIGGERS: usize = 3;

/// Multi-head risk classifier.
///
/// Inference reads the published model snapshot and never mutates it;
/// training builds a replacement in isolation and publishes it wholesale.
pub struct RiskClassifier {
    handle: ModelHandle,
}

impl RiskClassifier {
    pub fn new(handle: ModelHandle) -> Self {
        Self { handle }
    }

    /// Classifier over the artifact at `path`, degrading to an untrained
    /// fallback when the artifact is missing or unreadable.
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(ModelHandle::load_or_fallback(path))
    }

    /// Run the forward pass once and shape the four head outputs into the
    /// collaborator-facing result.
    pub fn predict(&self, features: &FeatureVector) -> Result<ClassificationResult, ModelError> {
        let bundle = self.handle.bundle();
        let out = bundle.network.predict_vector(features)?;

        let is_gambling = out.gambling >= 0.5;

        let (type_index, type_confidence) = argmax(out.type_probs.as_slice().unwrap_or(&[]));
        let gambling_type = if is_gambling {
            GamblingType::from_index(type_index)
        } else {
            None
        };

        let mut ranked: Vec<TriggerScore> = out
            .trigger_probs
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| {
                Trigger::from_index(i).map(|trigger| TriggerScore {
                    trigger,
                    confidence: p as f64,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let primary = ranked.first().map(|t| (t.trigger, t.confidence)).unwrap_or((
            Trigger::Payday,
            0.0,
        ));
        ranked.truncate(TOP_TRIGGERS);

        Ok(ClassificationResult {
            is_gambling,
            gambling_confidence: out.gambling as f64,
            gambling_type,
            type_confidence: type_confidence as f64,
            primary_trigger: primary.0,
            trigger_confidence: primary.1,
            relapse_risk: out.relapse as f64,
            top_triggers: ranked,
        })
    }

    /// Supervised fit: trains a copy of the current network, evaluates it,
    /// and publishes the resulting bundle atomically.
    pub fn train(
        &self,
        examples: &[LabeledExample],
        options: &TrainOptions,
    ) -> Result<TrainingHistory, ModelError> {
        let mut network = self.handle.bundle().network.clone();
        let history = network.train(examples, options)?;
        let report = network.evaluate(examples)?;

        info!(
            examples = examples.len(),
            epochs = options.epochs,
            final_loss = report.loss,
            accuracy = report.accuracy,
            "Training run complete"
        );

        self.handle
            .publish(ModelBundle::from_network(network, Some(report)))?;
        Ok(history)
    }

    /// Offline validation against a labeled set.
    pub fn evaluate(&self, examples: &[LabeledExample]) -> Result<EvalReport, ModelError> {
        self.handle.bundle().network.evaluate(examples)
    }

    /// Read-only model description (version, status, label sets, metrics).
    pub fn model_info(&self) -> ModelInfo {
        self.handle.info()
    }
}

fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, &v) in values.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    if best.1.is_finite() {
        best
    } else {
        (0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureExtractor, HistoricalContext};
    use crate::types::Transaction;
    use chrono::{TimeZone, Utc};

    fn vector_for(payee: &str) -> FeatureVector {
        let tx = Transaction {
            transaction_id: "tx_clf".to_string(),
            amount_minor: -5000,
            payee: payee.to_string(),
            raw_text: payee.to_string(),
            posted_at: Utc.with_ymd_and_hms(2024, 3, 15, 23, 30, 0).unwrap(),
            balance_minor: Some(80_000),
        };
        FeatureExtractor::new().extract(&tx, &HistoricalContext::default())
    }

    fn untrained_classifier(dir: &tempfile::TempDir) -> RiskClassifier {
        RiskClassifier::from_path(dir.path().join("model.json"))
    }

    #[test]
    fn test_untrained_model_returns_well_formed_result() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(&dir);

        assert!(classifier.model_info().degraded);

        let result = classifier.predict(&vector_for("Sportsbet")).unwrap();
        assert!((0.0..=1.0).contains(&result.gambling_confidence));
        assert!((0.0..=1.0).contains(&result.relapse_risk));
        assert_eq!(result.top_triggers.len(), TOP_TRIGGERS);
        assert!(result.top_triggers[0].confidence >= result.top_triggers[1].confidence);
        assert_eq!(result.primary_trigger, result.top_triggers[0].trigger);
    }

    #[test]
    fn test_type_reported_only_when_positive() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(&dir);

        let result = classifier.predict(&vector_for("Woolworths")).unwrap();
        if !result.is_gambling {
            assert!(result.gambling_type.is_none());
        }
    }

    #[test]
    fn test_train_then_detects_exemplar() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(&dir);

        let gambling = vector_for("Sportsbet");
        let grocery = vector_for("Woolworths");

        let mut examples = Vec::new();
        for _ in 0..30 {
            examples.push(LabeledExample {
                features: gambling.clone(),
                is_gambling: true,
                gambling_type: Some(GamblingType::SportsBetting),
                trigger: Trigger::LateNight,
                relapse_risk: 0.8,
            });
            examples.push(LabeledExample {
                features: grocery.clone(),
                is_gambling: false,
                gambling_type: None,
                trigger: Trigger::Boredom,
                relapse_risk: 0.1,
            });
        }

        let options = TrainOptions {
            epochs: 60,
            batch_size: 8,
            validation_fraction: 0.0,
            learning_rate: 0.05,
            seed: Some(3),
        };
        let history = classifier.train(&examples, &options).unwrap();
        assert_eq!(history.epochs.len(), 60);

        // Training publishes a trained bundle
        let info = classifier.model_info();
        assert!(!info.degraded);
        assert!(info.metrics.is_some());

        let result = classifier.predict(&gambling).unwrap();
        assert!(result.is_gambling);
        assert!(result.gambling_confidence > 0.5);
        assert_eq!(result.gambling_type, Some(GamblingType::SportsBetting));

        let benign = classifier.predict(&grocery).unwrap();
        assert!(!benign.is_gambling);
    }
}
