//! Intervention decision rule
//!
//! Pure thresholding over the classifier output. Delivery of the resulting
//! alert (push notification, guardian email) belongs to collaborators.

use crate::types::{ClassificationResult, InterventionRecord, Rationale, Transaction};

/// Tunable decision policy.
#[derive(Debug, Clone)]
pub struct InterventionPolicy {
    /// Minimum gambling-head confidence before an alert fires
    pub alert_threshold: f64,
}

impl Default for InterventionPolicy {
    fn default() -> Self {
        Self {
            alert_threshold: 0.5,
        }
    }
}

impl InterventionPolicy {
    pub fn new(alert_threshold: f64) -> Self {
        Self { alert_threshold }
    }

    /// Decide whether the transaction warrants an alert.
    ///
    /// Whitelisted payees resolve with no alert regardless of the
    /// classification. A missing classification means inference failed; the
    /// decision fails toward alerting because a silent miss is worse than a
    /// spurious alert in this domain.
    pub fn decide(
        &self,
        transaction: &Transaction,
        classification: Option<&ClassificationResult>,
        whitelisted: bool,
    ) -> InterventionRecord {
        if whitelisted {
            return InterventionRecord::new(
                &transaction.transaction_id,
                false,
                Rationale::Whitelisted,
            );
        }

        let Some(result) = classification else {
            return InterventionRecord::new(
                &transaction.transaction_id,
                true,
                Rationale::ClassificationFailed,
            );
        };

        let alert = result.is_gambling && result.gambling_confidence > self.alert_threshold;
        let rationale = if alert {
            Rationale::GamblingDetected
        } else {
            Rationale::BelowThreshold
        };

        InterventionRecord::new(&transaction.transaction_id, alert, rationale)
            .with_classification(
                result.gambling_type,
                result.primary_trigger,
                result.relapse_risk,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GamblingType, Trigger, TriggerScore};
    use chrono::Utc;

    fn transaction() -> Transaction {
        Transaction {
            transaction_id: "tx_dec".to_string(),
            amount_minor: -5000,
            payee: "Sportsbet".to_string(),
            raw_text: "Sportsbet".to_string(),
            posted_at: Utc::now(),
            balance_minor: None,
        }
    }

    fn classification(confidence: f64) -> ClassificationResult {
        ClassificationResult {
            is_gambling: confidence >= 0.5,
            gambling_confidence: confidence,
            gambling_type: Some(GamblingType::SportsBetting),
            type_confidence: 0.7,
            primary_trigger: Trigger::LateNight,
            trigger_confidence: 0.4,
            relapse_risk: 0.6,
            top_triggers: vec![TriggerScore {
                trigger: Trigger::LateNight,
                confidence: 0.4,
            }],
        }
    }

    #[test]
    fn test_alert_above_threshold() {
        let policy = InterventionPolicy::default();
        let record = policy.decide(&transaction(), Some(&classification(0.9)), false);

        assert!(record.alert);
        assert_eq!(record.rationale, Rationale::GamblingDetected);
        assert_eq!(record.gambling_type, Some(GamblingType::SportsBetting));
        assert_eq!(record.primary_trigger, Some(Trigger::LateNight));
        assert_eq!(record.relapse_risk, Some(0.6));
    }

    #[test]
    fn test_no_alert_below_threshold() {
        let policy = InterventionPolicy::default();
        let record = policy.decide(&transaction(), Some(&classification(0.3)), false);

        assert!(!record.alert);
        assert_eq!(record.rationale, Rationale::BelowThreshold);
    }

    #[test]
    fn test_whitelist_overrides_any_confidence() {
        let policy = InterventionPolicy::default();
        let record = policy.decide(&transaction(), Some(&classification(0.99)), true);

        assert!(!record.alert);
        assert_eq!(record.rationale, Rationale::Whitelisted);
        assert!(record.gambling_type.is_none());
    }

    #[test]
    fn test_classification_failure_fails_toward_alert() {
        let policy = InterventionPolicy::default();
        let record = policy.decide(&transaction(), None, false);

        assert!(record.alert);
        assert_eq!(record.rationale, Rationale::ClassificationFailed);
    }

    #[test]
    fn test_custom_threshold() {
        let policy = InterventionPolicy::new(0.95);
        let record = policy.decide(&transaction(), Some(&classification(0.9)), false);
        assert!(!record.alert);
    }
}
