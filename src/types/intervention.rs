//! Intervention decision records

use crate::types::classification::{GamblingType, Trigger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the intervention decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rationale {
    /// Payee is on the whitelist; resolved with no alert
    Whitelisted,
    /// Gambling confidence exceeded the alert threshold
    GamblingDetected,
    /// Classified below the alert threshold
    BelowThreshold,
    /// Classification failed; alert raised fail-safe
    ClassificationFailed,
}

impl Rationale {
    pub fn label(self) -> &'static str {
        match self {
            Rationale::Whitelisted => "whitelisted",
            Rationale::GamblingDetected => "gambling_detected",
            Rationale::BelowThreshold => "below_threshold",
            Rationale::ClassificationFailed => "classification_failed",
        }
    }
}

/// Outcome of the intervention decision for one transaction.
///
/// Consumed by notification and UI collaborators; this record does not
/// perform any delivery itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRecord {
    /// Unique record identifier
    pub intervention_id: String,

    /// Transaction the decision was made for
    pub transaction_id: String,

    /// Whether an alert fired
    pub alert: bool,

    pub rationale: Rationale,

    /// Enrichment from the classifier, absent for whitelisted transactions
    pub gambling_type: Option<GamblingType>,
    pub primary_trigger: Option<Trigger>,
    pub relapse_risk: Option<f64>,

    pub created_at: DateTime<Utc>,
}

impl InterventionRecord {
    pub fn new(transaction_id: &str, alert: bool, rationale: Rationale) -> Self {
        Self {
            intervention_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            alert,
            rationale,
            gambling_type: None,
            primary_trigger: None,
            relapse_risk: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_classification(
        mut self,
        gambling_type: Option<GamblingType>,
        primary_trigger: Trigger,
        relapse_risk: f64,
    ) -> Self {
        self.gambling_type = gambling_type;
        self.primary_trigger = Some(primary_trigger);
        self.relapse_risk = Some(relapse_risk);
        self
    }
}
