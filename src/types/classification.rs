//! Classifier output types shared with downstream collaborators

use serde::{Deserialize, Serialize};

/// Gambling categories predicted by the 4-way type head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamblingType {
    SportsBetting,
    OnlineCasino,
    Poker,
    Lottery,
}

impl GamblingType {
    pub const ALL: [GamblingType; 4] = [
        GamblingType::SportsBetting,
        GamblingType::OnlineCasino,
        GamblingType::Poker,
        GamblingType::Lottery,
    ];

    /// Class index used by the type head.
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            GamblingType::SportsBetting => "sports_betting",
            GamblingType::OnlineCasino => "online_casino",
            GamblingType::Poker => "poker",
            GamblingType::Lottery => "lottery",
        }
    }
}

/// Contextual factors hypothesized to precede a gambling event,
/// predicted by the 8-way trigger head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Payday,
    LateNight,
    Weekend,
    AlcoholRelated,
    Stress,
    SocialPressure,
    Boredom,
    LossChasing,
}

impl Trigger {
    pub const ALL: [Trigger; 8] = [
        Trigger::Payday,
        Trigger::LateNight,
        Trigger::Weekend,
        Trigger::AlcoholRelated,
        Trigger::Stress,
        Trigger::SocialPressure,
        Trigger::Boredom,
        Trigger::LossChasing,
    ];

    /// Class index used by the trigger head.
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Trigger::Payday => "payday",
            Trigger::LateNight => "late_night",
            Trigger::Weekend => "weekend",
            Trigger::AlcoholRelated => "alcohol_related",
            Trigger::Stress => "stress",
            Trigger::SocialPressure => "social_pressure",
            Trigger::Boredom => "boredom",
            Trigger::LossChasing => "loss_chasing",
        }
    }
}

/// A ranked trigger alternative with its confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerScore {
    pub trigger: Trigger,
    pub confidence: f64,
}

/// Four correlated predictions derived from one feature vector.
///
/// Serialized in camelCase because this is the contract consumed by
/// notification and reporting collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub is_gambling: bool,
    pub gambling_confidence: f64,

    /// Reported only when the binary head is positive
    pub gambling_type: Option<GamblingType>,
    pub type_confidence: f64,

    pub primary_trigger: Trigger,
    pub trigger_confidence: f64,

    /// Bounded 0-1 regression output
    pub relapse_risk: f64,

    /// Top-ranked trigger alternatives, highest confidence first
    pub top_triggers: Vec<TriggerScore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_indices_round_trip() {
        for (i, t) in Trigger::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
            assert_eq!(Trigger::from_index(i), Some(*t));
        }
        for (i, g) in GamblingType::ALL.iter().enumerate() {
            assert_eq!(g.index(), i);
            assert_eq!(GamblingType::from_index(i), Some(*g));
        }
        assert_eq!(Trigger::from_index(8), None);
        assert_eq!(GamblingType::from_index(4), None);
    }

    #[test]
    fn test_collaborator_schema_keys() {
        let result = ClassificationResult {
            is_gambling: true,
            gambling_confidence: 0.9,
            gambling_type: Some(GamblingType::SportsBetting),
            type_confidence: 0.7,
            primary_trigger: Trigger::LateNight,
            trigger_confidence: 0.4,
            relapse_risk: 0.6,
            top_triggers: vec![TriggerScore {
                trigger: Trigger::LateNight,
                confidence: 0.4,
            }],
        };

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("isGambling").is_some());
        assert!(json.get("gamblingConfidence").is_some());
        assert!(json.get("relapseRisk").is_some());
        assert_eq!(json["gamblingType"], "sports_betting");
        assert_eq!(json["primaryTrigger"], "late_night");
    }
}
