//! Multi-head classification model: architecture, lifecycle, inference

pub mod classifier;
pub mod handle;
pub mod network;

pub use classifier::RiskClassifier;
pub use handle::{ModelBundle, ModelHandle, ModelInfo, ModelProvenance, ModelState};
pub use network::{
    EvalReport, LabeledExample, MultiHeadNetwork, TrainOptions, TrainingHistory,
};

use thiserror::Error;

/// Failures in model loading, training, and inference.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature dimension mismatch: model expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("model artifact schema version {found} is not supported (expected {expected})")]
    SchemaVersion { expected: u32, found: u32 },

    #[error("model io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
