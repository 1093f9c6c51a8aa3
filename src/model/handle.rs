//! Model artifact lifecycle: load, fallback, atomic publish
//!
//! The handle owns the process-wide shared model. Lifecycle is
//! Unloaded -> Loading -> Ready(trained | fallback): when the persisted
//! artifact is missing or unreadable, a freshly-initialized network of the
//! same architecture is substituted so the service degrades in accuracy
//! instead of failing to answer. Retraining builds a replacement bundle in
//! isolation, persists it with a write-then-rename, and publishes it by
//! swapping the shared handle wholesale.

use crate::model::network::{EvalReport, MultiHeadNetwork};
use crate::model::ModelError;
use crate::types::{GamblingType, Trigger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Artifact schema understood by this build.
pub const MODEL_SCHEMA_VERSION: u32 = 1;

/// Seed for the untrained fallback so degraded behavior is reproducible.
const FALLBACK_SEED: u64 = 42;

/// How the currently-published model came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvenance {
    /// Loaded from a persisted artifact or published by a training run
    Trained,
    /// Freshly-initialized substitute; predictions are untrained
    Fallback,
}

/// Handle lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready(ModelProvenance),
}

/// Versioned, self-describing model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub schema_version: u32,
    /// Unique version of this particular artifact
    pub version: String,
    pub created_at: DateTime<Utc>,
    /// Layer widths, input first
    pub architecture: Vec<usize>,
    pub gambling_types: Vec<String>,
    pub triggers: Vec<String>,
    /// Offline evaluation figures from the run that produced the bundle
    pub metrics: Option<EvalReport>,
    pub network: MultiHeadNetwork,
}

impl ModelBundle {
    pub fn from_network(network: MultiHeadNetwork, metrics: Option<EvalReport>) -> Self {
        Self {
            schema_version: MODEL_SCHEMA_VERSION,
            version: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            architecture: network.architecture(),
            gambling_types: GamblingType::ALL.iter().map(|t| t.label().to_string()).collect(),
            triggers: Trigger::ALL.iter().map(|t| t.label().to_string()).collect(),
            metrics,
            network,
        }
    }

    /// Untrained bundle of the standard architecture.
    pub fn untrained() -> Self {
        Self::from_network(MultiHeadNetwork::new(FALLBACK_SEED), None)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let bytes = fs::read(path.as_ref())?;
        let bundle: ModelBundle = serde_json::from_slice(&bytes)?;

        if bundle.schema_version != MODEL_SCHEMA_VERSION {
            return Err(ModelError::SchemaVersion {
                expected: MODEL_SCHEMA_VERSION,
                found: bundle.schema_version,
            });
        }

        Ok(bundle)
    }

    /// Persist atomically: write a sibling temp file, then rename over the
    /// target so in-flight loads never observe a partial artifact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Read-only model description exposed to operators and collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub status: String,
    pub degraded: bool,
    pub architecture: String,
    pub gambling_types: Vec<String>,
    pub triggers: Vec<String>,
    pub metrics: Option<EvalReport>,
}

/// Process-wide shared model, read-mostly, swapped wholesale on retrain.
pub struct ModelHandle {
    current: RwLock<Arc<ModelBundle>>,
    state: RwLock<ModelState>,
    path: PathBuf,
}

impl ModelHandle {
    /// Load the artifact at `path`, or substitute an untrained fallback.
    ///
    /// The fallback path is surfaced through a warning log and through
    /// `info()`; callers keep getting well-formed predictions either way.
    pub fn load_or_fallback<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let state = RwLock::new(ModelState::Loading);

        let (bundle, provenance) = match ModelBundle::load(&path) {
            Ok(bundle) => {
                info!(
                    path = %path.display(),
                    version = %bundle.version,
                    "Model artifact loaded"
                );
                (bundle, ModelProvenance::Trained)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Model artifact unavailable, serving untrained fallback"
                );
                (ModelBundle::untrained(), ModelProvenance::Fallback)
            }
        };

        let handle = Self {
            current: RwLock::new(Arc::new(bundle)),
            state,
            path,
        };
        *handle.write_state() = ModelState::Ready(provenance);
        handle
    }

    /// In-memory handle around an explicit bundle, used in tests and tools.
    pub fn from_bundle<P: Into<PathBuf>>(bundle: ModelBundle, path: P) -> Self {
        Self {
            current: RwLock::new(Arc::new(bundle)),
            state: RwLock::new(ModelState::Ready(ModelProvenance::Trained)),
            path: path.into(),
        }
    }

    /// Snapshot of the currently-published bundle.
    pub fn bundle(&self) -> Arc<ModelBundle> {
        self.read_current().clone()
    }

    pub fn state(&self) -> ModelState {
        *read_lock(&self.state)
    }

    pub fn provenance(&self) -> ModelProvenance {
        match self.state() {
            ModelState::Ready(p) => p,
            // Pre-ready states only exist during construction
            _ => ModelProvenance::Fallback,
        }
    }

    /// Persist a replacement bundle and publish it atomically.
    pub fn publish(&self, bundle: ModelBundle) -> Result<(), ModelError> {
        bundle.save(&self.path)?;

        let version = bundle.version.clone();
        *write_lock(&self.current) = Arc::new(bundle);
        *self.write_state() = ModelState::Ready(ModelProvenance::Trained);

        info!(version = %version, path = %self.path.display(), "Model published");
        Ok(())
    }

    pub fn info(&self) -> ModelInfo {
        let bundle = self.bundle();
        let provenance = self.provenance();

        ModelInfo {
            version: bundle.version.clone(),
            status: match provenance {
                ModelProvenance::Trained => "trained".to_string(),
                ModelProvenance::Fallback => "untrained_fallback".to_string(),
            },
            degraded: provenance == ModelProvenance::Fallback,
            architecture: bundle
                .architecture
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join("-"),
            gambling_types: bundle.gambling_types.clone(),
            triggers: bundle.triggers.clone(),
            metrics: bundle.metrics,
        }
    }

    fn read_current(&self) -> RwLockReadGuard<'_, Arc<ModelBundle>> {
        read_lock(&self.current)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ModelState> {
        write_lock(&self.state)
    }
}

// Lock poisoning only happens if a holder panicked; the model data itself
// is immutable once published, so recovering the guard is sound.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
