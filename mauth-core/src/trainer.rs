//! Model training: corpus → fitted ensemble → persisted artifact
//!
//! One training run at a time per trainer. `train` waits for a running job,
//! `try_train` reports `TrainingInProgress` instead.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;
use tracing::info;

use crate::artifact::{ArtifactStore, ModelArtifact};
use crate::boosting::{BoostingParams, GradientBoostedClassifier};
use crate::corpus::TrainingCorpus;
use crate::features::FEATURE_NAMES;
use crate::split::train_test_split;
use crate::trace::UserId;
use crate::{Error, Result};

/// Share of the corpus held out for evaluation
pub const HELD_OUT_FRACTION: f64 = 0.2;

/// Result of a successful training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: Arc<ModelArtifact>,
    pub held_out_accuracy: f64,
}

/// Fits models and publishes them to an artifact store
pub struct ModelTrainer {
    store: Arc<dyn ArtifactStore>,
    params: BoostingParams,
    lock: Mutex<()>,
}

impl ModelTrainer {
    /// Trainer with the production hyperparameters
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self::with_params(store, BoostingParams::default())
    }

    pub fn with_params(store: Arc<dyn ArtifactStore>, params: BoostingParams) -> Self {
        Self {
            store,
            params,
            lock: Mutex::new(()),
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Train on `corpus`, waiting for any run already in progress
    pub fn train(&self, corpus: &TrainingCorpus) -> Result<TrainingOutcome> {
        let guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.train_locked(corpus, guard)
    }

    /// Train on `corpus` unless another run holds the lock
    pub fn try_train(&self, corpus: &TrainingCorpus) -> Result<TrainingOutcome> {
        let guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(Error::TrainingInProgress),
        };
        self.train_locked(corpus, guard)
    }

    fn train_locked(&self, corpus: &TrainingCorpus, _guard: MutexGuard<'_, ()>) -> Result<TrainingOutcome> {
        corpus.ensure_trainable()?;
        let started = Instant::now();

        let (x, y) = feature_matrix(corpus);
        let split = train_test_split(x.len(), HELD_OUT_FRACTION, self.params.seed);
        let (x_train, y_train) = select(&x, &y, &split.train);
        let (x_test, y_test) = select(&x, &y, &split.test);

        info!(
            examples = corpus.len(),
            identities = corpus.identities().len(),
            train = x_train.len(),
            held_out = x_test.len(),
            "Training started"
        );

        let classifier = GradientBoostedClassifier::fit(&x_train, &y_train, &self.params)?;
        let held_out_accuracy = classifier.score(&x_test, &y_test);

        let artifact = ModelArtifact {
            version: self.store.current_version().unwrap_or(0) + 1,
            trained_at: Utc::now(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            classifier,
            held_out_accuracy,
            n_train: x_train.len(),
            n_held_out: x_test.len(),
        };
        artifact
            .validate()
            .map_err(|e| Error::TrainingFailed(format!("fitted model is inconsistent: {}", e)))?;
        self.store.save(&artifact)?;

        info!(
            version = artifact.version,
            held_out_accuracy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training finished"
        );

        Ok(TrainingOutcome {
            artifact: Arc::new(artifact),
            held_out_accuracy,
        })
    }
}

/// Rows in `FEATURE_NAMES` order (NaN read as 0) and the parallel labels
pub fn feature_matrix(corpus: &TrainingCorpus) -> (Vec<Vec<f64>>, Vec<UserId>) {
    corpus
        .examples()
        .iter()
        .map(|e| (e.features.reindex(&FEATURE_NAMES), e.label))
        .unzip()
}

fn select(x: &[Vec<f64>], y: &[UserId], indices: &[usize]) -> (Vec<Vec<f64>>, Vec<UserId>) {
    indices.iter().map(|&i| (x[i].clone(), y[i])).unzip()
}
