//! Training corpus assembly
//!
//! Turns the training-flagged traces of a [`TraceStore`] into labeled feature
//! vectors. Short traces and traces whose features overflow are dropped, and a
//! corpus below [`MIN_TRAINING_EXAMPLES`] is rejected before any fitting starts.

use tracing::{debug, warn};

use crate::features::{extract, FeatureVector};
use crate::trace::{MovementTrace, UserId};
use crate::{Error, Result};

/// Traces shorter than this are too noisy to learn from
pub const MIN_TRAINING_TRACE_LEN: usize = 5;

/// Smallest corpus the trainer accepts
pub const MIN_TRAINING_EXAMPLES: usize = 3;

/// A trace as held by a trace store
#[derive(Debug, Clone)]
pub struct StoredTrace {
    pub user_id: UserId,
    pub is_training_data: bool,
    pub trace: MovementTrace,
}

/// Source of captured traces
pub trait TraceStore {
    /// All traces whose training flag is set
    fn training_traces(&self) -> Result<Vec<StoredTrace>>;
}

impl TraceStore for [StoredTrace] {
    fn training_traces(&self) -> Result<Vec<StoredTrace>> {
        Ok(self.iter().filter(|t| t.is_training_data).cloned().collect())
    }
}

impl TraceStore for Vec<StoredTrace> {
    fn training_traces(&self) -> Result<Vec<StoredTrace>> {
        self.as_slice().training_traces()
    }
}

/// One feature vector with its true identity
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub label: UserId,
}

/// Ordered collection of labeled examples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingCorpus {
    examples: Vec<LabeledExample>,
}

impl TrainingCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: FeatureVector, label: UserId) {
        self.examples.push(LabeledExample { features, label });
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Distinct labels in ascending order
    pub fn identities(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.examples.iter().map(|e| e.label).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Fail with `InsufficientData` below the training minimum
    pub fn ensure_trainable(&self) -> Result<()> {
        if self.examples.len() < MIN_TRAINING_EXAMPLES {
            return Err(Error::InsufficientData {
                found: self.examples.len(),
                required: MIN_TRAINING_EXAMPLES,
            });
        }
        Ok(())
    }
}

impl FromIterator<LabeledExample> for TrainingCorpus {
    fn from_iter<I: IntoIterator<Item = LabeledExample>>(iter: I) -> Self {
        Self {
            examples: iter.into_iter().collect(),
        }
    }
}

/// Build the training corpus from every eligible training trace in `store`
pub fn assemble<S: TraceStore + ?Sized>(store: &S) -> Result<TrainingCorpus> {
    let traces = store.training_traces()?;
    let total = traces.len();

    let corpus: TrainingCorpus = traces
        .into_iter()
        .filter(|t| t.is_training_data)
        .filter(|t| {
            let keep = t.trace.len() >= MIN_TRAINING_TRACE_LEN;
            if !keep {
                debug!(user_id = %t.user_id, points = t.trace.len(), "Skipping short training trace");
            }
            keep
        })
        .filter_map(|t| {
            let features = extract(&t.trace);
            if !features.is_finite() {
                warn!(user_id = %t.user_id, "Skipping training trace with non-finite features");
                return None;
            }
            Some(LabeledExample {
                features,
                label: t.user_id,
            })
        })
        .collect();

    debug!(
        stored = total,
        usable = corpus.len(),
        identities = corpus.identities().len(),
        "Assembled training corpus"
    );

    corpus.ensure_trainable()?;
    Ok(corpus)
}
