//! Identity verification against the current model artifact

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::artifact::ArtifactStore;
use crate::features::extract;
use crate::trace::{MovementTrace, UserId};
use crate::Result;

/// Verdict for one claimed identity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VerificationResult {
    pub is_authentic: bool,
    /// Probability the model assigns to `predicted_identity`, in [0, 1]
    pub confidence: f64,
    pub predicted_identity: UserId,
}

/// Scores traces with whatever artifact the store currently holds
pub struct VerificationEngine {
    store: Arc<dyn ArtifactStore>,
}

impl VerificationEngine {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Predict who produced `trace` and compare with `claimed`.
    ///
    /// The verdict is threshold-free: a claim is authentic exactly when it
    /// matches the most probable identity, whatever the confidence.
    pub fn verify(&self, claimed: UserId, trace: &MovementTrace) -> Result<VerificationResult> {
        let artifact = self.store.load()?;

        let row = extract(trace).reindex(&artifact.feature_names);
        let (predicted_identity, confidence) = artifact.classifier.predict(&row);

        debug!(
            claimed = %claimed,
            predicted = %predicted_identity,
            confidence,
            model_version = artifact.version,
            "Verification scored"
        );

        Ok(VerificationResult {
            is_authentic: predicted_identity == claimed,
            confidence,
            predicted_identity,
        })
    }
}
