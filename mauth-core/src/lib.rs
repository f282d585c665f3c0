//! # mauth core library
//!
//! Behavioral identity verification from mouse-movement traces:
//! - Movement traces and identity labels
//! - Signature extraction (11 kinematic/statistical features)
//! - Training corpus assembly from a trace store
//! - Gradient-boosted tree classifier, training and held-out evaluation
//! - Versioned model artifacts with atomic replace
//! - Identity verification against a claimed user
//! - Bootstrap configuration loading

pub mod artifact;
pub mod boosting;
pub mod config;
pub mod corpus;
pub mod error;
pub mod features;
pub mod split;
pub mod trace;
pub mod trainer;
pub mod verify;

pub use artifact::{ArtifactStore, FileArtifactStore, MemoryArtifactStore, ModelArtifact};
pub use corpus::{assemble, LabeledExample, StoredTrace, TraceStore, TrainingCorpus};
pub use error::{Error, Result};
pub use features::{extract, extract_checked, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use trace::{MovementTrace, Point, UserId};
pub use trainer::{ModelTrainer, TrainingOutcome};
pub use verify::{VerificationEngine, VerificationResult};
