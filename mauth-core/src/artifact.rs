//! Model artifact persistence
//!
//! A [`ModelArtifact`] is written once per successful training run and read by
//! every verification. File-backed stores replace the artifact atomically
//! (temp file + fsync + rename), so readers see either the previous artifact or
//! the new one in full. Loads are cached and decoded again only when the file
//! bytes change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::boosting::GradientBoostedClassifier;
use crate::{Error, Result};

/// Envelope format written by this build
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Well-known artifact file name inside the model directory
pub const ARTIFACT_FILE_NAME: &str = "mouse_model.json";

/// Trained classifier plus the feature ordering it was fitted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Increases by one with every successful training run
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    /// Column order of the classifier's input
    pub feature_names: Vec<String>,
    pub classifier: GradientBoostedClassifier,
    pub held_out_accuracy: f64,
    pub n_train: usize,
    pub n_held_out: usize,
}

impl ModelArtifact {
    pub fn validate(&self) -> Result<()> {
        if self.feature_names.len() != self.classifier.n_features() {
            return Err(Error::Internal(format!(
                "{} feature names for a {}-feature classifier",
                self.feature_names.len(),
                self.classifier.n_features()
            )));
        }
        self.classifier.validate()
    }
}

/// Slot holding the latest model artifact
pub trait ArtifactStore: Send + Sync {
    /// Whether an artifact has been written
    fn exists(&self) -> bool;

    /// Current artifact; `ModelNotTrained` if absent or unreadable
    fn load(&self) -> Result<Arc<ModelArtifact>>;

    /// Replace the current artifact in one step
    fn save(&self, artifact: &ModelArtifact) -> Result<()>;

    /// Version of the current artifact, if a valid one exists
    fn current_version(&self) -> Option<u64> {
        self.load().ok().map(|a| a.version)
    }
}

/// On-disk envelope: the serialized artifact and its SHA-256
#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    checksum: String,
    payload: String,
}

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Last decoded artifact and the digest of the file it came from
#[derive(Debug)]
struct CachedArtifact {
    file_digest: String,
    artifact: Arc<ModelArtifact>,
}

/// Artifact stored as a JSON envelope in a directory
#[derive(Debug)]
pub struct FileArtifactStore {
    dir: PathBuf,
    cache: RwLock<Option<CachedArtifact>>,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE_NAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", ARTIFACT_FILE_NAME))
    }

    fn decode(&self, content: &str) -> Result<ModelArtifact> {
        let envelope: Envelope = serde_json::from_str(content)
            .map_err(|e| Error::ModelNotTrained(format!("artifact unreadable: {}", e)))?;
        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(Error::ModelNotTrained(format!(
                "unsupported artifact format version {}",
                envelope.format_version
            )));
        }
        if sha256_hex(envelope.payload.as_bytes()) != envelope.checksum {
            return Err(Error::ModelNotTrained("artifact checksum mismatch".to_string()));
        }
        let artifact: ModelArtifact = serde_json::from_str(&envelope.payload)
            .map_err(|e| Error::ModelNotTrained(format!("artifact payload unreadable: {}", e)))?;
        artifact
            .validate()
            .map_err(|e| Error::ModelNotTrained(format!("artifact invalid: {}", e)))?;
        Ok(artifact)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let temp = self.temp_path();
        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp, self.path())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

impl ArtifactStore for FileArtifactStore {
    fn exists(&self) -> bool {
        self.path().is_file()
    }

    fn load(&self) -> Result<Arc<ModelArtifact>> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ModelNotTrained(format!(
                    "no artifact at {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(Error::ModelNotTrained(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let file_digest = sha256_hex(&bytes);
        if let Some(cached) = self.cache.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            if cached.file_digest == file_digest {
                return Ok(cached.artifact.clone());
            }
        }

        let decoded = std::str::from_utf8(&bytes)
            .map_err(|e| Error::ModelNotTrained(format!("artifact is not UTF-8: {}", e)))
            .and_then(|content| self.decode(content));
        let artifact = match decoded {
            Ok(artifact) => Arc::new(artifact),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rejected model artifact");
                return Err(e);
            }
        };
        debug!(version = artifact.version, "Model artifact loaded");

        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(CachedArtifact {
            file_digest,
            artifact: artifact.clone(),
        });
        Ok(artifact)
    }

    fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        let payload = serde_json::to_string(artifact)
            .map_err(|e| Error::Internal(format!("Failed to serialize artifact: {}", e)))?;
        let envelope = Envelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: sha256_hex(payload.as_bytes()),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| Error::Internal(format!("Failed to serialize envelope: {}", e)))?;
        self.write_atomic(&bytes)?;
        debug!(path = %self.path().display(), version = artifact.version, "Model artifact written");
        Ok(())
    }
}

/// Artifact held in process memory
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    current: RwLock<Option<Arc<ModelArtifact>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn load(&self) -> Result<Arc<ModelArtifact>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::ModelNotTrained("no artifact has been trained".to_string()))
    }

    fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        artifact.validate()?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(artifact.clone()));
        Ok(())
    }
}
