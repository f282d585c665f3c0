//! Bootstrap configuration and root folder resolution
//!
//! Only bootstrap concerns live in TOML: where the root folder is, what to
//! bind to, and the log level. Model hyperparameters are fixed in code.
//!
//! Root folder priority:
//! 1. Command-line argument
//! 2. `MAUTH_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::ARTIFACT_FILE_NAME;
use crate::{Error, Result};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "MAUTH_ROOT_FOLDER";

/// SQLite database file inside the root folder
pub const DATABASE_FILE_NAME: &str = "mauth.db";

/// Model artifact directory inside the root folder
pub const MODEL_DIR_NAME: &str = "model";

pub const DEFAULT_PORT: u16 = 5790;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Bootstrap configuration read from TOML
///
/// Every field is optional; a missing file is the same as an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins if set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse the file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Parse the file at `path`, falling back to defaults with a warning
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }
}

/// First existing config file: `~/.config/mauth/config.toml`, then
/// `/etc/mauth/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mauth").join("config.toml"));
    let system_config = PathBuf::from("/etc/mauth/config.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|p| p.is_file())
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mauth"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mauth"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mauth"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mauth"))
    } else {
        // ~/.local/share/mauth
        dirs::data_local_dir()
            .map(|d| d.join("mauth"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mauth"))
    }
}

/// Resolves the root folder for a module
pub struct RootFolderResolver {
    module_name: String,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    /// Resolver reading the default config file location
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            config_path: default_config_path(),
        }
    }

    /// Resolver reading an explicit config file
    pub fn with_config_path(module_name: &str, config_path: impl Into<PathBuf>) -> Self {
        Self {
            module_name: module_name.to_string(),
            config_path: Some(config_path.into()),
        }
    }

    /// Bootstrap configuration, defaults if the file is missing or invalid
    pub fn toml_config(&self) -> TomlConfig {
        TomlConfig::load_or_default(self.config_path.as_deref())
    }

    /// Resolve without a command-line override
    pub fn resolve(&self) -> PathBuf {
        self.resolve_with(None)
    }

    /// Resolve, preferring `cli_arg` when given
    pub fn resolve_with(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            info!(module = %self.module_name, "Root folder {} (command line)", path.display());
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!(module = %self.module_name, "Root folder {} ({})", path, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = self.toml_config().root_folder {
            info!(module = %self.module_name, "Root folder {} (config file)", path.display());
            return path;
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder {} (default)", path.display());
        path
    }
}

/// Creates and describes the root folder layout
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root folder and model directory; safe to call repeatedly
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.model_dir()).map_err(|e| {
            Error::Config(format!(
                "Failed to create root folder {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().is_file()
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join(MODEL_DIR_NAME)
    }

    /// Where the current model artifact lives
    pub fn artifact_path(&self) -> PathBuf {
        self.model_dir().join(ARTIFACT_FILE_NAME)
    }
}
