use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Operator-provided daemon configuration. Loaded once at startup and treated
/// as immutable afterwards; bootstrap components read it but never mutate it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DaemonConfig {
    /// OOM-score adjustment applied to the runtime supervisor's own process.
    pub oom_score_adjust: i32,
    /// Enables debug logging in the daemon and the runtime shim.
    pub debug: bool,
    /// Address of an already-running runtime supervisor. Empty or absent
    /// means the daemon starts an embedded supervisor itself.
    pub supervisor_addr: Option<String>,
    /// Root directory for persistent container state.
    pub root: PathBuf,
    /// Root directory for runtime (non-persistent) state.
    pub exec_root: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            oom_score_adjust: -500,
            debug: false,
            supervisor_addr: None,
            root: PathBuf::from("/var/lib/loomd"),
            exec_root: PathBuf::from("/var/run/loomd"),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(config)
    }

    /// Treats an empty supervisor address the same as an absent one.
    pub fn supervisor_addr(&self) -> Option<&str> {
        self.supervisor_addr.as_deref().filter(|addr| !addr.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}
