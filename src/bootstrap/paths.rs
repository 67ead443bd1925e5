use std::path::{Path, PathBuf};

/// Directory holding persisted daemon configuration on this platform.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/loomd";

const CONFIG_FILE_NAME: &str = "daemon.json";
const RUNTIME_ROOT_SUBDIR: &str = "runc";
const SWARM_RUN_SUBDIR: &str = "swarm";

/// Returns the platform configuration directory for the daemon.
pub fn default_config_dir() -> &'static str {
    DEFAULT_CONFIG_DIR
}

/// Path of the daemon's JSON configuration file.
pub fn daemon_config_file() -> PathBuf {
    Path::new(DEFAULT_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

/// Root directory handed to the OCI runtime, derived from the configured
/// state root.
pub fn runtime_root(root: &Path) -> PathBuf {
    root.join(RUNTIME_ROOT_SUBDIR)
}

/// Root directory for swarm runtime state (e.g. the control socket), derived
/// from the daemon's execution root.
pub fn swarm_run_root(exec_root: &Path) -> PathBuf {
    exec_root.join(SWARM_RUN_SUBDIR)
}
