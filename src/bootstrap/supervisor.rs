use crate::bootstrap::paths;
use crate::config::DaemonConfig;
use std::path::PathBuf;

/// Shim binary launched by the runtime supervisor for each container.
pub const DEFAULT_SHIM_BINARY: &str = "loomd-containerd-shim";
/// OCI runtime binary the shim delegates to.
pub const DEFAULT_RUNTIME_BINARY: &str = "loomd-runc";

/// Kernels older than this need the shim kept in the host mount namespace.
const MIN_MOUNT_NS_KERNEL: KernelVersion = KernelVersion {
    major: 3,
    minor: 18,
    patch: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl KernelVersion {
    /// Parses release strings of the `major.minor.patch[-suffix]` shape found
    /// in `/proc/sys/kernel/osrelease`. Returns None for anything that does
    /// not fit.
    pub fn parse(release: &str) -> Option<Self> {
        let numeric: String = release
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

/// Seam for probing the running kernel, injectable so tests can simulate
/// arbitrary versions.
pub trait KernelProbe {
    /// Version of the running kernel, or None when it cannot be determined.
    fn kernel_version(&self) -> Option<KernelVersion>;
}

/// Probes the real host kernel via procfs.
pub struct HostKernel;

impl KernelProbe for HostKernel {
    fn kernel_version(&self) -> Option<KernelVersion> {
        let release = match std::fs::read_to_string("/proc/sys/kernel/osrelease") {
            Ok(release) => release,
            Err(e) => {
                tracing::warn!("failed to read kernel release: {}", e);
                return None;
            }
        };
        KernelVersion::parse(release.trim())
    }
}

/// Settings for the runtime supervisor's linux shim plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimPluginConfig {
    pub shim: PathBuf,
    pub runtime: PathBuf,
    pub runtime_root: PathBuf,
    pub shim_debug: bool,
    /// Keeps the shim in the host mount namespace. On kernels older than
    /// 3.18, a shim in its own mount namespace pins bind-mounts that predate
    /// the namespace, so unlink/rename/unmount on them fails with EBUSY.
    pub shim_no_mount_ns: bool,
}

/// One instruction in the runtime supervisor's startup option list. The
/// supervisor applies options sequentially, so ordering is significant:
/// identity options (OOM score, plugin registration) must precede
/// connectivity options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeOption {
    OomScore(i32),
    Plugin {
        name: String,
        config: ShimPluginConfig,
    },
    LogLevel(String),
    RemoteAddr(String),
    StartDaemon(bool),
}

/// Assembles the option list for starting the runtime supervisor, adapted to
/// the capabilities of the running kernel. Never fails: an unreadable kernel
/// version degrades to "no mitigation needed".
pub fn supervisor_options(config: &DaemonConfig, probe: &dyn KernelProbe) -> Vec<RuntimeOption> {
    let shim_no_mount_ns = match probe.kernel_version() {
        Some(version) => version < MIN_MOUNT_NS_KERNEL,
        None => false,
    };
    if shim_no_mount_ns {
        tracing::debug!("kernel older than 3.18, keeping shim in the host mount namespace");
    }

    let mut opts = vec![
        RuntimeOption::OomScore(config.oom_score_adjust),
        RuntimeOption::Plugin {
            name: "linux".to_string(),
            config: ShimPluginConfig {
                shim: PathBuf::from(DEFAULT_SHIM_BINARY),
                runtime: PathBuf::from(DEFAULT_RUNTIME_BINARY),
                runtime_root: paths::runtime_root(&config.root),
                shim_debug: config.debug,
                shim_no_mount_ns,
            },
        },
    ];

    if config.debug {
        opts.push(RuntimeOption::LogLevel("debug".to_string()));
    }

    match config.supervisor_addr() {
        Some(addr) => opts.push(RuntimeOption::RemoteAddr(addr.to_string())),
        None => opts.push(RuntimeOption::StartDaemon(true)),
    }

    opts
}
