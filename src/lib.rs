// loomd library interface
// Unix-specific bootstrap core for the loom container-engine daemon.

pub mod bootstrap;
pub mod config;

pub use bootstrap::{
    allocate_daemon_port, harden_listeners, set_default_umask, supervisor_options,
    BootstrapError, BootstrapResult, BoundListener, HostKernel, NoopShutdown, PortRegistry,
    ReloadTrap, RuntimeOption, ShutdownHook,
};
pub use config::DaemonConfig;
