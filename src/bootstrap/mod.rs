// Unix bootstrap layer: everything the daemon needs in place before the
// service loop starts, plus the reload/shutdown seams it keeps while live.
pub mod error;
pub mod listeners;
pub mod paths;
pub mod ports;
pub mod reload;
pub mod shutdown;
pub mod supervisor;
pub mod umask;

// Re-export commonly used types
pub use error::{BootstrapError, BootstrapResult};
pub use listeners::{harden_listeners, BoundListener};
pub use ports::{allocate_daemon_port, PortRegistry};
pub use reload::{ReloadTrap, SighupSource};
pub use shutdown::{NoopShutdown, ShutdownHook};
pub use supervisor::{supervisor_options, HostKernel, RuntimeOption};
pub use umask::set_default_umask;
