use std::net::IpAddr;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("process umask verification failed: expected {expected:#o}, got {observed:#o}")]
    EnvironmentMismatch { expected: u32, observed: u32 },

    #[error("malformed bind address: {addr}")]
    MalformedAddress { addr: String },

    #[error("failed to lookup {host} address in host specification")]
    HostResolutionFailure { host: String },

    #[error("failed to allocate daemon listening port {port} on {ip}: {reason}")]
    PortConflict {
        port: u16,
        ip: IpAddr,
        reason: String,
    },
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;
