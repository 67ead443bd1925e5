use crate::bootstrap::error::{BootstrapError, BootstrapResult};
use nix::sys::stat::{self, Mode};

/// File-creation mask the daemon runs with. A custom inherited umask breaks
/// permission assumptions on the daemon's state directories.
const DESIRED_UMASK: u32 = 0o022;

/// Sets the process umask to 0o022 and re-reads it to confirm the change took
/// effect. Must run before the daemon creates any file, and exactly once.
pub fn set_default_umask() -> BootstrapResult<()> {
    let desired = Mode::from_bits_truncate(DESIRED_UMASK);
    stat::umask(desired);
    // umask(2) returns the previous mask, so setting it a second time lets us
    // observe what the first call actually installed.
    let observed = stat::umask(desired);
    confirm_umask(DESIRED_UMASK, observed.bits() as u32)
}

fn confirm_umask(expected: u32, observed: u32) -> BootstrapResult<()> {
    if observed != expected {
        return Err(BootstrapError::EnvironmentMismatch { expected, observed });
    }
    Ok(())
}
