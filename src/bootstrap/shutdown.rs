use std::error::Error;

/// Observability hook invoked exactly once after the daemon's serving loop
/// has stopped and before the process exits. Implementations must not block
/// or panic past this boundary; there is nothing left to recover.
pub trait ShutdownHook: Send + Sync {
    /// `err` is the error that stopped the serving loop, if any.
    fn notify(&self, err: Option<&(dyn Error + 'static)>);
}

/// Explicit do-nothing hook.
pub struct NoopShutdown;

impl ShutdownHook for NoopShutdown {
    fn notify(&self, _err: Option<&(dyn Error + 'static)>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook(AtomicUsize);

    impl ShutdownHook for CountingHook {
        fn notify(&self, _err: Option<&(dyn Error + 'static)>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_accepts_both_outcomes() {
        let hook = NoopShutdown;
        hook.notify(None);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "serve loop failed");
        hook.notify(Some(&err));
    }

    #[test]
    fn test_hook_invoked_once() {
        let hook = CountingHook(AtomicUsize::new(0));
        hook.notify(None);
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }
}
