use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Source of reload triggers. Production subscribes to SIGHUP; non-signal
/// environments and tests can feed the trap from a channel instead.
#[async_trait]
pub trait ReloadSource: Send + 'static {
    /// Waits for the next trigger. None means the source is exhausted and the
    /// trap should stop (never happens for OS signals).
    async fn recv(&mut self) -> Option<()>;
}

/// SIGHUP subscription. Deliveries that arrive while the callback runs are
/// coalesced by the kernel but at least one stays pending, so a reload is
/// never lost outright.
pub struct SighupSource {
    stream: tokio::signal::unix::Signal,
}

impl SighupSource {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            stream: signal(SignalKind::hangup())?,
        })
    }
}

#[async_trait]
impl ReloadSource for SighupSource {
    async fn recv(&mut self) -> Option<()> {
        self.stream.recv().await
    }
}

/// Channel-fed trigger source for environments without Unix signals.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<()>,
}

impl ChannelSource {
    pub fn new() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl ReloadSource for ChannelSource {
    async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Invokes a configuration-reload callback once per trigger received from the
/// source, on a dedicated task. Stays armed until process exit.
pub struct ReloadTrap {
    handle: JoinHandle<()>,
}

impl ReloadTrap {
    pub fn arm<S, F>(mut source: S, mut reload: F) -> Self
    where
        S: ReloadSource,
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            while source.recv().await.is_some() {
                tracing::info!("reload trigger received, reloading configuration");
                reload();
            }
            tracing::debug!("reload source closed");
        });
        Self { handle }
    }

    /// Arms the trap on the platform reload signal (SIGHUP).
    pub fn arm_on_sighup<F>(reload: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Ok(Self::arm(SighupSource::new()?, reload))
    }

    /// The worker task's handle. The trap has no terminal state of its own;
    /// dropping the handle leaves the worker running for the process lifetime.
    pub fn handle(&self) -> &JoinHandle<()> {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_trigger_invokes_callback_once() {
        let (trigger, source) = ChannelSource::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let mut count = 0u32;
        let _trap = ReloadTrap::arm(source, move || {
            count += 1;
            done_tx.send(count).unwrap();
        });

        for expected in 1..=3 {
            trigger.send(()).unwrap();
            assert_eq!(done_rx.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_worker_stops_when_source_closes() {
        let (trigger, source) = ChannelSource::new();
        let mut trap = ReloadTrap::arm(source, || {});
        drop(trigger);

        (&mut trap.handle).await.unwrap();
    }
}
