use anyhow::Context;
use loomd::bootstrap::{
    listeners::harden_listeners,
    paths,
    ports::{allocate_daemon_port, PortRegistry},
    reload::ReloadTrap,
    shutdown::{NoopShutdown, ShutdownHook},
    supervisor::{supervisor_options, HostKernel},
    umask::set_default_umask,
    BoundListener,
};
use loomd::config::DaemonConfig;
use tracing::{debug, info, warn};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:2375";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = paths::daemon_config_file();
    let config = DaemonConfig::load(&config_file).context("loading daemon configuration")?;

    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    info!("loomd starting up");

    // Must happen before the daemon creates any file.
    set_default_umask().context("setting process umask")?;

    debug!("config dir: {}", paths::default_config_dir());
    debug!(
        "swarm run root: {}",
        paths::swarm_run_root(&config.exec_root).display()
    );

    let opts = supervisor_options(&config, &HostKernel);
    debug!("runtime supervisor options: {:?}", opts);

    // Reserve our own listening port before any container can claim it. The
    // registry is shared with the container port mapper for the life of the
    // process.
    let registry = PortRegistry::new();
    allocate_daemon_port(DEFAULT_BIND_ADDR, &registry)
        .context("reserving daemon listening port")?;

    let reload_file = config_file.clone();
    let _trap = ReloadTrap::arm_on_sighup(move || match DaemonConfig::load(&reload_file) {
        Ok(reloaded) => info!("configuration reloaded: debug={}", reloaded.debug),
        Err(e) => warn!("configuration reload failed: {}", e),
    })
    .context("arming reload trap")?;

    let listener = tokio::net::TcpListener::bind(DEFAULT_BIND_ADDR)
        .await
        .with_context(|| format!("binding {DEFAULT_BIND_ADDR}"))?;
    let listeners = harden_listeners("tcp", vec![BoundListener::tcp(listener)]);
    info!("listening on {}", DEFAULT_BIND_ADDR);

    // The API server consumes the hardened listeners; until it is wired in,
    // accept and drop connections so the endpoint stays responsive.
    let accept_loop = tokio::spawn(async move {
        loop {
            for listener in &listeners {
                match listener.accept().await {
                    Ok(_stream) => debug!("accepted and closed a connection"),
                    Err(e) => warn!("accept failed: {}", e),
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");
    accept_loop.abort();

    NoopShutdown.notify(None);
    info!("loomd shutdown complete");
    Ok(())
}
