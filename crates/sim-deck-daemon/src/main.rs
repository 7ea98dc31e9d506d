//! sim-deck daemon
//!
//! Serves the touch deck over HTTP and injects the pressed combos as
//! keyboard input on this machine.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sim_deck_config::BackendKind;
use sim_deck_daemon::catalog::check_profile;
use sim_deck_daemon::clock::TokioClock;
use sim_deck_daemon::combo::ComboExecutor;
use sim_deck_daemon::gateway::InvocationGateway;
use sim_deck_daemon::injector::create_injector;
use sim_deck_daemon::macro_runner::{MacroRunner, Shutdown};
use sim_deck_daemon::server::{create_router, run_server, AppState};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

/// How long running macros get to reach a step boundary on shutdown
const MACRO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "sim-deckd")]
#[command(about = "Touch-deck key injection daemon for cockpit simulators")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/sim-deck/config.kdl")]
    config: String,

    /// Profile to serve (overrides `global.profile`)
    #[arg(short, long)]
    profile: Option<String>,

    /// Address to listen on (overrides `global.listen`)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Host part of the listen address
    #[arg(long, env = "DECK_HOST")]
    host: Option<IpAddr>,

    /// Port part of the listen address
    #[arg(long, env = "DECK_PORT")]
    port: Option<u16>,

    /// Shared secret required by the API (overrides `global.token`)
    #[arg(long, env = "DECK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Key injection backend: uinput or log
    #[arg(short, long)]
    backend: Option<BackendKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise start at info and switch to the configured
    // level once the config is loaded
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();

    tracing::info!("Loading configuration from {}", config_path.display());

    let config = sim_deck_config::parse_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    if !from_env {
        filter_handle
            .reload(EnvFilter::new(config.global.log_level.as_filter()))
            .context("Failed to apply log level")?;
    }

    let profile = match &args.profile {
        Some(name) => config
            .profile(name)
            .with_context(|| format!("No profile named '{}'", name))?,
        None => config
            .default_profile()
            .context("Configuration defines no profiles")?,
    }
    .clone();

    tracing::info!(
        "Serving profile '{}' with {} button(s) and {} macro(s)",
        profile.name,
        profile.buttons.len(),
        profile.macros.len()
    );

    let problems = check_profile(&profile);
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("{}", problem);
        }
        bail!(
            "Profile '{}' has {} unresolvable combo(s)",
            profile.name,
            problems.len()
        );
    }

    let backend = args.backend.unwrap_or(config.global.backend);
    let injector = create_injector(backend)?;

    let clock = Arc::new(TokioClock);
    let mut combos = ComboExecutor::new(injector, clock.clone(), config.global.settle);
    if config.global.serialize_combos {
        tracing::info!("Combo serialization enabled");
        combos = combos.serialized();
    }

    let shutdown = Shutdown::new();
    let macros = MacroRunner::new(combos.clone(), clock, shutdown.subscribe());
    let gateway = InvocationGateway::new(Arc::new(profile), combos, macros.clone());

    let token = args.token.unwrap_or(config.global.token);
    if token.is_empty() {
        tracing::warn!("No token configured, the API is open to anyone on the network");
    }

    let addr = listen_addr(&args.listen, args.host, args.port, &config.global.listen)?;
    if addr.ip().is_unspecified() {
        tracing::info!(
            "Open http://<this-machine's-LAN-IP>:{}/ on the touch device",
            addr.port()
        );
    }

    let router = create_router(AppState::new(gateway, token));
    run_server(router, addr, shutdown_signal()).await?;

    tracing::info!("Shutting down...");

    shutdown.trigger();
    drain_macros(&macros).await;

    Ok(())
}

/// Work out the socket address from the flags and the config.
///
/// `--listen` wins outright; `--host`/`--port` replace parts of the
/// configured address.
fn listen_addr(
    listen: &Option<SocketAddr>,
    host: Option<IpAddr>,
    port: Option<u16>,
    configured: &str,
) -> Result<SocketAddr> {
    if let Some(addr) = listen {
        return Ok(*addr);
    }

    let mut addr: SocketAddr = configured
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", configured))?;
    if let Some(host) = host {
        addr.set_ip(host);
    }
    if let Some(port) = port {
        addr.set_port(port);
    }
    Ok(addr)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Wait for running macros to stop, up to [`MACRO_DRAIN_TIMEOUT`]
async fn drain_macros(macros: &MacroRunner) {
    let drained = tokio::time::timeout(MACRO_DRAIN_TIMEOUT, async {
        while macros.active() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!("{} macro(s) still running at exit", macros.active());
    }
}
