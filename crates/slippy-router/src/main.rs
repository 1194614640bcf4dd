//! `slippyrouter`: serve a slippymesh device to TCP clients.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use slippy_router::{
    spawn_serial_reader, Acceptor, Cli, ClientRegistry, CommandDispatcher, DeviceState,
    FrameClassifier, RouterConfig, RouterError, SerialLink, SerialPortDevice,
};
use tracing::{error, info, warn};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "slippyrouter failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RouterError> {
    let config = cli.into_config()?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting slippyrouter");
    install_metrics(&config);

    let device = SerialPortDevice::new(&config.serial_port, config.baud_rate, config.read_timeout());
    let link = Arc::new(SerialLink::new(Box::new(device), config.reset_delay()));
    link.open().map_err(|source| RouterError::SerialOpen {
        device: link.describe(),
        source,
    })?;

    let device_state = Arc::new(DeviceState::new());
    let registry = Arc::new(ClientRegistry::new());
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&link), Arc::clone(&device_state)));

    spawn_serial_reader(
        Arc::clone(&link),
        FrameClassifier::new(device_state),
        Arc::clone(&registry),
    )?;

    let acceptor = Acceptor::bind(&config, registry, dispatcher)?;
    info!(addr = %acceptor.local_addr()?, "listening for clients");

    acceptor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("slippyrouter stopped");
    Ok(())
}

#[cfg(feature = "prometheus")]
fn install_metrics(config: &RouterConfig) {
    if let Some(addr) = config.metrics_listen {
        match slippy_metrics::install_prometheus(addr) {
            Ok(()) => info!(%addr, "prometheus exporter listening"),
            Err(e) => warn!(%addr, error = %e, "failed to start prometheus exporter"),
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics(config: &RouterConfig) {
    if config.metrics_listen.is_some() {
        warn!("metrics_listen is set but slippyrouter was built without the prometheus feature");
    }
}
