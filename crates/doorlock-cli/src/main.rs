//! `doorlock`: the door controller binary.
//!
//! ```text
//! doorlock [--config PATH] run [--simulate]
//! doorlock [--config PATH] open-door
//! doorlock ports
//! ```

mod cli;
mod supervisor;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use doorlock_access::{AccessController, AccessSettings};
use doorlock_core::Config;
use doorlock_hardware::mock::MockRelayBoard;
use doorlock_hardware::{RelayBoard, RelayLink, ScanPump, SerialRfidReader};
use doorlock_storage::{Database, DatabaseConfig, MemoryRegistry, SqliteRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

/// Scans buffered between the reader and the controller.
const SCAN_QUEUE: usize = 32;

/// How long shutdown waits for blocked reader threads.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(dispatch(cli));
    // A stdin reader blocks a pool thread forever; do not wait for it.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ports => list_ports(),
        Command::Run { simulate } => {
            let config = cli.load_config()?;
            init_tracing(&config);
            run(config, simulate).await
        }
        Command::OpenDoor => {
            let config = cli.load_config()?;
            init_tracing(&config);
            open_door(config).await
        }
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(config: Config, simulate: bool) -> Result<()> {
    info!(version = doorlock_core::VERSION, simulate, "doorlock starting");

    let db = Database::new(DatabaseConfig::from(&config.registry))
        .await
        .context("Failed to open the registry")?;
    let registry = SqliteRegistry::new(db.clone());

    let board = Arc::new(RelayBoard::new(RelayLink::from_config(&config.relay)));
    let _simulated_board = if simulate {
        let (io, mock) = MockRelayBoard::spawn();
        board.link().attach(io).await?;
        info!("Using a simulated relay board");
        Some(mock)
    } else {
        if let Err(e) = board.connect().await {
            warn!(error = %e, "Relay board not reachable, will keep trying");
        }
        None
    };

    let controller = Arc::new(AccessController::new(
        Arc::clone(&board),
        registry,
        AccessSettings::from_config(&config),
    ));
    if board.is_connected()
        && let Err(e) = controller.initialize().await
    {
        warn!(error = %e, "Relay board initialization failed");
    }

    let cancel = CancellationToken::new();
    let (events, scans) = mpsc::channel(SCAN_QUEUE);
    let pump = ScanPump::new();
    let mut pump_task = if simulate {
        info!("Reading card UIDs from stdin, one per line");
        pump.spawn(SerialRfidReader::from_reader(tokio::io::stdin()), events, cancel.clone())
    } else {
        let reader = SerialRfidReader::open(&config.rfid.port, config.rfid.baud_rate)?;
        pump.spawn(reader, events, cancel.clone())
    };

    let supervisor_task = (!simulate).then(|| {
        let connect_board = Arc::clone(&board);
        tokio::spawn(supervisor::supervise_link(
            Arc::clone(&controller),
            move || {
                let board = Arc::clone(&connect_board);
                async move { board.connect().await }
            },
            config.relay.reconnect_delay(),
            cancel.clone(),
        ))
    });

    let controller_task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(scans).await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
        }
        result = &mut pump_task => {
            match result {
                Ok(Ok(())) => info!("Card reader stopped"),
                Ok(Err(e)) => error!(error = %e, "Card reader failed"),
                Err(e) => error!(error = %e, "Card reader task panicked"),
            }
        }
    }

    cancel.cancel();
    controller.shutdown().await;
    controller_task.await.context("Controller task panicked")?;
    if let Some(task) = supervisor_task {
        task.await.context("Link supervisor panicked")?;
    }
    db.close().await;

    info!("doorlock stopped");
    Ok(())
}

async fn open_door(config: Config) -> Result<()> {
    let board = Arc::new(RelayBoard::new(RelayLink::from_config(&config.relay)));
    board
        .connect()
        .await
        .with_context(|| format!("Failed to open relay board on {}", config.relay.port))?;
    if !board.setup().await {
        board.disconnect().await;
        bail!("Relay board did not answer setup");
    }

    // The door command needs no card lookup.
    let controller = AccessController::new(
        board,
        MemoryRegistry::new(),
        AccessSettings::from_config(&config),
    );
    let result = controller.request_open_door().await;
    controller.shutdown().await;
    result.context("Door sequence failed")?;

    info!("Door opened and closed again");
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = tokio_serial::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }
    Ok(())
}
