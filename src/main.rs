//! netsysctrld - Network System Control Daemon
//!
//! This is the main entry point for the netsysctrl server.
//! It sets up the subsystems, the TCP listener, and handles incoming connections.

use anyhow::Context;
use netsysctrl::commands::Dispatcher;
use netsysctrl::connection::{handle_connection, ConnectionStats};
use netsysctrl::subsystems::{GpioController, ServerInfo, VolumeControl};
use netsysctrl::{ConfigAction, DaemonConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn print_help() {
    println!(
        r#"
netsysctrld - Network System Control Daemon

USAGE:
    netsysctrld [OPTIONS]

OPTIONS:
    -h, --host <HOST>             Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>             Port to listen on (default: 5000)
    -a, --audio-control <NAME>    Mixer control to adjust (default: Master)
        --mixer <PROGRAM>         Mixer program (default: amixer)
    -g, --gpio-pin <NAME:NUMBER>  Register an output pin (repeatable)
    -l, --gpio-init-low           Export all pins and drive them low at startup
        --gpio-root <DIR>         sysfs GPIO root (default: /sys/class/gpio)
    -v, --version                 Print version information
        --help                    Print this help message

EXAMPLES:
    netsysctrld                               # Start on 0.0.0.0:5000
    netsysctrld --port 6000 -a PCM            # Adjust the PCM control
    netsysctrld -g lamp:17 -g fan:27 -l       # Two pins, driven low at startup

CONNECTING:
    Use any line-oriented TCP client:
    $ nc 127.0.0.1 5000
    VOLUME=40
    ~OK
    SET_PIN=door:1
    ~INVALID PARAMETER; Pin: door not registered
"#
    );
}

fn print_banner(local_addr: SocketAddr) {
    println!(
        r#"
netsysctrl v{} - Network System Control Daemon
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections. Send HELP for a command listing.

Use Ctrl+C to shutdown gracefully.
"#,
        netsysctrl::VERSION,
        local_addr
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match DaemonConfig::from_env() {
        Ok(ConfigAction::Run(config)) => config,
        Ok(ConfigAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(ConfigAction::Version) => {
            println!("netsysctrl version {}", netsysctrl::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Set up logging, overridable through RUST_LOG
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    let local_addr = listener.local_addr()?;
    info!("Listening on {}", local_addr);

    // Create the subsystems (shared across all connections)
    let server = Arc::new(ServerInfo::new(local_addr));

    let volume = Arc::new(VolumeControl::new(config.volume)?);
    info!(
        control = %volume.config().audio_control,
        mixer = %volume.config().mixer_program.display(),
        "Volume control initialized"
    );

    let init_output_low = config.gpio.init_output_low;
    let gpio = Arc::new(GpioController::new(config.gpio)?);
    info!(pins = gpio.pins().len(), "GPIO controller initialized");

    if init_output_low {
        let pins = Arc::clone(&gpio);
        tokio::task::spawn_blocking(move || pins.initialize_output_low())
            .await?
            .context("failed to initialize GPIO pins")?;
    }

    let dispatcher = Arc::new(Dispatcher::with_default_tables(
        volume,
        Arc::clone(&server),
        gpio,
    )?);

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Print the banner
    print_banner(local_addr);

    // Main accept loop, raced against shutdown signals
    tokio::select! {
        _ = accept_loop(listener, dispatcher, server, stats) => {}
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    server: Arc<ServerInfo>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let dispatcher = Arc::clone(&dispatcher);
                let server = Arc::clone(&server);
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, dispatcher, server, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
