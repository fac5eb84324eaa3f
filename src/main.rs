//! Streaming SOAP echo server binary.
//!
//! Run with: `streaming-soap --config config.yaml`
//!
//! Every connection carries one SOAP request; the response is written back
//! before the connection is closed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streaming_soap::{EchoEndpoint, SoapServer, StreamingSoapConfig, TcpReceiverConnection};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// SOAP server echoing request payloads.
///
/// Errors raised while processing are turned into SOAP faults using the
/// fault mappings of the configuration file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address, overrides `settings.listen` (e.g. "0.0.0.0:8080")
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting streaming SOAP server v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config: StreamingSoapConfig = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        StreamingSoapConfig::default()
    };

    info!(
        soap_version = %config.factory.soap_version,
        payload_caching = config.factory.payload_caching,
        fault_mappings = config.faults.mappings.len(),
        "Configuration loaded"
    );

    let mut server = SoapServer::from_config(&config).context("Invalid fault configuration")?;
    server.set_default_endpoint(Arc::new(EchoEndpoint));
    let server = Arc::new(server);
    info!(factory = %server.factory(), "Server initialized");

    let listen = args.listen.unwrap_or_else(|| config.settings.listen.clone());
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!("Listening on {}", listen);

    let read_timeout = Duration::from_secs(config.settings.read_timeout_secs);

    tokio::select! {
        result = accept_loop(listener, Arc::clone(&server), read_timeout) => {
            result.context("Accept loop failed")?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server");
        }
    }

    info!(
        requests_processed = server.requests_processed(),
        faults_returned = server.faults_returned(),
        "Streaming SOAP server stopped"
    );
    Ok(())
}

/// Accept connections and serve each on the blocking pool.
async fn accept_loop(
    listener: TcpListener,
    server: Arc<SoapServer>,
    read_timeout: Duration,
) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(peer = %peer, "Connection accepted");

        let socket = socket.into_std()?;
        socket.set_nonblocking(false)?;
        let server = Arc::clone(&server);
        tokio::task::spawn_blocking(move || {
            let connection = TcpReceiverConnection::new(socket);
            if let Err(e) = connection.set_read_timeout(Some(read_timeout)) {
                warn!(peer = %peer, error = %e, "Could not set read timeout");
            }
            if let Err(e) = server.handle_connection(connection) {
                warn!(peer = %peer, error = %e, "Connection failed");
            }
        });
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
