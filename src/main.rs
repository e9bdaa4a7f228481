//! respkv - A Minimal RESP Key-Value Server
//!
//! This is the main entry point for the respkv server.
//! It parses the command line, builds the logger and runs the server.

use clap::Parser;
use respkv::config::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_QUEUE_CAPACITY};
use respkv::{Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use tokio::signal;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, Dispatch};
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "respkv", version, about = "A minimal RESP key-value server")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Capacity of the queue between connection readers and the dispatcher
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Largest partial frame buffered per connection before it is dropped, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            queue_capacity: self.queue_capacity,
            max_frame_size: self.max_frame_size,
            ..ServerConfig::default()
        }
    }
}

/// Builds the logger handed to the server. `RUST_LOG` overrides the level.
fn build_logger() -> Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    Dispatch::new(subscriber)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();
    let logger = build_logger();

    run(config, logger.clone()).with_subscriber(logger).await
}

async fn run(config: ServerConfig, logger: Dispatch) -> anyhow::Result<()> {
    info!(version = respkv::VERSION, "Starting respkv");

    let server = match Server::bind(config, logger).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        result = server.run() => result?,
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}
