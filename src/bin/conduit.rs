//! Conduit CLI
//!
//! A thin binary wrapper over `conduit-core`. Concrete HTTP routing,
//! database/broker wiring and config loading belong to the embedding
//! application; this binary only exposes the pieces that make sense to run
//! standalone - a health server and version/info commands.

use clap::{Parser, Subcommand};
use conduit_core::health::{HealthServer, SimpleHealthCheck};
use conduit_core::shutdown::GracefulShutdown;

#[derive(Parser)]
#[command(name = "conduit", version, about = "Messaging, saga orchestration and request-context core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a standalone health check server on the given port
    Health {
        /// Port to bind the health server to
        #[arg(long, default_value_t = 8081)]
        port: u16,
    },
    /// Print build and feature information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Health { port } => run_health_server(port).await,
        Command::Info => {
            print_info();
            Ok(())
        }
    }
}

async fn run_health_server(port: u16) -> anyhow::Result<()> {
    let shutdown = GracefulShutdown::new();
    let server = HealthServer::new(SimpleHealthCheck::new()).port(port);

    tracing::info!(port, "starting health server");

    tokio::select! {
        result = server.serve() => result.map_err(|e| anyhow::anyhow!(e.to_string())),
        _ = shutdown.wait() => {
            tracing::info!("shutdown signal received, stopping health server");
            Ok(())
        }
    }
}

fn print_info() {
    println!("conduit {}", env!("CARGO_PKG_VERSION"));
    println!("features: broker, orchestration, context, edge, health");
}
