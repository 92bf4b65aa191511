//! `switchyard` binary: the host with the built-in apps and the in-memory
//! queue transport, configured from a JSON file.
//!
//! ```text
//! RUST_LOG=switchyard=debug switchyard --config-file config/local.json
//! curl http://127.0.0.1:8080/health/get
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchyard::health::Health;
use switchyard::queue::MemoryQueue;
use switchyard::{Config, Environment, Host, Server};

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Multiplexes app modules onto one HTTP endpoint and a set of queues")]
struct Cli {
    /// JSON config file.
    #[arg(long, default_value = "config/local.json")]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchyard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config_file)?;
    tracing::info!(
        name = %config.name,
        version = %config.version,
        env = ?config.env,
        port = config.port,
        queues = config.queues.len(),
        "configuration loaded"
    );

    let ip = match config.env {
        Environment::Local => IpAddr::V4(Ipv4Addr::LOCALHOST),
        _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    };
    let addr = SocketAddr::new(ip, config.port);

    let transport = Arc::new(MemoryQueue::with_queues(config.queues.values().cloned()));
    let host = Host::builder(config)
        .queue_transport(transport)
        .app(Health)
        .build()?;

    host.start_consumers().await?;
    Server::bind(addr).serve(host).await?;
    Ok(())
}
