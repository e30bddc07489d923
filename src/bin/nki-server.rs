//! Run the NKI packaging server.
//!
//! Run with: cargo run --bin nki-server -- --config nki.toml
//! Run with debug: RUST_LOG=nki_generator=debug cargo run --bin nki-server

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use nki_generator::{PackagingServer, ServiceConfig};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nki-server", version, about = "Package WAV samples with NKI templates")]
struct Args {
    /// TOML config file; built-in defaults are used when omitted.
    #[arg(short, long, env = "NKI_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file.
    #[arg(short, long, env = "NKI_BIND")]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nki_generator=info,nki_server=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ServiceConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Failed to load config");
                std::process::exit(1);
            }
        },
        None => {
            info!("No config file given, using defaults");
            ServiceConfig::default()
        }
    };

    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let server = match PackagingServer::bind(config).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to start packaging server");
            std::process::exit(1);
        }
    };

    info!("NKI generator running at http://{} (Ctrl+C to exit)", server.local_addr());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutting down...");
    };

    if let Err(e) = server.run(shutdown).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
