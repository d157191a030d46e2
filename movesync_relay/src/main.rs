//! Standalone relay binary.
//!
//! Usage:
//!   cargo run -p movesync_relay -- [--addr 127.0.0.1:40100]
//!
//! Accepts client connections, assigns identities and forwards pose updates
//! between them until interrupted.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use movesync_relay::Relay;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "relay", about = "Movement-sync pose relay")]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "127.0.0.1:40100")]
    addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let addr: SocketAddr = args.addr.parse().context("parse --addr")?;
    let relay = Relay::bind(addr).await.context("bind relay")?;
    info!(local = %relay.local_addr()?, "Relay listening");

    tokio::select! {
        res = relay.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!(peers = relay.peer_count(), forwarded = relay.forwarded(), "Relay shutting down");
            Ok(())
        }
    }
}
