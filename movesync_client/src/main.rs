//! Headless client binary.
//!
//! Usage:
//!   cargo run -p movesync_client -- [--relay 127.0.0.1:40100] [--config sync.json]
//!                                   [--frames 600] [--name Player] [--offline]
//!
//! Loads the room geometry, seeds a spawn, connects to the relay and walks a
//! scripted path, logging its own pose and the neighbor table once a second.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use movesync_client::{
    client::{load_room_world, GameClient},
    input::{InputState, MoveKeys},
};
use movesync_shared::config::SyncConfig;
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "client", about = "Headless movement-sync client")]
struct Args {
    /// Relay address (overrides the config file).
    #[arg(long)]
    relay: Option<String>,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames to run.
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Player name (logging only).
    #[arg(long)]
    name: Option<String>,

    /// Run without connecting to a relay.
    #[arg(long)]
    offline: bool,
}

fn load_config(args: &Args) -> anyhow::Result<SyncConfig> {
    let mut cfg = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if let Some(relay) = &args.relay {
        cfg.relay_addr = relay.clone();
    }
    if let Some(name) = &args.name {
        cfg.player_name = name.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Input for frame `n` of the walk: forward, strafe and turn, with a hop
/// every two seconds and a crouch in between.
fn scripted_input(input: &mut InputState, n: u64, frame_hz: u32) {
    let hz = u64::from(frame_hz.max(1));
    let t = n % (hz * 8);
    input.keys = MoveKeys::empty();
    match t / hz {
        0 | 1 => input.press(MoveKeys::FORWARD),
        2 => {
            input.press(MoveKeys::FORWARD | MoveKeys::RIGHT);
            input.look(0.02, 0.0);
        }
        3 => input.press(MoveKeys::BACKWARD),
        4 => input.press(MoveKeys::LEFT | MoveKeys::CROUCH),
        5 => input.look(-0.03, 0.0),
        _ => input.press(MoveKeys::FORWARD),
    }
    if n % (hz * 2) == hz / 2 {
        input.press(MoveKeys::JUMP);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args).context("load config")?;
    info!(relay = %cfg.relay_addr, player = %cfg.player_name, offline = args.offline, "Starting client");

    let world = load_room_world(&cfg).await?;
    let mut client = if args.offline {
        GameClient::new(cfg.clone(), world)
    } else {
        GameClient::connect(cfg.clone(), world)
            .await
            .context("connect")?
    };
    if let Some(channel) = client.channel() {
        channel.on_ready(|id| info!(peer = %id, "Ready"));
    }
    client.seed_spawn(&mut rand::thread_rng());

    let dt = 1.0 / cfg.frame_hz.max(1) as f32;
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut input = InputState::default();

    for n in 0..args.frames {
        ticker.tick().await;
        scripted_input(&mut input, n, cfg.frame_hz);
        client.frame(&input, dt);

        if n % u64::from(cfg.frame_hz.max(1)) == 0 {
            let view = client.controller().transform();
            let neighbors = client.neighbors().map_or(0, |t| t.len());
            info!(
                frame = n,
                x = view.position.x,
                y = view.position.y,
                z = view.position.z,
                yaw = view.yaw,
                neighbors,
                state = ?client.connection_state(),
                "Status"
            );
        }
    }

    if let Some(channel) = client.channel() {
        channel.close();
    }
    info!(
        frames = client.frames(),
        sent = client.updates_sent(),
        "Client finished"
    );
    Ok(())
}
