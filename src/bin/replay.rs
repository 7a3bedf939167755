//! traffic-replay binary
//!
//! Connects to the simulation backend, runs one replay session headless and
//! logs live statistics until the simulation completes or Ctrl-C.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                            | Default                                           | Description                  |
//! |--------------------------------|---------------------------------------------------|------------------------------|
//! | `REPLAY_ENDPOINT`              | `ws://localhost:8000/api/scenario/ws/simulation`  | Simulation channel URL       |
//! | `REPLAY_DURATION`              | `3600`                                            | Simulated seconds            |
//! | `REPLAY_SIMULATION_SPEED`      | unset                                             | Initial speed multiplier     |
//! | `REPLAY_BLOCK_MOTORWAY_LINKS`  | unset                                             | Initial motorway block       |
//! | `REPLAY_EVENT_BUFFER`          | `1024`                                            | Bridge event queue depth     |
//! | `REPLAY_POLL_INTERVAL_MS`      | `50`                                              | Session poll period          |
//! | `REPLAY_STATS_INTERVAL_SECS`   | `5`                                               | Statistics log period (0 = off) |
//!
//! CLI flags override both.

use anyhow::{bail, Result};
use clap::Parser;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use traffic_replay::{
    BridgeConfig, ConnectionState, ReplayConfig, ReplaySession, StopReason, WsBridge,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "traffic-replay", about = "Live traffic simulation replay", version)]
struct Args {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Simulation channel URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Simulated duration in seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Initial simulation speed multiplier
    #[arg(long)]
    speed: Option<f64>,

    /// Block motorway links from the start
    #[arg(long)]
    block_motorway_links: bool,

    /// Seconds between statistics log lines (0 disables)
    #[arg(long)]
    stats_interval: Option<u64>,
}

impl Args {
    fn apply(self, mut cfg: ReplayConfig) -> ReplayConfig {
        if let Some(endpoint) = self.endpoint {
            cfg.endpoint = endpoint;
        }
        if let Some(duration) = self.duration {
            cfg.duration = duration;
        }
        if self.speed.is_some() {
            cfg.simulation_speed = self.speed;
        }
        if self.block_motorway_links {
            cfg.block_motorway_links = Some(true);
        }
        if let Some(secs) = self.stats_interval {
            cfg.stats_interval_secs = secs;
        }
        cfg
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("traffic_replay=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let file = args.config.clone();
    let cfg = args.apply(ReplayConfig::load(file.as_deref())?);

    tracing::info!(
        endpoint = %cfg.endpoint,
        duration = cfg.duration,
        "Starting traffic-replay"
    );

    let bridge = WsBridge::new(BridgeConfig {
        event_buffer: cfg.event_buffer,
    });
    let mut session = ReplaySession::new(cfg.endpoint.clone(), bridge);

    let completed = Rc::new(Cell::new(false));
    {
        let completed = completed.clone();
        session.on_complete(move || completed.set(true));
    }
    session.on_error(|err| tracing::error!("Replay failed: {}", err));

    session.start(cfg.session_params())?;

    let mut poll = tokio::time::interval(cfg.poll_interval());
    let mut stats = cfg.stats_interval().map(tokio::time::interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                session.poll();
                if session.state().is_closed() {
                    break;
                }
            }
            _ = async {
                match stats.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => log_stats(&session),
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping session");
                session.stop(StopReason::User);
                break;
            }
        }
    }

    match session.state() {
        ConnectionState::ClosedError => bail!(
            "session ended with error: {}",
            session.last_error().unwrap_or("unknown")
        ),
        _ if completed.get() => tracing::info!("Simulation complete"),
        _ => tracing::info!("Session closed"),
    }
    Ok(())
}

fn log_stats(session: &ReplaySession<WsBridge>) {
    if session.state() != ConnectionState::Open {
        return;
    }
    let stats = session.stats();
    let status = session.control_status();
    tracing::info!(
        progress = session.progress().unwrap_or(0),
        avg_speed_kmh = %format!("{:.1}", session.speed_series().current()),
        speed_applied = status.speed_applied,
        block_applied = status.block_applied,
        "Live: {}",
        stats
    );
}
