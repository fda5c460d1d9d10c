mod launch_table;
mod launcher;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use launcher::{Escalation, Launcher};
use rlaunch_core::runtime::{env_true, resolve_session_id, resolve_socket_path};
use server::AgentConfig;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rlaunch-agent", about = "Launch agent serving the remote-launch panel")]
struct Args {
    /// Launch table (TOML, one [[launch]] table per entry).
    #[arg(long, default_value = "launch.toml")]
    config: PathBuf,
    /// Socket path. Defaults to $RLAUNCH_SOCK or the per-session runtime path.
    #[arg(long)]
    socket: Option<PathBuf>,
    #[arg(long, default_value = "")]
    session: String,
    #[arg(long, default_value_t = 1000)]
    publish_interval_ms: u64,
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,
    #[arg(long, default_value_t = 2)]
    write_timeout: u64,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn load_config(args: &Args) -> AgentConfig {
    let session_id = if args.session.trim().is_empty() {
        resolve_session_id()
    } else {
        args.session.clone()
    };
    let socket_path = args
        .socket
        .clone()
        .unwrap_or_else(|| resolve_socket_path(&session_id));
    AgentConfig {
        session_id,
        socket_path,
        publish_interval: Duration::from_millis(args.publish_interval_ms.max(1)),
        write_timeout: Duration::from_secs(args.write_timeout.max(1)),
        queue_capacity: args.queue_capacity.max(1),
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("RLAUNCH_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug || env_true("RLAUNCH_DEBUG"));

    let config = load_config(&args);
    let table = launch_table::load(&args.config)?;
    let launcher = Launcher::new(table, Escalation::default());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "agent_shutdown_requested");
        let _ = shutdown_tx.send(true);
    });

    server::run(config.clone(), launcher, shutdown_rx)
        .await
        .with_context(|| format!("agent socket {}", config.socket_path.display()))
}
