use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use rover_link_peer::{serve, Observability, PeerConfig, PeerState};
use tokio::{net::TcpListener, signal};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "rover-peer",
    author,
    version,
    about = "Simulated rover that speaks the teleoperation link protocol"
)]
struct Cli {
    /// Address to bind the websocket listener to.
    #[arg(long, env = "ROVER_PEER_LISTEN_ADDR", default_value = "127.0.0.1:8765")]
    listen_addr: String,

    /// Push telemetry every N milliseconds in addition to command replies (0 disables).
    #[arg(long, env = "ROVER_PEER_PUSH_INTERVAL_MS", default_value_t = 0)]
    push_interval_ms: u64,

    /// Send a telemetry report as soon as a console connects.
    #[arg(long, env = "ROVER_PEER_ANNOUNCE", default_value_t = false)]
    announce: bool,

    /// Grace period open connections get during shutdown.
    #[arg(long, env = "ROVER_PEER_SHUTDOWN_GRACE_SECS", default_value_t = 2)]
    shutdown_grace_secs: u64,
}

impl TryFrom<Cli> for PeerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        let push_interval =
            (cli.push_interval_ms > 0).then(|| Duration::from_millis(cli.push_interval_ms));
        Ok(PeerConfig {
            listen_addr,
            push_interval,
            announce_on_connect: cli.announce,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let observability = Observability::init()?;

    let cli = Cli::parse();
    let config = PeerConfig::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        push_interval_ms = config.push_interval.map(|d| d.as_millis() as u64),
        announce = config.announce_on_connect,
        "starting rover peer"
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("rover peer listening on {}", listener.local_addr()?);

    let state = Arc::new(PeerState::new(config, Some(observability.metrics_handle())));
    let signal_state = Arc::clone(&state);
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("shutdown signal received");
        signal_state.begin_shutdown();
    });

    serve(listener, state)
        .await
        .context("server shutdown with error")?;
    info!("graceful shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_console() {
        let cli = Cli::parse_from(["rover-peer"]);
        let config = PeerConfig::try_from(cli).expect("config");
        assert_eq!(config.listen_addr, "127.0.0.1:8765".parse().unwrap());
        assert_eq!(config.push_interval, None);
        assert!(!config.announce_on_connect);
    }

    #[test]
    fn push_interval_and_announce_flags() {
        let cli = Cli::parse_from([
            "rover-peer",
            "--push-interval-ms",
            "250",
            "--announce",
            "--listen-addr",
            "0.0.0.0:9000",
        ]);
        let config = PeerConfig::try_from(cli).expect("config");
        assert_eq!(config.push_interval, Some(Duration::from_millis(250)));
        assert!(config.announce_on_connect);
        assert_eq!(config.listen_addr.port(), 9000);
    }

    #[test]
    fn rejects_bad_listen_addr() {
        let cli = Cli::parse_from(["rover-peer", "--listen-addr", "not-an-addr"]);
        assert!(PeerConfig::try_from(cli).is_err());
    }
}
