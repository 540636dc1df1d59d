use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub listen_addr: SocketAddr,
    /// Push telemetry on this cadence in addition to replying to commands.
    pub push_interval: Option<Duration>,
    /// Send one report as soon as a console connects.
    pub announce_on_connect: bool,
    pub shutdown_grace: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            push_interval: None,
            announce_on_connect: false,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl PeerConfig {
    /// Config bound to an ephemeral loopback port.
    pub fn ephemeral() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            shutdown_grace: Duration::ZERO,
            ..Self::default()
        }
    }
}
