use std::time::Duration;

use clap::Parser;
use rover_link_core::{SpeedPreset, DEFAULT_ROVER_URL};
use thiserror::Error;

use crate::{SessionConfig, DEFAULT_MAX_LOGS};

#[derive(Debug, Parser)]
#[command(
    name = "rover-console",
    author,
    version,
    about = "Headless operator console for the rover teleoperation link"
)]
pub struct Cli {
    /// Websocket address of the rover.
    #[arg(long, env = "ROVER_CONSOLE_URL", default_value = DEFAULT_ROVER_URL)]
    pub url: String,

    /// Speed preset active at startup.
    #[arg(long, env = "ROVER_CONSOLE_SPEED", default_value = "normal")]
    pub speed: SpeedPreset,

    /// How often held keys are sampled into movement commands.
    #[arg(long, env = "ROVER_CONSOLE_POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Number of history entries kept.
    #[arg(long, env = "ROVER_CONSOLE_MAX_LOGS", default_value_t = DEFAULT_MAX_LOGS)]
    pub max_logs: usize,

    /// Outbound queue depth; commands beyond it are dropped.
    #[arg(long, env = "ROVER_CONSOLE_OUTBOUND_BUFFER", default_value_t = 32)]
    pub outbound_buffer: usize,

    /// Give up on a connection attempt after this many seconds.
    #[arg(long, env = "ROVER_CONSOLE_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    pub connect_timeout_secs: u64,

    /// Do not connect on startup; wait for `connect`.
    #[arg(long, default_value_t = false)]
    pub no_autoconnect: bool,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub session: SessionConfig,
    pub speed: SpeedPreset,
    pub max_logs: usize,
    pub autoconnect: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rover url must start with ws:// or wss://, got `{0}`")]
    InvalidUrl(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl TryFrom<Cli> for ConsoleConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if !(cli.url.starts_with("ws://") || cli.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(cli.url));
        }
        if cli.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("poll interval"));
        }
        if cli.max_logs == 0 {
            return Err(ConfigError::Zero("max logs"));
        }
        if cli.outbound_buffer == 0 {
            return Err(ConfigError::Zero("outbound buffer"));
        }

        Ok(ConsoleConfig {
            session: SessionConfig {
                url: cli.url,
                connect_timeout: Duration::from_secs(cli.connect_timeout_secs),
                outbound_buffer: cli.outbound_buffer,
                poll_interval: Duration::from_millis(cli.poll_interval_ms),
                ..SessionConfig::default()
            },
            speed: cli.speed,
            max_logs: cli.max_logs,
            autoconnect: !cli.no_autoconnect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_console() {
        let cli = Cli::try_parse_from(["rover-console"]).unwrap();
        let config = ConsoleConfig::try_from(cli).unwrap();

        assert_eq!(config.session.url, "ws://localhost:8765");
        assert_eq!(config.session.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_logs, 50);
        assert_eq!(config.speed, SpeedPreset::Normal);
        assert!(config.autoconnect);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "rover-console",
            "--url",
            "ws://10.0.0.2:81",
            "--speed",
            "fast",
            "--max-logs",
            "5",
            "--no-autoconnect",
        ])
        .unwrap();
        let config = ConsoleConfig::try_from(cli).unwrap();

        assert_eq!(config.session.url, "ws://10.0.0.2:81");
        assert_eq!(config.speed, SpeedPreset::Fast);
        assert_eq!(config.max_logs, 5);
        assert!(!config.autoconnect);
    }

    #[test]
    fn rejects_non_websocket_urls() {
        let cli = Cli::try_parse_from(["rover-console", "--url", "http://rover"]).unwrap();
        assert!(matches!(
            ConsoleConfig::try_from(cli),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_unknown_speed_preset() {
        assert!(Cli::try_parse_from(["rover-console", "--speed", "warp"]).is_err());
    }
}
