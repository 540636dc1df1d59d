//! Reference rover peer.
//!
//! Accepts console connections over a websocket, applies inbound commands to
//! a simulated rover and answers each one with a telemetry report. It can
//! also announce telemetry on connect and push it on its own cadence, which
//! is how real rover firmware behaves.

pub mod config;
pub mod observability;
pub mod registry;
pub mod rover;
pub mod server;

pub use config::PeerConfig;
pub use observability::Observability;
pub use registry::{PeerRegistry, PeerSnapshot};
pub use rover::{RoverModel, RoverStatus};
pub use server::{router, serve, spawn, PeerError, PeerState, RunningPeer};
