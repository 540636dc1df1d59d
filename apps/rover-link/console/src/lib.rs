//! Operator side of the rover link.
//!
//! Held direction keys are sampled on a fixed cadence and resolved into a
//! single movement intent, the command builder stamps the active speed
//! multiplier onto it, and the [`Session`] pushes it to the rover on a best
//! effort basis while a receive loop folds inbound telemetry into the
//! [`TelemetryStore`].

pub mod builder;
pub mod config;
pub mod context;
pub mod input;
pub mod keys;
pub mod operator;
pub mod session;
pub mod store;

pub use builder::{build, Intent};
pub use config::ConsoleConfig;
pub use context::SessionContext;
pub use input::{ConsoleInput, InputError};
pub use keys::{resolve, DirectionKey, PressedKeys};
pub use operator::{Operator, Reply};
pub use session::{LinkError, Session, SessionConfig, SessionError, SessionState};
pub use store::{LogEntry, TelemetryStore, DEFAULT_MAX_LOGS};
