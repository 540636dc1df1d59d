//! Connection lifecycle for one console ↔ rover link.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected ──close()──▶ Closing ──▶ Closed
//!                                  │                 │
//!                                  ├──err──▶ Failed  └──peer closed / I/O / decode error──▶ Disconnected
//!                                  └──close()──▶ Closing ──▶ Closed
//! ```
//!
//! Failures are reported into the telemetry history and never retried
//! automatically; reconnecting is the operator's call.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use parking_lot::Mutex;
use rover_link_core::{decode_telemetry, encode_command, Command, DecodeError, DEFAULT_ROVER_URL};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{mpsc, mpsc::error::TrySendError, watch},
    task::{AbortHandle, JoinHandle},
    time::{interval, timeout, MissedTickBehavior},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::{build, Intent, PressedKeys, SessionContext, TelemetryStore};

type RoverSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Depth of the outbound queue. Commands that do not fit are dropped.
    pub outbound_buffer: usize,
    /// Cadence at which held keys are sampled into movement commands.
    pub poll_interval: Duration,
    /// How long `close()` waits for the transport to shut down.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ROVER_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            poll_interval: Duration::from_millis(100),
            close_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    fn can_connect(&self) -> bool {
        matches!(
            self,
            SessionState::Disconnected | SessionState::Closed | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("error connecting to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
    #[error("cannot connect while session is {0}")]
    Busy(SessionState),
    #[error("connection attempt to {0} was cancelled")]
    Cancelled(String),
}

/// Why an established link went away.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("malformed telemetry: {0}")]
    Decode(#[from] DecodeError),
    #[error("rover closed the connection{}", reason_suffix(.0))]
    TransportClosed(Option<String>),
    #[error("transport error: {0}")]
    Transport(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!(" ({reason})"),
        _ => String::new(),
    }
}

/// Handle to the link. Cloning shares the same underlying session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    context: Arc<SessionContext>,
    store: Arc<TelemetryStore>,
    state: watch::Sender<SessionState>,
    link: Mutex<Link>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct Link {
    outbound: Option<mpsc::Sender<Message>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    driver: Option<JoinHandle<()>>,
    connector: Option<AbortHandle>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        context: Arc<SessionContext>,
        store: Arc<TelemetryStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                config,
                context,
                store,
                state,
                link: Mutex::new(Link::default()),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Receiver for the connection-status indicator.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.inner.store
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.inner.context
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Commands handed to the transport so far.
    pub fn sent_commands(&self) -> u64 {
        self.inner.sent.load(Ordering::Relaxed)
    }

    /// Commands discarded because the session was not connected or the
    /// outbound queue was full.
    pub fn dropped_commands(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Opens the websocket and starts the receive loop.
    ///
    /// A failed attempt leaves the session in `Failed`, logs the reason to
    /// the telemetry history and is not retried. The attempt runs on its own
    /// task: dropping this future leaves it to settle into `Connected` or
    /// `Failed`, and [`Session::close`] aborts it.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let url = self.inner.config.url.clone();
        let attempt = {
            let mut link = self.inner.link.lock();
            let claimed = self.inner.state.send_if_modified(|state| {
                if state.can_connect() {
                    *state = SessionState::Connecting;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                return Err(SessionError::Busy(self.state()));
            }
            info!(url = %url, "connecting to rover");
            let attempt = tokio::spawn(establish(Arc::clone(&self.inner)));
            link.connector = Some(attempt.abort_handle());
            attempt
        };

        match attempt.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Cancelled(url)),
        }
    }

    /// Queues a command for the rover without waiting.
    ///
    /// Returns `false` when the command was dropped: the session is not
    /// connected, or the outbound queue is full. Neither case is an error.
    pub fn send(&self, command: Command) -> bool {
        if !self.state().is_connected() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(cmd = command.name(), "not connected; dropping command");
            return false;
        }

        let Some(outbound) = self.inner.link.lock().outbound.clone() else {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let payload = match encode_command(&command) {
            Ok(payload) => payload,
            Err(err) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(cmd = command.name(), error = %err, "dropping unencodable command");
                return false;
            }
        };
        match outbound.try_send(Message::Text(payload.into())) {
            Ok(()) => {
                self.inner.sent.fetch_add(1, Ordering::Relaxed);
                debug!(cmd = command.name(), "command queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(cmd = command.name(), "outbound queue full; dropping command");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(cmd = command.name(), "writer gone; dropping command");
                false
            }
        }
    }

    /// Builds an intent against the session context and sends it.
    pub fn issue(&self, intent: Intent) -> Command {
        let command = build(intent, &self.inner.context);
        self.send(command.clone());
        command
    }

    /// Samples `keys` every poll interval and sends the resolved movement.
    ///
    /// Held keys re-send their direction on every tick; the rover treats
    /// repeats as "keep going". Releasing everything sends a single `stop`.
    /// Replaces any drive loop already running.
    pub fn start_driving(&self, keys: PressedKeys) {
        let session = Arc::downgrade(&self.inner);
        let period = self.inner.config.poll_interval;
        let driver = tokio::spawn(drive_loop(session, keys, period));
        if let Some(previous) = self.inner.link.lock().driver.replace(driver) {
            previous.abort();
        }
    }

    /// Stops the drive loop and closes the transport, waiting for the close
    /// handshake to finish (bounded by the configured close timeout). A
    /// pending connection attempt is aborted.
    pub async fn close(&self) {
        let (link, previous) = {
            let mut link = self.inner.link.lock();
            let previous = self.state();
            if previous == SessionState::Closing {
                debug!("close already in progress");
                return;
            }
            if matches!(previous, SessionState::Connected | SessionState::Connecting) {
                self.inner.state.send_replace(SessionState::Closing);
            }
            (std::mem::take(&mut *link), previous)
        };

        if let Some(connector) = link.connector {
            connector.abort();
        }
        if let Some(driver) = link.driver {
            driver.abort();
        }
        drop(link.outbound);

        if let Some(writer) = link.writer {
            let abort = writer.abort_handle();
            if timeout(self.inner.config.close_timeout, writer).await.is_err() {
                warn!("transport did not close in time; aborting writer");
                abort.abort();
            }
        }
        if let Some(reader) = link.reader {
            reader.abort();
            let _ = reader.await;
        }

        self.inner.state.send_replace(SessionState::Closed);
        match previous {
            SessionState::Connected => {
                self.inner.store.append_log("Connection closed");
                info!("rover link closed");
            }
            SessionState::Connecting => {
                self.inner.store.append_log("Connection attempt cancelled");
                info!("connection attempt cancelled");
            }
            _ => {}
        }
    }
}

impl SessionInner {
    fn fail_connect(&self, err: SessionError) -> SessionError {
        let mut link = self.link.lock();
        let failed = self.state.send_if_modified(|state| {
            if *state == SessionState::Connecting {
                *state = SessionState::Failed;
                true
            } else {
                false
            }
        });
        if failed {
            link.connector = None;
            warn!(error = %err, "connection attempt failed");
            self.store.append_log(format!("Error connecting: {err}"));
        }
        err
    }

    fn on_link_lost(&self, err: LinkError) {
        // Taking the link lock first orders this after the connect that
        // spawned the reader has published `Connected`.
        let mut link = self.link.lock();
        let transitioned = self.state.send_if_modified(|state| {
            if state.is_connected() {
                *state = SessionState::Disconnected;
                true
            } else {
                false
            }
        });
        if !transitioned {
            // close() is tearing the link down and reports it itself.
            return;
        }

        drop(link.outbound.take());
        warn!(error = %err, "rover link lost");
        self.store.append_log(format!("Disconnected: {err}"));
    }
}

async fn establish(inner: Arc<SessionInner>) -> Result<(), SessionError> {
    let url = inner.config.url.clone();
    let socket = match timeout(inner.config.connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(err)) => {
            return Err(inner.fail_connect(SessionError::Connect {
                url,
                reason: err.to_string(),
            }))
        }
        Err(_) => return Err(inner.fail_connect(SessionError::ConnectTimeout(url))),
    };

    let (sink, stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(inner.config.outbound_buffer.max(1));

    let mut link = inner.link.lock();
    if *inner.state.borrow() != SessionState::Connecting {
        // close() got here first; the fresh socket is dropped unused.
        return Err(SessionError::Cancelled(url));
    }
    link.connector = None;
    link.outbound = Some(outbound_tx);
    link.writer = Some(tokio::spawn(write_loop(sink, outbound_rx)));
    link.reader = Some(tokio::spawn(receive_loop(Arc::clone(&inner), stream)));
    inner.state.send_replace(SessionState::Connected);
    inner.store.append_log(format!("Connected to rover at {url}"));
    info!(url = %url, "rover link established");
    Ok(())
}

async fn write_loop(mut sink: SplitSink<RoverSocket, Message>, mut outbound: mpsc::Receiver<Message>) {
    while let Some(message) = outbound.recv().await {
        if let Err(err) = sink.send(message).await {
            debug!(error = %err, "writer stopped");
            return;
        }
    }
    // Every sender is gone: the session is closing or the link was lost.
    if let Err(err) = sink.close().await {
        debug!(error = %err, "error closing websocket");
    }
}

async fn receive_loop(inner: Arc<SessionInner>, mut stream: SplitStream<RoverSocket>) {
    let err = loop {
        let payload = match stream.next().await {
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
            Some(Ok(Message::Close(frame))) => {
                break LinkError::TransportClosed(frame.map(|frame| frame.reason.as_str().to_owned()))
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => break LinkError::Transport(err.to_string()),
            None => break LinkError::TransportClosed(None),
        };

        match decode_telemetry(&payload) {
            Ok(snapshot) => {
                trace!(keys = snapshot.as_map().len(), "telemetry received");
                inner.store.apply(snapshot);
            }
            Err(err) => break LinkError::Decode(err),
        }
    };

    inner.on_link_lost(err);
}

async fn drive_loop(session: Weak<SessionInner>, keys: PressedKeys, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idle = true;

    loop {
        ticker.tick().await;
        let Some(inner) = session.upgrade() else {
            return;
        };
        let direction = keys.resolve();
        if direction.is_stop() && idle {
            continue;
        }
        idle = direction.is_stop();
        Session { inner }.issue(Intent::drive(direction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_link_core::Direction;

    fn offline_session() -> Session {
        let config = SessionConfig {
            // Nothing listens on port 1.
            url: "ws://127.0.0.1:1".into(),
            connect_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        };
        Session::new(
            config,
            Arc::new(SessionContext::default()),
            Arc::new(TelemetryStore::default()),
        )
    }

    #[test]
    fn send_while_disconnected_is_a_silent_no_op() {
        let session = offline_session();
        let sent = session.send(Command::Move {
            direction: Direction::Forward,
            speed: 1.0,
        });

        assert!(!sent);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.sent_commands(), 0);
        assert_eq!(session.dropped_commands(), 1);
        assert_eq!(session.store().log_len(), 0);
    }

    #[test_timeout::tokio_timeout_test]
    async fn failed_connect_is_reported_and_not_retried() {
        let session = offline_session();
        let mut status = session.subscribe();

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Connect { .. } | SessionError::ConnectTimeout(_)
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(*status.borrow_and_update(), SessionState::Failed);

        let entries = session.store().entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].text.starts_with("Error connecting"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn close_without_connection_ends_closed() {
        let session = offline_session();
        session.start_driving(PressedKeys::new());
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.store().log_len(), 0);
    }

    #[test]
    fn link_errors_read_naturally() {
        assert_eq!(
            LinkError::TransportClosed(None).to_string(),
            "rover closed the connection"
        );
        assert_eq!(
            LinkError::TransportClosed(Some("bye".into())).to_string(),
            "rover closed the connection (bye)"
        );
    }
}
