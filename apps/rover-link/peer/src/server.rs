use std::{borrow::Cow, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use rover_link_core::{decode_command, encode_telemetry, EncodeError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::watch,
    task::JoinHandle,
    time::{interval_at, sleep, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{PeerConfig, PeerRegistry, PeerSnapshot, RoverModel, RoverStatus};

const DRAIN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("server exited with error: {0}")]
    Serve(#[source] std::io::Error),
    #[error("server task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
enum ConnectionError {
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

pub struct PeerState {
    pub config: PeerConfig,
    pub registry: PeerRegistry,
    rover: Mutex<RoverModel>,
    metrics: Option<PrometheusHandle>,
    shutdown: watch::Sender<bool>,
}

impl PeerState {
    pub fn new(config: PeerConfig, metrics: Option<PrometheusHandle>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            registry: PeerRegistry::new(),
            rover: Mutex::new(RoverModel::new()),
            metrics,
            shutdown,
        }
    }

    /// Stops accepting connections and closes the open ones.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn rover_status(&self) -> RoverStatus {
        self.rover.lock().status()
    }

    fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    active_connections: usize,
    connections: Vec<PeerSnapshot>,
    rover: RoverStatus,
}

pub fn router(state: Arc<PeerState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/healthz", get(health_handler))
        .route("/debug/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serves until [`PeerState::begin_shutdown`] is called, then gives open
/// connections up to `shutdown_grace` to finish their close handshake.
pub async fn serve(listener: TcpListener, state: Arc<PeerState>) -> Result<(), PeerError> {
    let shutdown = state.shutdown_signal();
    axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .map_err(PeerError::Serve)?;
    drain_connections(&state).await;
    Ok(())
}

async fn drain_connections(state: &PeerState) {
    let deadline = Instant::now() + state.config.shutdown_grace;
    while !state.registry.is_empty() && Instant::now() < deadline {
        sleep(DRAIN_POLL).await;
    }
    if !state.registry.is_empty() {
        warn!(
            remaining = state.registry.len(),
            "shutdown grace elapsed with connections still open"
        );
    }
}

/// A peer running on a background task.
pub struct RunningPeer {
    local_addr: SocketAddr,
    state: Arc<PeerState>,
    handle: JoinHandle<Result<(), PeerError>>,
}

impl RunningPeer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn state(&self) -> &Arc<PeerState> {
        &self.state
    }

    pub async fn shutdown(self) -> Result<(), PeerError> {
        self.state.begin_shutdown();
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(PeerError::Task(err.to_string())),
        }
    }
}

/// Binds `config.listen_addr` and serves on a spawned task.
pub async fn spawn(
    config: PeerConfig,
    metrics: Option<PrometheusHandle>,
) -> Result<RunningPeer, PeerError> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(PeerError::Bind)?;
    let local_addr = listener.local_addr().map_err(PeerError::Bind)?;
    let state = Arc::new(PeerState::new(config, metrics));
    let handle = tokio::spawn(serve(listener, Arc::clone(&state)));
    info!(%local_addr, "rover peer listening");
    Ok(RunningPeer {
        local_addr,
        state,
        handle,
    })
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn stats_handler(State(state): State<Arc<PeerState>>) -> impl IntoResponse {
    Json(StatsResponse {
        active_connections: state.registry.len(),
        connections: state.registry.snapshot(),
        rover: state.rover_status(),
    })
}

async fn metrics_handler(State(state): State<Arc<PeerState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn ws_handler(
    State(state): State<Arc<PeerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<PeerState>) {
    let connection_id = Uuid::new_v4();
    let active = state.registry.register(connection_id);
    gauge!("rover_peer_connections_active").set(active as f64);
    counter!("rover_peer_connections_total").increment(1);
    info!(connection_id = %connection_id, active, "console connected");

    if let Err(err) = serve_connection(socket, &state, connection_id).await {
        warn!(connection_id = %connection_id, error = %err, "connection ended with error");
    }

    // A dropped link must never leave the rover driving.
    state.rover.lock().stop();
    let active = state.registry.unregister(connection_id);
    gauge!("rover_peer_connections_active").set(active as f64);
    counter!("rover_peer_connections_closed_total").increment(1);
    info!(connection_id = %connection_id, active, "console disconnected; drive stopped");
}

async fn serve_connection(
    socket: WebSocket,
    state: &PeerState,
    connection_id: Uuid,
) -> Result<(), ConnectionError> {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let shutdown = state.shutdown_signal();
    let mut push = state.config.push_interval.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    if state.config.announce_on_connect {
        send_report(&mut ws_tx, state).await?;
    }

    let result = loop {
        tokio::select! {
            message = ws_rx.next() => {
                let payload = match message {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(frame))) => {
                        info!(
                            connection_id = %connection_id,
                            reason = ?frame.map(|f| f.reason.to_string()),
                            "console closed websocket"
                        );
                        break Ok(());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => break Err(ConnectionError::Receive(err.to_string())),
                    None => break Ok(()),
                };

                match decode_command(&payload) {
                    Ok(command) => {
                        state.registry.record_command(connection_id);
                        counter!("rover_peer_commands_total", "cmd" => command.name()).increment(1);
                        debug!(connection_id = %connection_id, ?command, "command received");
                        state.rover.lock().apply(command);
                        if let Err(err) = send_report(&mut ws_tx, state).await {
                            break Err(err);
                        }
                    }
                    Err(err) => {
                        counter!("rover_peer_decode_failures_total", "reason" => err.metric_label())
                            .increment(1);
                        warn!(connection_id = %connection_id, error = %err, "ignoring undecodable command");
                    }
                }
            }
            _ = next_push(&mut push) => {
                if let Err(err) = send_report(&mut ws_tx, state).await {
                    break Err(err);
                }
            }
            _ = wait_for_shutdown(shutdown.clone()) => {
                let _ = ws_tx
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: Cow::Borrowed("rover shutting down"),
                    })))
                    .await;
                break Ok(());
            }
        }
    };

    result
}

async fn next_push(push: &mut Option<Interval>) {
    match push {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_report(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    state: &PeerState,
) -> Result<(), ConnectionError> {
    let report = state.rover.lock().report();
    let payload = encode_telemetry(&report)?;
    ws_tx
        .send(Message::Text(payload))
        .await
        .map_err(|err| ConnectionError::Send(err.to_string()))?;
    counter!("rover_peer_reports_total").increment(1);
    Ok(())
}
