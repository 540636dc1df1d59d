use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use rover_link_console::{
    config::Cli, ConsoleConfig, ConsoleInput, Operator, PressedKeys, Reply, Session,
    SessionContext, TelemetryStore,
};
use time::UtcOffset;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
    task::JoinHandle,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const RENDER_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    // Must run before the runtime spawns worker threads.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    init_tracing()?;

    let cli = Cli::parse();
    let config = ConsoleConfig::try_from(cli).context("invalid console configuration")?;
    info!(
        url = %config.session.url,
        speed = %config.speed,
        poll_interval_ms = config.session.poll_interval.as_millis() as u64,
        "starting rover console"
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(config, offset))
}

// Logs go to stderr so they do not interleave with console output.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("failed to initialise tracing subscriber")
}

async fn run(config: ConsoleConfig, offset: UtcOffset) -> Result<()> {
    let context = Arc::new(SessionContext::new(config.speed));
    let store = Arc::new(TelemetryStore::new(config.max_logs).with_offset(offset));
    let session = Session::new(config.session.clone(), context, Arc::clone(&store));
    let operator = Operator::new(session.clone(), PressedKeys::new());

    let status_printer = spawn_status_printer(&session);
    let renderer = spawn_telemetry_renderer(Arc::clone(&store));

    if config.autoconnect {
        print_reply(operator.handle(ConsoleInput::Connect).await);
    }
    println!("type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read operator input")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleInput>() {
                    Ok(input) => match operator.handle(input).await {
                        Reply::Quit => break,
                        reply => print_reply(reply),
                    },
                    Err(err) => println!("{err} (type `help`)"),
                }
            }
            _ = signal::ctrl_c() => {
                warn!("interrupt received");
                break;
            }
        }
    }

    session.close().await;
    status_printer.abort();
    renderer.abort();
    info!("rover console exited");
    Ok(())
}

fn print_reply(reply: Reply) {
    if let Reply::Text(text) = reply {
        println!("{text}");
    }
}

fn spawn_status_printer(session: &Session) -> JoinHandle<()> {
    let mut status = session.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = *status.borrow_and_update();
            println!("[link] {state}");
        }
    })
}

fn spawn_telemetry_renderer(store: Arc<TelemetryStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RENDER_INTERVAL);
        let mut seen = store.updates();
        loop {
            ticker.tick().await;
            let updates = store.updates();
            if updates == seen {
                continue;
            }
            seen = updates;
            if let Some(snapshot) = store.latest() {
                println!("[telemetry] {}", snapshot.summary());
            }
        }
    })
}
