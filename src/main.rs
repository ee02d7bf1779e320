//! braingame-daemon: EEG gesture detection for hands-free game input
//!
//! The daemon can run any combination of three roles:
//! - detector: reads EEG readings, detects eye blinks and jaw clenches,
//!   and publishes each gesture to the relay
//! - relay: WebSocket server forwarding every message to the other clients
//! - viz: relay client that lights a terminal indicator per gesture
//!
//! Pairing with the headset is out of scope. Readings come from a bridge
//! process (stdin or TCP, NDJSON) or from the built-in synthetic generator.

use anyhow::{Context, Result};
use braingame_daemon::{
    config::{Config, SourceKind},
    detect::{Pipeline, PipelineExit},
    emitter::{Emitter, LogSink},
    lifecycle::ShutdownSignal,
    relay::{RelayClient, RelayServer, RelaySink},
    source::{
        NdjsonSource, SampleSource, SourceError, SourceStatus, SyntheticConfig, SyntheticSource,
    },
    viz::{self, IndicatorBoard, TerminalRenderer, FRAME_INTERVAL},
    VERSION,
};
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the viewer owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = VERSION,
        "braingame-daemon starting"
    );

    let config = Config::load().context("invalid configuration")?;
    info!(role = ?config.role, source = ?config.source, "configuration loaded");

    let shutdown = ShutdownSignal::new();
    let (stop_tx, _) = broadcast::channel::<()>(1);
    let mut roles = JoinSet::new();

    // Bind before starting clients so a taken port fails fast
    if config.role.runs_relay() {
        let server = RelayServer::bind(&config.relay_addr).await?;
        roles.spawn(run_relay(server, stop_tx.subscribe()));
    }
    if config.role.runs_detector() {
        roles.spawn(run_detector(config.clone(), stop_tx.subscribe()));
    }
    if config.role.runs_viz() {
        roles.spawn(run_viz(config.clone(), stop_tx.subscribe()));
    }

    info!(roles = roles.len(), "daemon initialized");

    tokio::select! {
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }

        // Any role ending on its own takes the rest down with it
        Some(result) = roles.join_next() => {
            report_role(result);
        }
    }

    info!("shutting down...");
    let _ = stop_tx.send(());

    while let Some(result) = roles.join_next().await {
        report_role(result);
    }

    info!("braingame-daemon stopped");

    Ok(())
}

fn report_role(result: Result<Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = ?e, "role failed"),
        Err(e) => error!(?e, "role task panicked"),
    }
}

/// Serve the relay until stopped
async fn run_relay(server: RelayServer, mut stop_rx: broadcast::Receiver<()>) -> Result<()> {
    let result = tokio::select! {
        result = server.run() => result,
        _ = stop_rx.recv() => Ok(()),
    };

    server.shutdown();
    result
}

/// Run the detection pipeline until stopped or the source goes away
async fn run_detector(config: Config, mut stop_rx: broadcast::Receiver<()>) -> Result<()> {
    let source: Box<dyn SampleSource> = match &config.source {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(SyntheticConfig::default())),
        SourceKind::Stdin => Box::new(NdjsonSource::stdin()),
        SourceKind::Tcp(addr) => Box::new(NdjsonSource::tcp(addr.clone())),
    };
    let mut status = source.status();

    // The detector only publishes, so inbound relay traffic is discarded
    let (client, _inbound) = RelayClient::spawn(config.relay_url.clone(), Some(config.relay_retry));

    let emitter = Emitter::new()
        .with_sink(LogSink)
        .with_sink(RelaySink::new(client));

    let mut pipeline = Pipeline::start(source, emitter, config.pipeline())
        .context("failed to start detection pipeline")?;

    let mut watching = true;
    let exit = loop {
        tokio::select! {
            exit = pipeline.wait() => break exit,
            _ = stop_rx.recv() => break PipelineExit::Shutdown,
            changed = status.changed(), if watching => match changed {
                Ok(()) => log_source_status(&status),
                Err(_) => watching = false,
            },
        }
    };

    pipeline.shutdown().await;

    match exit {
        PipelineExit::Shutdown => Ok(()),
        PipelineExit::SourceDisconnected => Err(SourceError::Disconnected).context("detector stopped"),
    }
}

fn log_source_status(status: &watch::Receiver<SourceStatus>) {
    match *status.borrow() {
        SourceStatus::Connected => info!("sample source connected"),
        SourceStatus::Disconnected => warn!("sample source reported disconnect"),
    }
}

/// Show gestures from the relay until stopped
async fn run_viz(config: Config, stop_rx: broadcast::Receiver<()>) -> Result<()> {
    let (client, inbound) = RelayClient::spawn(config.relay_url.clone(), Some(config.relay_retry));
    let board = IndicatorBoard::new(config.display);

    let result = viz::run_viewer(inbound, board, TerminalRenderer::stdout(), FRAME_INTERVAL, stop_rx).await;

    client.close().await;
    // Leave the cursor below the status line
    println!();

    result.context("viewer failed to draw")
}
