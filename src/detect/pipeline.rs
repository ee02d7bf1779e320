//! Detection pipeline wiring
//!
//! Stages run as separate tasks joined by bounded channels:
//!
//! ```text
//! source ──▶ router (reduce) ──▶ eye window ──┐
//!                         └────▶ jaw window ──┴─▶ arbitration ──▶ emitter
//! ```
//!
//! The router never waits on a downstream stage: if an aggregator falls
//! behind, peaks are dropped rather than stalling the source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::arbitration::{ArbitrationConfig, Arbiter};
use super::reducer::{self, ChannelScalar};
use super::window::{WindowAggregator, WindowScalar};
use crate::emitter::Emitter;
use crate::source::{ChannelFilter, Group, Reading, SampleSource, SourceError};

/// Per-group queue between the router and an aggregator
const SCALAR_CHANNEL_CAPACITY: usize = 256;

/// Queue between the aggregators and arbitration
const WINDOW_CHANNEL_CAPACITY: usize = 32;

/// Pipeline tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Aggregation window per group
    pub window: Duration,
    pub arbitration: ArbitrationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(300),
            arbitration: ArbitrationConfig::default(),
        }
    }
}

/// Why the pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// `shutdown` was called
    Shutdown,
    /// The sample source stopped delivering readings
    SourceDisconnected,
}

/// A running detection pipeline
pub struct Pipeline {
    source: Box<dyn SampleSource>,
    shutdown_tx: broadcast::Sender<()>,
    halted: Arc<AtomicBool>,
    exit_rx: Option<oneshot::Receiver<PipelineExit>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Subscribe to `source` and start every stage
    pub fn start(
        mut source: Box<dyn SampleSource>,
        emitter: Emitter,
        config: PipelineConfig,
    ) -> Result<Self, SourceError> {
        let readings = source.subscribe(ChannelFilter::all())?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let halted = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = oneshot::channel();

        let (eye_tx, eye_rx) = mpsc::channel(SCALAR_CHANNEL_CAPACITY);
        let (jaw_tx, jaw_rx) = mpsc::channel(SCALAR_CHANNEL_CAPACITY);
        let (window_tx, window_rx) = mpsc::channel(WINDOW_CHANNEL_CAPACITY);

        // Both groups share one clock origin so their windows line up
        let origin = Instant::now();
        let eye = WindowAggregator::new(Group::Eye, config.window, origin);
        let jaw = WindowAggregator::new(Group::Jaw, config.window, origin);

        let router = Router {
            eye_tx,
            jaw_tx,
            dropped: 0,
        };

        let tasks = vec![
            tokio::spawn(router.run(
                readings,
                shutdown_tx.subscribe(),
                shutdown_tx.clone(),
                Arc::clone(&halted),
                exit_tx,
            )),
            tokio::spawn(eye.run(eye_rx, window_tx.clone(), shutdown_tx.subscribe())),
            tokio::spawn(jaw.run(jaw_rx, window_tx, shutdown_tx.subscribe())),
            tokio::spawn(run_arbitration(
                Arbiter::new(config.arbitration),
                emitter,
                window_rx,
                shutdown_tx.subscribe(),
                Arc::clone(&halted),
            )),
        ];

        info!(
            window_ms = config.window.as_millis() as u64,
            eye_threshold = config.arbitration.thresholds.eye,
            jaw_threshold = config.arbitration.thresholds.jaw,
            cooldown_ms = config.arbitration.cooldown.as_millis() as u64,
            "detection pipeline started"
        );

        Ok(Self {
            source,
            shutdown_tx,
            halted,
            exit_rx: Some(exit_rx),
            tasks,
        })
    }

    /// Whether teardown has begun
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Wait until the source disconnects
    ///
    /// Resolves to `Shutdown` if the pipeline was torn down first. Safe to
    /// use in `select!`: a cancelled wait can be retried.
    pub async fn wait(&mut self) -> PipelineExit {
        let Some(exit_rx) = self.exit_rx.as_mut() else {
            return PipelineExit::Shutdown;
        };
        let exit = exit_rx.await.unwrap_or(PipelineExit::Shutdown);
        self.exit_rx = None;
        exit
    }

    /// Stop every stage and release the source
    ///
    /// No gesture is emitted once this has been called. Returns after every
    /// sink has closed, so a relay connection has finished its close
    /// handshake.
    pub async fn shutdown(mut self) {
        self.halted.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        self.source.unsubscribe();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(?e, "pipeline stage ended abnormally");
            }
        }

        info!("detection pipeline stopped");
    }
}

/// Reduces readings and routes peaks to their group's aggregator
struct Router {
    eye_tx: mpsc::Sender<ChannelScalar>,
    jaw_tx: mpsc::Sender<ChannelScalar>,
    dropped: u64,
}

impl Router {
    async fn run(
        mut self,
        mut readings: mpsc::Receiver<Reading>,
        mut shutdown_rx: broadcast::Receiver<()>,
        shutdown_tx: broadcast::Sender<()>,
        halted: Arc<AtomicBool>,
        exit_tx: oneshot::Sender<PipelineExit>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,

                reading = readings.recv() => match reading {
                    Some(reading) => self.route(&reading),
                    None => {
                        warn!("sample source disconnected, stopping pipeline");
                        halted.store(true, Ordering::SeqCst);
                        let _ = shutdown_tx.send(());
                        let _ = exit_tx.send(PipelineExit::SourceDisconnected);
                        break;
                    }
                },
            }
        }

        if self.dropped > 0 {
            info!(dropped = self.dropped, "router dropped peaks under backpressure");
        }
    }

    fn route(&mut self, reading: &Reading) {
        let scalar = reducer::reduce(reading);
        let tx = match scalar.channel.group() {
            Group::Eye => &self.eye_tx,
            Group::Jaw => &self.jaw_tx,
        };

        if tx.try_send(scalar).is_err() {
            self.dropped += 1;
            debug!(channel = %scalar.channel, dropped = self.dropped, "aggregator busy, peak dropped");
        }
    }
}

/// Arbitrate windows and emit winners until shutdown
async fn run_arbitration(
    mut arbiter: Arbiter,
    mut emitter: Emitter,
    mut windows: mpsc::Receiver<WindowScalar>,
    mut shutdown_rx: broadcast::Receiver<()>,
    halted: Arc<AtomicBool>,
) {
    info!(sinks = emitter.len(), "arbitration started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            window = windows.recv() => {
                let Some(window) = window else { break };
                if let Some(event) = arbiter.on_window(&window, Instant::now()) {
                    if halted.load(Ordering::SeqCst) {
                        break;
                    }
                    emitter.emit(&event);
                }
            }
        }
    }

    emitter.close().await;
    info!("arbitration stopped");
}
