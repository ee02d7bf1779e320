//! Gesture viewer
//!
//! Relay messages arrive on a channel fed by the network task. The render
//! loop drains that channel without waiting once per frame, applies every
//! message to the indicator board, expires old activations and redraws.

mod indicator;
mod render;

use std::io;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::relay::protocol;

pub use indicator::{Indicator, IndicatorBoard, IndicatorState};
pub use render::{Renderer, TerminalRenderer};

/// Roughly 30 frames per second
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Apply one relay payload to the board
///
/// Malformed payloads are logged and ignored.
pub fn apply_message(board: &mut IndicatorBoard, text: &str, now: Instant) -> Option<Indicator> {
    match protocol::decode(text) {
        Ok(message) => {
            let indicator = Indicator::from(message);
            debug!(indicator = indicator.label(), "indicator activated");
            board.activate(indicator, now);
            Some(indicator)
        }
        Err(e) => {
            warn!(error = %e, "ignoring relay message");
            None
        }
    }
}

/// Run the render loop until shutdown or the relay feed ends
pub async fn run_viewer(
    mut inbound: mpsc::Receiver<String>,
    mut board: IndicatorBoard,
    mut renderer: impl Renderer,
    frame: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> io::Result<()> {
    let mut ticker = time::interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        display_ms = board.display().as_millis() as u64,
        frame_ms = frame.as_millis() as u64,
        "viewer started"
    );

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            _ = ticker.tick() => {
                let now = Instant::now();
                let mut feed_closed = false;

                loop {
                    match inbound.try_recv() {
                        Ok(text) => {
                            apply_message(&mut board, &text, now);
                        }
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            feed_closed = true;
                            break;
                        }
                    }
                }

                board.update(now);
                renderer.draw(&board)?;

                if feed_closed {
                    warn!("relay feed closed, viewer stopping");
                    break;
                }
            }
        }
    }

    info!("viewer stopped");
    Ok(())
}
