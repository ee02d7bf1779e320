//! Fixed-window max aggregation per gesture group
//!
//! Each group (eye, jaw) folds the peak amplitudes of its two channels into
//! an accumulator and emits the window maximum on every timer tick. Windows
//! are contiguous: each one starts exactly where the previous ended, no
//! matter how late the timer fires.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::reducer::ChannelScalar;
use crate::source::Group;

/// Maximum amplitude of a group over one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScalar {
    pub group: Group,
    /// Largest peak seen in the window, 0 if nothing arrived
    pub value: f64,
    pub window_start: Instant,
    pub window_end: Instant,
}

/// Accumulates peaks for one group over the current window
#[derive(Debug)]
pub struct WindowAggregator {
    group: Group,
    duration: Duration,
    window_start: Instant,
    peak: f64,
    count: usize,
}

impl WindowAggregator {
    /// Create an aggregator whose first window opens at `start`
    pub fn new(group: Group, duration: Duration, start: Instant) -> Self {
        Self {
            group,
            duration,
            window_start: start,
            peak: 0.0,
            count: 0,
        }
    }

    pub fn group(&self) -> Group {
        self.group
    }

    /// Start of the window currently being filled
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// End of the window currently being filled
    pub fn window_end(&self) -> Instant {
        self.window_start + self.duration
    }

    /// Number of values folded into the current window
    pub fn pending(&self) -> usize {
        self.count
    }

    /// Fold a channel peak into the current window
    pub fn push(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.peak = self.peak.max(value);
        self.count += 1;
    }

    /// Close the current window, emit its maximum and open the next one
    pub fn flush(&mut self) -> WindowScalar {
        let window = WindowScalar {
            group: self.group,
            value: self.peak,
            window_start: self.window_start,
            window_end: self.window_end(),
        };

        self.window_start = window.window_end;
        self.peak = 0.0;
        self.count = 0;

        window
    }

    /// Drive the aggregator from a timer until shutdown or input closes
    ///
    /// Missed ticks are replayed so every window is emitted, including
    /// silent ones with a value of 0.
    pub async fn run(
        mut self,
        mut scalars: mpsc::Receiver<ChannelScalar>,
        windows: mpsc::Sender<WindowScalar>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = time::interval_at(self.window_end(), self.duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        info!(group = %self.group, window_ms = self.duration.as_millis() as u64, "window aggregator started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,

                _ = ticker.tick() => {
                    let pending = self.pending();
                    let window = self.flush();
                    debug!(group = %window.group, amplitude = window.value, readings = pending, "window closed");
                    if windows.send(window).await.is_err() {
                        break;
                    }
                }

                scalar = scalars.recv() => match scalar {
                    Some(scalar) => {
                        trace!(channel = %scalar.channel, value = scalar.value, "channel peak");
                        self.push(scalar.value);
                    }
                    None => break,
                },
            }
        }

        info!(group = %self.group, "window aggregator stopped");
    }
}
