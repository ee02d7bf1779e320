//! Synthetic EEG source for running without a headset
//!
//! Emits Muse-shaped packets (12 samples per electrode at 256 Hz) from a
//! dedicated thread. The signal is a low-amplitude 10 Hz baseline with a
//! scripted eye burst and jaw burst once per cycle.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::channels::{Channel, ChannelFilter, Group, Reading};
use super::{SampleSource, SourceError, SourceStatus, READING_CHANNEL_CAPACITY};

/// Muse EEG sample rate
const SAMPLE_RATE_HZ: f64 = 256.0;

/// Shape of the generated signal
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Samples carried by each packet
    pub samples_per_packet: usize,
    /// Peak of the resting baseline (µV)
    pub baseline_uv: f64,
    /// Length of one script cycle; the eye burst starts at 1/3, the jaw burst at 2/3
    pub burst_period: Duration,
    /// How long each burst lasts
    pub burst_length: Duration,
    /// Peak amplitude on AF7/AF8 during the eye burst (µV)
    pub eye_burst_uv: f64,
    /// Peak amplitude on TP9/TP10 during the jaw burst (µV)
    pub jaw_burst_uv: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            samples_per_packet: 12,
            baseline_uv: 40.0,
            burst_period: Duration::from_secs(3),
            burst_length: Duration::from_millis(150),
            eye_burst_uv: 800.0,
            jaw_burst_uv: 900.0,
        }
    }
}

impl SyntheticConfig {
    /// Time covered by one packet
    pub fn packet_interval(&self) -> Duration {
        Duration::from_secs_f64(self.samples_per_packet as f64 / SAMPLE_RATE_HZ)
    }

    /// Which group, if any, is bursting at `elapsed` into the stream
    fn burst_at(&self, elapsed: Duration) -> Option<Group> {
        let period = self.burst_period.as_secs_f64();
        if period <= 0.0 {
            return None;
        }
        let offset = elapsed.as_secs_f64() % period;
        let length = self.burst_length.as_secs_f64();
        let eye_start = period / 3.0;
        let jaw_start = 2.0 * period / 3.0;

        if offset >= eye_start && offset < eye_start + length {
            Some(Group::Eye)
        } else if offset >= jaw_start && offset < jaw_start + length {
            Some(Group::Jaw)
        } else {
            None
        }
    }

    /// Generate the samples of one packet for `channel`
    pub fn packet(&self, channel: Channel, elapsed: Duration) -> Vec<f64> {
        let bursting = self.burst_at(elapsed) == Some(channel.group());
        let burst_uv = match channel.group() {
            Group::Eye => self.eye_burst_uv,
            Group::Jaw => self.jaw_burst_uv,
        };
        // Offset each electrode so the four baselines are not identical
        let phase = channel as usize as f64 * PI / 4.0;

        (0..self.samples_per_packet)
            .map(|i| {
                if bursting {
                    if i % 2 == 0 {
                        burst_uv
                    } else {
                        -burst_uv
                    }
                } else {
                    let t = elapsed.as_secs_f64() + i as f64 / SAMPLE_RATE_HZ;
                    self.baseline_uv * (2.0 * PI * 10.0 * t + phase).sin()
                }
            })
            .collect()
    }
}

/// Source that synthesises readings on a dedicated thread
pub struct SyntheticSource {
    config: SyntheticConfig,
    running: Arc<AtomicBool>,
    subscribed: bool,
    status_tx: Option<watch::Sender<SourceStatus>>,
    status_rx: watch::Receiver<SourceStatus>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(SourceStatus::Disconnected);
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            subscribed: false,
            status_tx: Some(status_tx),
            status_rx,
        }
    }

    /// Check if the generator thread is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl SampleSource for SyntheticSource {
    fn subscribe(&mut self, filter: ChannelFilter) -> Result<mpsc::Receiver<Reading>, SourceError> {
        if self.subscribed {
            return Err(SourceError::AlreadySubscribed);
        }
        let status_tx = self.status_tx.take().ok_or(SourceError::AlreadySubscribed)?;
        self.subscribed = true;

        let (reading_tx, reading_rx) = mpsc::channel(READING_CHANNEL_CAPACITY);
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        thread::Builder::new()
            .name("synthetic-source".to_string())
            .spawn(move || {
                info!("synthetic source thread started");
                let _ = status_tx.send(SourceStatus::Connected);

                run_generator(&config, filter, &reading_tx, &running);

                running.store(false, Ordering::SeqCst);
                let _ = status_tx.send(SourceStatus::Disconnected);
                info!("synthetic source thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                SourceError::ThreadSpawn(e.to_string())
            })?;

        Ok(reading_rx)
    }

    fn unsubscribe(&mut self) {
        // The thread exits before its next packet
        self.running.store(false, Ordering::SeqCst);
    }

    fn status(&self) -> watch::Receiver<SourceStatus> {
        self.status_rx.clone()
    }
}

/// Emit packets at the headset's pace until stopped or the receiver goes away
fn run_generator(
    config: &SyntheticConfig,
    filter: ChannelFilter,
    reading_tx: &mpsc::Sender<Reading>,
    running: &AtomicBool,
) {
    let interval = config.packet_interval();
    if interval.is_zero() {
        error!("synthetic source configured with an empty packet");
        return;
    }

    let started = Instant::now();
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0);
    let mut packet_index: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let elapsed = interval.mul_f64(packet_index as f64);
        let timestamp = epoch_ms + elapsed.as_secs_f64() * 1000.0;

        for channel in Channel::ALL {
            if !filter.accepts(channel) {
                continue;
            }
            let reading = Reading::new(channel, config.packet(channel, elapsed), timestamp);
            // We are on a plain thread, so blocking on a full channel is fine
            if reading_tx.blocking_send(reading).is_err() {
                debug!("reading receiver dropped, stopping generator");
                return;
            }
        }

        packet_index += 1;
        let next = started + interval.mul_f64(packet_index as f64);
        thread::sleep(next.saturating_duration_since(Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(samples: &[f64]) -> f64 {
        samples.iter().fold(0.0, |acc: f64, s| acc.max(s.abs()))
    }

    #[test]
    fn test_packet_shape() {
        let config = SyntheticConfig::default();
        let packet = config.packet(Channel::Af7, Duration::ZERO);
        assert_eq!(packet.len(), 12);
        assert!(peak(&packet) <= config.baseline_uv);
    }

    #[test]
    fn test_eye_burst_only_on_frontal_channels() {
        let config = SyntheticConfig::default();
        // 1s into a 3s cycle is the eye burst
        let at = Duration::from_millis(1_050);

        assert_eq!(peak(&config.packet(Channel::Af7, at)), config.eye_burst_uv);
        assert_eq!(peak(&config.packet(Channel::Af8, at)), config.eye_burst_uv);
        assert!(peak(&config.packet(Channel::Tp9, at)) <= config.baseline_uv);
    }

    #[test]
    fn test_jaw_burst_only_on_temporal_channels() {
        let config = SyntheticConfig::default();
        let at = Duration::from_millis(2_050);

        assert_eq!(peak(&config.packet(Channel::Tp10, at)), config.jaw_burst_uv);
        assert!(peak(&config.packet(Channel::Af8, at)) <= config.baseline_uv);
    }

    #[test]
    fn test_packet_interval() {
        let config = SyntheticConfig::default();
        assert_eq!(config.packet_interval(), Duration::from_micros(46_875));
    }

    #[test]
    fn test_second_subscribe_rejected() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        let rx = source.subscribe(ChannelFilter::all()).unwrap();
        assert!(matches!(
            source.subscribe(ChannelFilter::all()),
            Err(SourceError::AlreadySubscribed)
        ));
        source.unsubscribe();
        drop(rx);
    }

    #[test]
    fn test_delivers_filtered_channels() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        let mut rx = source.subscribe(ChannelFilter::only(&[Channel::Tp9])).unwrap();
        assert!(source.is_running());

        for _ in 0..3 {
            let reading = rx.blocking_recv().unwrap();
            assert_eq!(reading.channel, Channel::Tp9);
        }

        source.unsubscribe();
    }
}
