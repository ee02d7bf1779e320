//! Sample sources for EEG readings
//!
//! A source pushes per-electrode readings into a channel returned by
//! `subscribe`. Pairing and streaming from the headset itself happen
//! outside this daemon; the sources here either replay readings from a
//! bridge process or synthesise them.

mod channels;
mod ndjson;
mod synthetic;

use tokio::sync::{mpsc, watch};

pub use channels::{Channel, ChannelFilter, Group, Reading};
pub use ndjson::NdjsonSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Capacity of the reading channel handed to subscribers
pub const READING_CHANNEL_CAPACITY: usize = 256;

/// Connection state reported by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Connected,
    Disconnected,
}

/// Errors that can occur in a sample source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source already has a subscriber")]
    AlreadySubscribed,

    #[error("failed to spawn source thread: {0}")]
    ThreadSpawn(String),

    #[error("source disconnected")]
    Disconnected,
}

/// A push-based producer of readings
///
/// The stream returned by `subscribe` is lazy, unbounded and cannot be
/// restarted: a source accepts exactly one subscription for its lifetime.
pub trait SampleSource: Send {
    /// Start delivering readings for the filtered channels
    fn subscribe(&mut self, filter: ChannelFilter) -> Result<mpsc::Receiver<Reading>, SourceError>;

    /// Stop delivering readings
    fn unsubscribe(&mut self);

    /// Watch the connection state
    fn status(&self) -> watch::Receiver<SourceStatus>;
}
