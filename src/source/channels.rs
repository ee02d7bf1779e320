//! Electrode channel definitions and reading types
//!
//! Provides the four monitored Muse electrodes, their grouping into
//! gesture groups, and the per-channel reading delivered by a source.

use serde::{Deserialize, Serialize};

/// Muse electrode indices as reported by the headset
pub mod electrodes {
    /// Left temporal
    pub const TP9: usize = 0;
    /// Left frontal
    pub const AF7: usize = 1;
    /// Right frontal
    pub const AF8: usize = 2;
    /// Right temporal
    pub const TP10: usize = 3;
}

/// One of the four monitored electrode positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "TP9")]
    Tp9,
    #[serde(rename = "AF7")]
    Af7,
    #[serde(rename = "AF8")]
    Af8,
    #[serde(rename = "TP10")]
    Tp10,
}

impl Channel {
    /// All monitored channels in electrode-index order
    pub const ALL: [Channel; 4] = [Channel::Tp9, Channel::Af7, Channel::Af8, Channel::Tp10];

    /// Map a Muse electrode index to a monitored channel
    ///
    /// AUX and the Athena-only electrodes are not monitored and map to `None`.
    pub fn from_electrode(index: usize) -> Option<Self> {
        match index {
            electrodes::TP9 => Some(Channel::Tp9),
            electrodes::AF7 => Some(Channel::Af7),
            electrodes::AF8 => Some(Channel::Af8),
            electrodes::TP10 => Some(Channel::Tp10),
            _ => None,
        }
    }

    /// Map an electrode label (case-insensitive) to a monitored channel
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "TP9" => Some(Channel::Tp9),
            "AF7" => Some(Channel::Af7),
            "AF8" => Some(Channel::Af8),
            "TP10" => Some(Channel::Tp10),
            _ => None,
        }
    }

    /// The gesture group this channel feeds
    pub fn group(&self) -> Group {
        match self {
            Channel::Af7 | Channel::Af8 => Group::Eye,
            Channel::Tp9 | Channel::Tp10 => Group::Jaw,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Tp9 => write!(f, "TP9"),
            Channel::Af7 => write!(f, "AF7"),
            Channel::Af8 => write!(f, "AF8"),
            Channel::Tp10 => write!(f, "TP10"),
        }
    }
}

/// Gesture groups, each fed by two channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Frontal pair (AF7, AF8)
    Eye,
    /// Temporal pair (TP9, TP10)
    Jaw,
}

impl Group {
    pub fn channels(&self) -> [Channel; 2] {
        match self {
            Group::Eye => [Channel::Af7, Channel::Af8],
            Group::Jaw => [Channel::Tp9, Channel::Tp10],
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Group::Eye => write!(f, "eye"),
            Group::Jaw => write!(f, "jaw"),
        }
    }
}

/// A packet of samples from one electrode
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Electrode the samples came from
    pub channel: Channel,
    /// Amplitude samples in µV, oldest first
    pub samples: Vec<f64>,
    /// Milliseconds since the Unix epoch of the first sample
    pub timestamp: f64,
}

impl Reading {
    pub fn new(channel: Channel, samples: Vec<f64>, timestamp: f64) -> Self {
        Self {
            channel,
            samples,
            timestamp,
        }
    }
}

/// Set of channels a subscriber wants delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFilter {
    tp9: bool,
    af7: bool,
    af8: bool,
    tp10: bool,
}

impl ChannelFilter {
    /// Accept every monitored channel
    pub fn all() -> Self {
        Self::only(&Channel::ALL)
    }

    /// Accept only the listed channels
    pub fn only(channels: &[Channel]) -> Self {
        let mut filter = Self {
            tp9: false,
            af7: false,
            af8: false,
            tp10: false,
        };
        for channel in channels {
            match channel {
                Channel::Tp9 => filter.tp9 = true,
                Channel::Af7 => filter.af7 = true,
                Channel::Af8 => filter.af8 = true,
                Channel::Tp10 => filter.tp10 = true,
            }
        }
        filter
    }

    pub fn accepts(&self, channel: Channel) -> bool {
        match channel {
            Channel::Tp9 => self.tp9,
            Channel::Af7 => self.af7,
            Channel::Af8 => self.af8,
            Channel::Tp10 => self.tp10,
        }
    }
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self::all()
    }
}
