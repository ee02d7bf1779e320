//! Gesture events produced by the arbitration engine
//!
//! Provides the gesture kinds the detector can fire and the immutable
//! event value handed to the emitter.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Gestures the detector can recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    /// Eye blink, seen on the frontal electrodes (AF7, AF8)
    Eye,

    /// Jaw clench, seen on the temporal electrodes (TP9, TP10)
    Jaw,
}

impl std::fmt::Display for GestureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GestureKind::Eye => write!(f, "EYE"),
            GestureKind::Jaw => write!(f, "JAW"),
        }
    }
}

/// A gesture that won arbitration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    /// Which gesture fired
    pub kind: GestureKind,

    /// Windowed amplitude of the winning group (µV)
    pub amplitude: f64,

    /// When the arbitration engine fired it
    pub fired_at: Instant,
}

impl GestureEvent {
    pub fn new(kind: GestureKind, amplitude: f64, fired_at: Instant) -> Self {
        Self {
            kind,
            amplitude,
            fired_at,
        }
    }
}

impl std::fmt::Display for GestureEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.1}µV)", self.kind, self.amplitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&GestureKind::Jaw).unwrap();
        assert_eq!(json, r#""jaw""#);
    }

    #[test]
    fn test_event_display() {
        let event = GestureEvent::new(GestureKind::Eye, 412.3, Instant::now());
        assert_eq!(event.to_string(), "EYE (412.3µV)");
    }
}
