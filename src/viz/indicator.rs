//! Indicator state for the viewer

use std::time::Duration;

use tokio::time::Instant;

use crate::relay::RelayMessage;

/// On-screen indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Blink,
    Jaw,
}

impl Indicator {
    pub const ALL: [Indicator; 2] = [Indicator::Blink, Indicator::Jaw];

    pub fn label(&self) -> &'static str {
        match self {
            Indicator::Blink => "BLINK",
            Indicator::Jaw => "JAW",
        }
    }
}

impl From<RelayMessage> for Indicator {
    fn from(message: RelayMessage) -> Self {
        match message {
            RelayMessage::Blink => Indicator::Blink,
            RelayMessage::Jaw => Indicator::Jaw,
        }
    }
}

/// What an indicator currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Neutral,
    Active,
}

/// Both indicators and their display deadlines
///
/// An activation holds for `display` from the moment it arrives. A repeat
/// activation while still active restarts the display period.
#[derive(Debug, Clone)]
pub struct IndicatorBoard {
    display: Duration,
    blink_until: Option<Instant>,
    jaw_until: Option<Instant>,
}

impl IndicatorBoard {
    pub fn new(display: Duration) -> Self {
        Self {
            display,
            blink_until: None,
            jaw_until: None,
        }
    }

    pub fn display(&self) -> Duration {
        self.display
    }

    /// Turn an indicator on as of `now`
    pub fn activate(&mut self, indicator: Indicator, now: Instant) {
        *self.slot(indicator) = Some(now + self.display);
    }

    /// Revert indicators whose display period has ended
    ///
    /// Returns true if anything changed.
    pub fn update(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for indicator in Indicator::ALL {
            let slot = self.slot(indicator);
            if matches!(*slot, Some(until) if now >= until) {
                *slot = None;
                changed = true;
            }
        }
        changed
    }

    pub fn state(&self, indicator: Indicator) -> IndicatorState {
        let until = match indicator {
            Indicator::Blink => self.blink_until,
            Indicator::Jaw => self.jaw_until,
        };
        if until.is_some() {
            IndicatorState::Active
        } else {
            IndicatorState::Neutral
        }
    }

    fn slot(&mut self, indicator: Indicator) -> &mut Option<Instant> {
        match indicator {
            Indicator::Blink => &mut self.blink_until,
            Indicator::Jaw => &mut self.jaw_until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_neutral() {
        let board = IndicatorBoard::new(Duration::from_secs(1));
        for indicator in Indicator::ALL {
            assert_eq!(board.state(indicator), IndicatorState::Neutral);
        }
    }

    #[test]
    fn test_activation_reverts_after_display() {
        let start = Instant::now();
        let mut board = IndicatorBoard::new(Duration::from_secs(1));

        board.activate(Indicator::Blink, start);
        assert_eq!(board.state(Indicator::Blink), IndicatorState::Active);
        assert_eq!(board.state(Indicator::Jaw), IndicatorState::Neutral);

        assert!(!board.update(start + Duration::from_millis(999)));
        assert_eq!(board.state(Indicator::Blink), IndicatorState::Active);

        assert!(board.update(start + Duration::from_secs(1)));
        assert_eq!(board.state(Indicator::Blink), IndicatorState::Neutral);
    }

    #[test]
    fn test_repeat_activation_extends_display() {
        let start = Instant::now();
        let mut board = IndicatorBoard::new(Duration::from_secs(1));

        board.activate(Indicator::Jaw, start);
        board.activate(Indicator::Jaw, start + Duration::from_millis(600));

        board.update(start + Duration::from_millis(1200));
        assert_eq!(board.state(Indicator::Jaw), IndicatorState::Active);

        board.update(start + Duration::from_millis(1600));
        assert_eq!(board.state(Indicator::Jaw), IndicatorState::Neutral);
    }

    #[test]
    fn test_message_mapping() {
        assert_eq!(Indicator::from(RelayMessage::Blink), Indicator::Blink);
        assert_eq!(Indicator::from(RelayMessage::Jaw), Indicator::Jaw);
    }
}
