//! Winner-take-all gesture arbitration with cooldown
//!
//! Consumes the latest window amplitude of each group and decides whether
//! an eye blink or a jaw clench fired. A fired gesture starts a cooldown
//! during which every tick is swallowed.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::window::WindowScalar;
use crate::events::{GestureEvent, GestureKind};
use crate::source::Group;

/// Per-group amplitude thresholds (µV)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub eye: f64,
    pub jaw: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            eye: 300.0,
            jaw: 500.0,
        }
    }
}

/// Arbitration tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbitrationConfig {
    pub thresholds: Thresholds,
    /// Debounce after a fired gesture
    pub cooldown: Duration,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            cooldown: Duration::from_millis(1000),
        }
    }
}

/// Pick the winning gesture for one pair of amplitudes
///
/// A gesture qualifies when its amplitude is strictly above its threshold.
/// When both qualify the larger amplitude wins and an exact tie goes to jaw.
pub fn arbitrate(eye_amp: f64, jaw_amp: f64, thresholds: &Thresholds) -> Option<GestureKind> {
    let eye_passed = eye_amp > thresholds.eye;
    let jaw_passed = jaw_amp > thresholds.jaw;

    match (eye_passed, jaw_passed) {
        (false, false) => None,
        (true, false) => Some(GestureKind::Eye),
        (false, true) => Some(GestureKind::Jaw),
        (true, true) => {
            if eye_amp > jaw_amp {
                Some(GestureKind::Eye)
            } else {
                Some(GestureKind::Jaw)
            }
        }
    }
}

/// Arbitration engine state
///
/// Holds the latest known amplitude of each group and the cooldown gate.
/// Ticks start once both groups have reported at least one window.
#[derive(Debug)]
pub struct Arbiter {
    config: ArbitrationConfig,
    latest_eye: Option<f64>,
    latest_jaw: Option<f64>,
    cooldown_until: Option<Instant>,
}

impl Arbiter {
    pub fn new(config: ArbitrationConfig) -> Self {
        Self {
            config,
            latest_eye: None,
            latest_jaw: None,
            cooldown_until: None,
        }
    }

    /// End of the current cooldown, if one was ever started
    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Whether ticks at `now` are swallowed
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(false, |until| now < until)
    }

    /// Record a group's window and tick with the latest pair
    pub fn on_window(&mut self, window: &WindowScalar, now: Instant) -> Option<GestureEvent> {
        match window.group {
            Group::Eye => self.latest_eye = Some(window.value),
            Group::Jaw => self.latest_jaw = Some(window.value),
        }

        let (eye_amp, jaw_amp) = (self.latest_eye?, self.latest_jaw?);
        self.tick(eye_amp, jaw_amp, now)
    }

    /// Run one arbitration step
    pub fn tick(&mut self, eye_amp: f64, jaw_amp: f64, now: Instant) -> Option<GestureEvent> {
        if self.in_cooldown(now) {
            return None;
        }

        debug!(eye_amp, jaw_amp, "arbitration tick");

        let kind = arbitrate(eye_amp, jaw_amp, &self.config.thresholds)?;
        let amplitude = match kind {
            GestureKind::Eye => eye_amp,
            GestureKind::Jaw => jaw_amp,
        };

        self.cooldown_until = Some(now + self.config.cooldown);
        info!(
            kind = %kind,
            amplitude,
            cooldown_ms = self.config.cooldown.as_millis() as u64,
            "gesture fired"
        );

        Some(GestureEvent::new(kind, amplitude, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_millis(1000);

    fn even_thresholds() -> Thresholds {
        Thresholds {
            eye: 300.0,
            jaw: 300.0,
        }
    }

    fn create_arbiter() -> Arbiter {
        Arbiter::new(ArbitrationConfig {
            thresholds: even_thresholds(),
            cooldown: COOLDOWN,
        })
    }

    fn window(group: Group, value: f64, at: Instant) -> WindowScalar {
        WindowScalar {
            group,
            value,
            window_start: at,
            window_end: at + Duration::from_millis(300),
        }
    }

    #[test]
    fn test_only_eye_passes() {
        assert_eq!(arbitrate(400.0, 200.0, &even_thresholds()), Some(GestureKind::Eye));
    }

    #[test]
    fn test_both_pass_jaw_higher() {
        assert_eq!(arbitrate(400.0, 500.0, &even_thresholds()), Some(GestureKind::Jaw));
    }

    #[test]
    fn test_both_pass_eye_higher() {
        assert_eq!(arbitrate(600.0, 500.0, &even_thresholds()), Some(GestureKind::Eye));
    }

    #[test]
    fn test_tie_goes_to_jaw() {
        assert_eq!(arbitrate(500.0, 500.0, &even_thresholds()), Some(GestureKind::Jaw));
    }

    #[test]
    fn test_neither_passes() {
        assert_eq!(arbitrate(100.0, 100.0, &even_thresholds()), None);
    }

    #[test]
    fn test_threshold_is_strict() {
        assert_eq!(arbitrate(300.0, 300.0, &even_thresholds()), None);
    }

    #[test]
    fn test_independent_thresholds() {
        let thresholds = Thresholds::default();
        // 400 clears the eye threshold but not the jaw one
        assert_eq!(arbitrate(100.0, 400.0, &thresholds), None);
        assert_eq!(arbitrate(400.0, 100.0, &thresholds), Some(GestureKind::Eye));
    }

    #[test]
    fn test_waits_for_both_groups() {
        let mut arbiter = create_arbiter();
        let now = Instant::now();

        assert!(arbiter.on_window(&window(Group::Eye, 900.0, now), now).is_none());

        let event = arbiter.on_window(&window(Group::Jaw, 0.0, now), now).unwrap();
        assert_eq!(event.kind, GestureKind::Eye);
        assert_eq!(event.amplitude, 900.0);
    }

    #[test]
    fn test_uses_latest_known_values() {
        let mut arbiter = create_arbiter();
        let now = Instant::now();

        arbiter.on_window(&window(Group::Eye, 0.0, now), now);
        arbiter.on_window(&window(Group::Jaw, 0.0, now), now);

        // Jaw update alone re-ticks against the stale eye value
        let event = arbiter.on_window(&window(Group::Jaw, 700.0, now), now).unwrap();
        assert_eq!(event.kind, GestureKind::Jaw);
    }

    #[test]
    fn test_cooldown_swallows_then_releases() {
        let mut arbiter = create_arbiter();
        let start = Instant::now();

        let first = arbiter.tick(400.0, 0.0, start).unwrap();
        assert_eq!(first.kind, GestureKind::Eye);
        assert_eq!(arbiter.cooldown_until(), Some(start + COOLDOWN));

        // Qualifying jaw inside the cooldown is lost
        assert!(arbiter.tick(0.0, 800.0, start + Duration::from_millis(300)).is_none());
        assert!(arbiter.tick(0.0, 800.0, start + Duration::from_millis(999)).is_none());

        let second = arbiter.tick(0.0, 800.0, start + COOLDOWN).unwrap();
        assert_eq!(second.kind, GestureKind::Jaw);
    }

    #[test]
    fn test_fired_events_respect_cooldown_spacing() {
        let mut arbiter = create_arbiter();
        let start = Instant::now();
        let mut fired = Vec::new();

        // Every tick qualifies, alternating which group wins
        for step in 0..100u64 {
            let now = start + Duration::from_millis(step * 150);
            let (eye, jaw) = if step % 2 == 0 { (900.0, 400.0) } else { (400.0, 900.0) };
            if let Some(event) = arbiter.tick(eye, jaw, now) {
                fired.push(event.fired_at);
            }
        }

        assert!(fired.len() > 1);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= COOLDOWN);
        }
    }

    #[test]
    fn test_swallowed_tick_does_not_extend_cooldown() {
        let mut arbiter = create_arbiter();
        let start = Instant::now();

        arbiter.tick(900.0, 0.0, start);
        arbiter.tick(900.0, 0.0, start + Duration::from_millis(500));
        assert_eq!(arbiter.cooldown_until(), Some(start + COOLDOWN));
    }
}
