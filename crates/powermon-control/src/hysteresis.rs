//! Hysteresis controller — decides when to cut and restore load.
//!
//! Pure and synchronous: one sample in, at most one fleet action out.
//! The controller never touches the network; the scheduler enacts
//! whatever [`HysteresisController::tick`] returns.
//!
//! # Transitions
//!
//! ```text
//!            v >= high                 v <= low
//! Normal ──────────────► Throttled ──────────────► Cooldown(n)
//!   ▲      (disable)        ▲                          │ n -= 1 every tick
//!   │                       │  n == 0, v > low         │
//!   │                       └──────────────────────────┤
//!   │           n == 0, v <= low (enable)              │
//!   └──────────────────────────────────────────────────┘
//! ```
//!
//! `n = ceil(cooldown / sample_interval)` on every entry into Cooldown.
//! The dead band between the limits plus the cooldown keeps the workers
//! from flapping when load hovers near a threshold.

use std::fmt;

use tracing::{debug, info};

use powermon_core::{PowerAction, Thresholds};

/// Controller state. The cooldown counter only exists while cooling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Load acceptable; workers are (or are being brought) on.
    Normal,
    /// Load exceeded the high limit; workers were told off.
    Throttled,
    /// Load fell to the low limit; waiting `remaining` more ticks.
    Cooldown { remaining: u32 },
}

impl ControllerState {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerState::Normal => "normal",
            ControllerState::Throttled => "throttled",
            ControllerState::Cooldown { .. } => "cooldown",
        }
    }

    pub fn cooldown_remaining(&self) -> Option<u32> {
        match self {
            ControllerState::Cooldown { remaining } => Some(*remaining),
            _ => None,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Cooldown { remaining } => write!(f, "cooldown({remaining})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HysteresisController {
    thresholds: Thresholds,
    cooldown_ticks: u32,
    state: ControllerState,
    /// Last reading, kept only to tell changed readings from repeats.
    previous: Option<f64>,
}

impl HysteresisController {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            cooldown_ticks: thresholds.cooldown_ticks(),
            thresholds,
            state: ControllerState::Normal,
            previous: None,
        }
    }

    /// Start from an arbitrary state.
    pub fn with_state(thresholds: Thresholds, state: ControllerState) -> Self {
        Self {
            state,
            ..Self::new(thresholds)
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Counter value loaded on every entry into Cooldown.
    pub fn cooldown_ticks(&self) -> u32 {
        self.cooldown_ticks
    }

    /// Consume one sample and return the fleet action to take, if any.
    ///
    /// Call exactly once per successful sample. A missed sample must not
    /// call this at all, so the cooldown counter stays put.
    pub fn tick(&mut self, watts: f64) -> Option<PowerAction> {
        self.log_sample(watts);

        let high = self.thresholds.high_watts;
        let low = self.thresholds.low_watts;

        let (next, action) = match self.state {
            ControllerState::Normal if watts >= high => {
                (ControllerState::Throttled, Some(PowerAction::Disable))
            }
            ControllerState::Normal => (ControllerState::Normal, None),
            ControllerState::Throttled if watts <= low => (
                ControllerState::Cooldown {
                    remaining: self.cooldown_ticks,
                },
                None,
            ),
            ControllerState::Throttled => (ControllerState::Throttled, None),
            ControllerState::Cooldown { remaining } => {
                // Decrements every tick; only expiry looks at the sample.
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    (ControllerState::Cooldown { remaining }, None)
                } else if watts <= low {
                    (ControllerState::Normal, Some(PowerAction::Enable))
                } else {
                    (ControllerState::Throttled, None)
                }
            }
        };

        if std::mem::discriminant(&next) != std::mem::discriminant(&self.state) {
            info!(
                from = %self.state,
                to = %next,
                watts,
                high_watts = high,
                low_watts = low,
                "state transition"
            );
        }
        self.state = next;
        action
    }

    fn log_sample(&mut self, watts: f64) {
        if self.previous == Some(watts) {
            debug!(watts, "load power unchanged");
        } else {
            info!(
                watts,
                state = %self.state,
                cooldown_remaining = self.state.cooldown_remaining().unwrap_or(0),
                "load power"
            );
            self.previous = Some(watts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn thresholds() -> Thresholds {
        Thresholds::new(
            4100.0,
            2000.0,
            Duration::from_millis(30_000),
            Duration::from_millis(250),
        )
        .unwrap()
    }

    fn controller_in(state: ControllerState) -> HysteresisController {
        HysteresisController::with_state(thresholds(), state)
    }

    #[test]
    fn cooldown_ticks_from_thresholds() {
        assert_eq!(HysteresisController::new(thresholds()).cooldown_ticks(), 120);
    }

    #[test]
    fn starts_normal() {
        let c = HysteresisController::new(thresholds());
        assert_eq!(c.state(), ControllerState::Normal);
        assert_eq!(c.state().cooldown_remaining(), None);
    }

    #[test]
    fn normal_over_high_disables() {
        let mut c = controller_in(ControllerState::Normal);
        assert_eq!(c.tick(4200.0), Some(PowerAction::Disable));
        assert_eq!(c.state(), ControllerState::Throttled);
    }

    #[test]
    fn normal_at_high_disables() {
        let mut c = controller_in(ControllerState::Normal);
        assert_eq!(c.tick(4100.0), Some(PowerAction::Disable));
        assert_eq!(c.state(), ControllerState::Throttled);
    }

    #[test]
    fn normal_below_high_stays() {
        let mut c = controller_in(ControllerState::Normal);
        assert_eq!(c.tick(4099.9), None);
        assert_eq!(c.tick(0.0), None);
        assert_eq!(c.state(), ControllerState::Normal);
    }

    #[test]
    fn throttled_at_low_enters_cooldown() {
        let mut c = controller_in(ControllerState::Throttled);
        assert_eq!(c.tick(1800.0), None);
        assert_eq!(c.state(), ControllerState::Cooldown { remaining: 120 });

        let mut c = controller_in(ControllerState::Throttled);
        assert_eq!(c.tick(2000.0), None);
        assert_eq!(c.state(), ControllerState::Cooldown { remaining: 120 });
    }

    #[test]
    fn throttled_in_dead_band_stays() {
        let mut c = controller_in(ControllerState::Throttled);
        assert_eq!(c.tick(3000.0), None);
        assert_eq!(c.tick(5000.0), None);
        assert_eq!(c.state(), ControllerState::Throttled);
    }

    #[test]
    fn cooldown_counts_down_regardless_of_sample() {
        let mut c = controller_in(ControllerState::Cooldown { remaining: 5 });
        assert_eq!(c.tick(1000.0), None);
        assert_eq!(c.tick(9000.0), None);
        assert_eq!(c.tick(3000.0), None);
        assert_eq!(c.state(), ControllerState::Cooldown { remaining: 2 });
    }

    #[test]
    fn cooldown_expiry_below_low_enables() {
        let mut c = controller_in(ControllerState::Cooldown { remaining: 1 });
        assert_eq!(c.tick(1500.0), Some(PowerAction::Enable));
        assert_eq!(c.state(), ControllerState::Normal);
    }

    #[test]
    fn cooldown_expiry_above_low_reverts() {
        let mut c = controller_in(ControllerState::Cooldown { remaining: 1 });
        assert_eq!(c.tick(2500.0), None);
        assert_eq!(c.state(), ControllerState::Throttled);
    }

    #[test]
    fn zero_length_cooldown_expires_next_tick() {
        let t = Thresholds::new(100.0, 50.0, Duration::ZERO, Duration::from_millis(250)).unwrap();
        let mut c = HysteresisController::new(t);
        assert_eq!(c.tick(150.0), Some(PowerAction::Disable));
        assert_eq!(c.tick(10.0), None);
        assert_eq!(c.state(), ControllerState::Cooldown { remaining: 0 });
        assert_eq!(c.tick(10.0), Some(PowerAction::Enable));
        assert_eq!(c.state(), ControllerState::Normal);
    }

    #[test]
    fn full_cycle() {
        let t = Thresholds::new(
            4100.0,
            2000.0,
            Duration::from_millis(750),
            Duration::from_millis(250),
        )
        .unwrap();
        let mut c = HysteresisController::new(t);

        assert_eq!(c.tick(3000.0), None);
        assert_eq!(c.tick(4500.0), Some(PowerAction::Disable));
        assert_eq!(c.tick(4500.0), None);
        assert_eq!(c.tick(1900.0), None);
        assert_eq!(c.state(), ControllerState::Cooldown { remaining: 3 });
        assert_eq!(c.tick(1900.0), None);
        assert_eq!(c.tick(1900.0), None);
        assert_eq!(c.tick(1900.0), Some(PowerAction::Enable));
        assert_eq!(c.state(), ControllerState::Normal);
    }

    #[test]
    fn aborted_cooldown_restarts_on_next_drop() {
        let mut c = controller_in(ControllerState::Cooldown { remaining: 1 });
        assert_eq!(c.tick(2500.0), None);
        assert_eq!(c.state(), ControllerState::Throttled);

        assert_eq!(c.tick(1999.0), None);
        assert_eq!(c.state(), ControllerState::Cooldown { remaining: 120 });
    }

    /// Deterministic xorshift so the sweep needs no RNG crate.
    fn readings(seed: u64, n: usize) -> Vec<f64> {
        let mut x = seed;
        (0..n)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                (x % 6000) as f64
            })
            .collect()
    }

    #[test]
    fn invariants_hold_over_random_sequences() {
        let t = Thresholds::new(
            4100.0,
            2000.0,
            Duration::from_millis(1_000),
            Duration::from_millis(250),
        )
        .unwrap();

        for seed in 1..=50u64 {
            let mut c = HysteresisController::new(t);
            for watts in readings(seed, 500) {
                let before = c.state();
                let action = c.tick(watts);
                let after = c.state();

                match action {
                    Some(PowerAction::Enable) => {
                        assert!(matches!(before, ControllerState::Cooldown { remaining } if remaining <= 1));
                        assert!(watts <= t.low_watts);
                    }
                    Some(PowerAction::Disable) => {
                        assert_eq!(before, ControllerState::Normal);
                        assert!(watts >= t.high_watts);
                    }
                    None => {}
                }

                match (before, after) {
                    (
                        ControllerState::Cooldown { remaining: prev },
                        ControllerState::Cooldown { remaining: next },
                    ) => assert_eq!(next, prev - 1),
                    (ControllerState::Throttled, ControllerState::Cooldown { remaining }) => {
                        assert_eq!(remaining, 4)
                    }
                    (ControllerState::Normal, ControllerState::Cooldown { .. }) => {
                        panic!("cooldown entered from normal")
                    }
                    _ => {}
                }
            }
        }
    }
}
