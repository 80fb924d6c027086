//! Tick scheduler — drives the control loop at a fixed interval.
//!
//! Each tick runs `sample → transition → optional fan-out` to completion
//! before the next one starts. A tick that overruns its slot (a slow
//! telemetry read) makes the timer skip the missed slots instead of
//! bursting to catch up, so ticks never overlap or reorder.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use powermon_core::{PowerAction, Thresholds};
use powermon_fleet::FleetController;
use powermon_telemetry::TelemetrySource;

use crate::hysteresis::{ControllerState, HysteresisController};

/// Counters kept for the lifetime of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub missed_samples: u64,
    pub fan_outs: u64,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// `None` when the sample could not be taken.
    pub watts: Option<f64>,
    pub action: Option<PowerAction>,
    pub state: ControllerState,
}

pub struct Scheduler {
    telemetry: Arc<dyn TelemetrySource>,
    fleet: FleetController,
    controller: HysteresisController,
    interval: Duration,
    stats: LoopStats,
}

impl Scheduler {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        fleet: FleetController,
        thresholds: Thresholds,
    ) -> Self {
        Self::with_controller(telemetry, fleet, HysteresisController::new(thresholds))
    }

    pub fn with_controller(
        telemetry: Arc<dyn TelemetrySource>,
        fleet: FleetController,
        controller: HysteresisController,
    ) -> Self {
        Self {
            interval: controller.thresholds().sample_interval,
            telemetry,
            fleet,
            controller,
            stats: LoopStats::default(),
        }
    }

    pub fn controller(&self) -> &HysteresisController {
        &self.controller
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run one iteration of the control loop.
    ///
    /// A failed or non-finite sample skips the transition entirely. A
    /// fan-out is started but never awaited.
    pub async fn tick(&mut self) -> TickReport {
        self.stats.ticks += 1;

        let watts = match self.telemetry.sample().await {
            Ok(watts) if watts.is_finite() => watts,
            Ok(watts) => {
                self.stats.missed_samples += 1;
                warn!(watts, state = %self.controller.state(), "ignoring non-finite sample");
                return self.missed();
            }
            Err(e) => {
                self.stats.missed_samples += 1;
                warn!(error = %e, state = %self.controller.state(), "telemetry sample failed, skipping tick");
                return self.missed();
            }
        };

        let action = self.controller.tick(watts);
        if let Some(action) = action {
            self.stats.fan_outs += 1;
            self.fleet.set_all(action);
        }

        TickReport {
            watts: Some(watts),
            action,
            state: self.controller.state(),
        }
    }

    fn missed(&self) -> TickReport {
        TickReport {
            watts: None,
            action: None,
            state: self.controller.state(),
        }
    }

    /// Tick every `sample_interval` until `shutdown` flips or its sender
    /// is dropped. In-flight fan-out tasks are left to finish on their own.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            high_watts = self.controller.thresholds().high_watts,
            low_watts = self.controller.thresholds().low_watts,
            cooldown_ticks = self.controller.cooldown_ticks(),
            workers = self.fleet.workers().len(),
            "power monitor running"
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("control loop shutting down");
                    break;
                }
            }
        }

        info!(
            ticks = self.stats.ticks,
            missed_samples = self.stats.missed_samples,
            fan_outs = self.stats.fan_outs,
            state = %self.controller.state(),
            "control loop stopped"
        );
    }
}
