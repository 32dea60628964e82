//! The control loop: sensing, decision, actuation, status and telemetry on
//! a fixed cadence.
//!
//! [`ControlLoop::tick`] is called on every pass of the scheduler (much more
//! often than the sensing period).  Each pass:
//!
//! 1. drains the remote-command mailbox;
//! 2. if a minimum-on hold is running, waits for it to expire and then
//!    finishes the held cycle;
//! 3. otherwise checks the cadence gate and, when the period has elapsed,
//!    runs a full cycle.
//!
//! ```text
//!           period elapsed                    pump started
//!  Ready ───────────────────▶ [sense/decide] ──────────────▶ Holding
//!    ▲                              │                          │
//!    │                              │ no fresh start           │ hold expired
//!    │                              ▼                          │
//!    └─────────────────────── [status/telemetry] ◀─────────────┘
//! ```
//!
//! Nothing here sleeps.  Time comes in through the `now` argument, so tests
//! drive the loop with tokio's paused clock.
//!
//! A reservoir that runs dry during the hold window is only noticed by the
//! next cycle.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decision::{self, Decision, Reason};
use crate::display::{StatusDisplay, StatusLines};
use crate::relay::PumpPort;
use crate::remote::{self, CommandInbox};
use crate::safety::SafetyGate;
use crate::sensor::{self, CalibratedReading, SensorPort, SoilCalibration};
use crate::state::{ControlState, PumpState, Threshold};
use crate::telemetry::{self, Delivery, TelemetrySink};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything the loop needs from the configuration, resolved once at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub period: Duration,
    pub pump_min_on: Duration,
    pub default_threshold: Threshold,
    pub soil: SoilCalibration,
    pub gate: SafetyGate,
}

impl LoopSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let default_threshold = Threshold::new(i64::from(cfg.control.default_threshold_pct))
            .with_context(|| {
                format!(
                    "default_threshold_pct {} outside (0, 100)",
                    cfg.control.default_threshold_pct
                )
            })?;
        Ok(Self {
            period: Duration::from_millis(cfg.control.sample_period_ms),
            pump_min_on: Duration::from_millis(cfg.control.pump_min_on_ms),
            default_threshold,
            soil: SoilCalibration::new(cfg.calibration.soil_raw_dry, cfg.calibration.soil_raw_wet),
            gate: SafetyGate::new(cfg.reservoir.threshold_raw, cfg.reservoir.invert),
        })
    }
}

// ---------------------------------------------------------------------------
// Cycle bookkeeping
// ---------------------------------------------------------------------------

/// Summary of one completed sensing cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub reading: CalibratedReading,
    pub water_raw: i32,
    pub decision: Decision,
    pub telemetry: Delivery,
}

/// A cycle that has decided but not yet reported.
#[derive(Debug, Clone, Copy)]
struct Pending {
    reading: CalibratedReading,
    water_raw: i32,
    decision: Decision,
}

#[derive(Debug)]
enum Phase {
    Ready,
    /// Pump freshly started; nothing may run until `until`.
    Holding { until: Instant, pending: Pending },
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

pub struct ControlLoop<S, P, D, T> {
    settings: LoopSettings,
    sensors: S,
    pump: P,
    display: D,
    telemetry: T,
    inbox: CommandInbox,
    state: ControlState,
    phase: Phase,
    last_cycle: Option<Instant>,
    last_reason: Option<Reason>,
    env_failing: bool,
}

impl<S, P, D, T> ControlLoop<S, P, D, T>
where
    S: SensorPort,
    P: PumpPort,
    D: StatusDisplay,
    T: TelemetrySink,
{
    pub fn new(
        settings: LoopSettings,
        sensors: S,
        mut pump: P,
        display: D,
        telemetry: T,
        inbox: CommandInbox,
    ) -> Self {
        pump.set(PumpState::Off);
        Self {
            settings,
            sensors,
            pump,
            display,
            telemetry,
            inbox,
            state: ControlState::new(settings.default_threshold),
            phase: Phase::Ready,
            last_cycle: None,
            last_reason: None,
            env_failing: false,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// `true` while a minimum-on hold is running.
    pub fn is_holding(&self) -> bool {
        matches!(self.phase, Phase::Holding { .. })
    }

    /// One scheduler pass.  Returns a report when a cycle completed.
    pub fn tick(&mut self, now: Instant) -> Option<CycleReport> {
        self.drain_commands();

        if let Phase::Holding { until, .. } = &self.phase {
            if now < *until {
                return None;
            }
        }
        if let Phase::Holding { pending, .. } = std::mem::replace(&mut self.phase, Phase::Ready) {
            return Some(self.finish(pending));
        }

        if let Some(last) = self.last_cycle {
            if now.duration_since(last) < self.settings.period {
                return None;
            }
        }
        self.last_cycle = Some(now);

        let pending = self.sense_and_decide();
        if pending.decision.started() && !self.settings.pump_min_on.is_zero() {
            debug!(
                hold_ms = self.settings.pump_min_on.as_millis() as u64,
                "minimum-on hold started"
            );
            self.phase = Phase::Holding {
                until: now + self.settings.pump_min_on,
                pending,
            };
            return None;
        }
        Some(self.finish(pending))
    }

    /// Force the pump off.  Called on shutdown.
    pub fn shutdown(&mut self) {
        self.pump.set(PumpState::Off);
        info!("control loop stopped; pump de-asserted");
    }

    fn drain_commands(&mut self) {
        if let Some(raw) = self.inbox.take() {
            if let Err(reason) = remote::apply(&raw, &mut self.state) {
                warn!(%reason, "remote threshold command discarded");
            }
        }
    }

    fn sense_and_decide(&mut self) -> Pending {
        let sample = self.sensors.read();
        self.note_environment(sample.temp_c.is_some() && sample.humidity_pct.is_some());

        let reading = sensor::calibrate(&sample, &self.settings.soil, &self.settings.gate);
        let decision = decision::evaluate(&mut self.state, &reading);
        self.note_lockout(decision.reason, sample.water_raw);

        self.pump.set(decision.pump);
        self.sensors.pump_feedback(decision.pump);

        Pending {
            reading,
            water_raw: sample.water_raw,
            decision,
        }
    }

    fn note_lockout(&mut self, reason: Reason, water_raw: i32) {
        let was_locked = self.last_reason == Some(Reason::ReservoirEmpty);
        let locked = reason == Reason::ReservoirEmpty;
        if locked && !was_locked {
            warn!(water_raw, "reservoir empty: pump locked out");
        } else if was_locked && !locked {
            info!(water_raw, "reservoir refilled: lockout cleared");
        }
        self.last_reason = Some(reason);
    }

    fn note_environment(&mut self, ok: bool) {
        match (self.env_failing, ok) {
            (false, false) => warn!("environmental sensor read failed; reporting sentinel values"),
            (true, false) => debug!("environmental sensor still failing"),
            (true, true) => info!("environmental sensor recovered"),
            (false, true) => {}
        }
        self.env_failing = !ok;
    }

    fn finish(&mut self, pending: Pending) -> CycleReport {
        let Pending {
            reading,
            water_raw,
            decision,
        } = pending;

        let lines = StatusLines::new(&reading, water_raw, decision.threshold, decision.pump);
        self.display.render(&lines);

        let delivery = self.telemetry.publish(telemetry::format(&reading));

        debug!(
            soil_pct = reading.soil_pct,
            water_ok = reading.water_ok,
            water_raw,
            threshold = decision.threshold.percent(),
            pump = %decision.pump,
            telemetry = ?delivery,
            "cycle complete"
        );

        CycleReport {
            reading,
            water_raw,
            decision,
            telemetry: delivery,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
