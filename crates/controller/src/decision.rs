//! Pump decision: the core state machine.
//!
//! ```text
//!            soil < threshold && water ok
//!   OFF ───────────────────────────────────▶ WATERING
//!    ▲                                          │
//!    └──── soil >= threshold  ||  no water ─────┘
//! ```
//!
//! Rules are applied in strict priority order every cycle:
//!
//! 1. reservoir empty → OFF, whatever the soil says;
//! 2. soil below threshold → WATERING;
//! 3. otherwise → OFF.
//!
//! The minimum-on hold that follows a fresh start is owned by the control
//! loop (see [`crate::control`]); this module only decides.

use tracing::info;

use crate::sensor::CalibratedReading;
use crate::state::{ControlState, PumpState, Threshold};

/// Which rule produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Reservoir lockout.
    ReservoirEmpty,
    /// Soil below the threshold.
    SoilDry,
    /// Soil at or above the threshold.
    SoilMoist,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub pump: PumpState,
    pub reason: Reason,
    /// Pump state before this evaluation.
    pub previous: PumpState,
    /// Threshold snapshot the decision was made against.
    pub threshold: Threshold,
}

impl Decision {
    /// OFF → ON on this evaluation.
    pub fn started(&self) -> bool {
        self.previous == PumpState::Off && self.pump == PumpState::On
    }

    /// ON → OFF on this evaluation.
    pub fn stopped(&self) -> bool {
        self.previous == PumpState::On && self.pump == PumpState::Off
    }
}

/// The transition function, free of any state.
pub fn decide(soil_pct: u8, threshold: Threshold, water_ok: bool) -> (PumpState, Reason) {
    if !water_ok {
        (PumpState::Off, Reason::ReservoirEmpty)
    } else if soil_pct < threshold.percent() {
        (PumpState::On, Reason::SoilDry)
    } else {
        (PumpState::Off, Reason::SoilMoist)
    }
}

/// Evaluate one cycle and record the new pump state.
///
/// The threshold is read exactly once, up front.
pub fn evaluate(state: &mut ControlState, reading: &CalibratedReading) -> Decision {
    let threshold = state.threshold();
    let previous = state.pump();
    let (pump, reason) = decide(reading.soil_pct, threshold, reading.water_ok);
    state.set_pump(pump);

    let decision = Decision {
        pump,
        reason,
        previous,
        threshold,
    };

    if decision.started() {
        info!(
            soil_pct = reading.soil_pct,
            threshold = threshold.percent(),
            "pump on: watering"
        );
    } else if decision.stopped() {
        info!(
            soil_pct = reading.soil_pct,
            threshold = threshold.percent(),
            water_ok = reading.water_ok,
            ?reason,
            "pump off"
        );
    }

    decision
}

// ===========================================================================
// Tests
// ===========================================================================
