//! Sensor sampling and soil-moisture calibration.
//!
//! A [`SensorPort`] produces one raw [`SensorSample`] per cycle.  The sample
//! is turned into a [`CalibratedReading`] by [`calibrate`], which maps the
//! soil channel onto 0-100 % and runs the reservoir channel through the
//! [`SafetyGate`].
//!
//! Environmental values (temperature, humidity) are optional.  A failed read
//! leaves them `None` for that cycle only; nothing downstream of the soil and
//! reservoir channels depends on them.

use crate::safety::SafetyGate;
use crate::state::PumpState;

// ---------------------------------------------------------------------------
// Raw and calibrated values
// ---------------------------------------------------------------------------

/// Raw readings taken at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub soil_raw: i32,
    pub water_raw: i32,
    /// `None` when the environmental sensor failed this cycle.
    pub temp_c: Option<f32>,
    pub humidity_pct: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedReading {
    /// Always within 0..=100.
    pub soil_pct: u8,
    pub water_ok: bool,
    pub temp_c: Option<f32>,
    pub humidity_pct: Option<f32>,
}

// ---------------------------------------------------------------------------
// Sensor port
// ---------------------------------------------------------------------------

/// Source of raw samples: real hardware or the simulator.
pub trait SensorPort {
    /// Take one sample.  Never fails; environmental read errors surface as
    /// `None` fields.
    fn read(&mut self) -> SensorSample;

    /// Told the pump state after every decision.  Only the simulator cares.
    fn pump_feedback(&mut self, _pump: PumpState) {}
}

// ---------------------------------------------------------------------------
// Soil calibration
// ---------------------------------------------------------------------------

/// Two-point linear calibration for the soil probe.
///
/// `raw_dry` maps to 0 % and `raw_wet` to 100 %.  Capacitive probes usually
/// read higher when dry, but either ordering works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoilCalibration {
    raw_dry: i32,
    raw_wet: i32,
}

impl SoilCalibration {
    pub const fn new(raw_dry: i32, raw_wet: i32) -> Self {
        Self { raw_dry, raw_wet }
    }

    pub fn raw_dry(&self) -> i32 {
        self.raw_dry
    }

    pub fn raw_wet(&self) -> i32 {
        self.raw_wet
    }

    /// Map a raw reading onto 0-100 %, rounding to the nearest percent.
    /// Readings beyond either endpoint clamp rather than extrapolate.
    pub fn percent(&self, raw: i32) -> u8 {
        let span = i64::from(self.raw_wet) - i64::from(self.raw_dry);
        if span == 0 {
            return 0; // degenerate calibration; rejected by config validation
        }
        let offset = i64::from(raw) - i64::from(self.raw_dry);
        let pct = offset as f64 / span as f64 * 100.0;
        pct.round().clamp(0.0, 100.0) as u8
    }
}

/// Derive the calibrated reading for one cycle.
pub fn calibrate(
    sample: &SensorSample,
    soil: &SoilCalibration,
    gate: &SafetyGate,
) -> CalibratedReading {
    CalibratedReading {
        soil_pct: soil.percent(sample.soil_raw),
        water_ok: gate.water_ok(sample.water_raw),
        temp_c: sample.temp_c.filter(|v| v.is_finite()),
        humidity_pct: sample.humidity_pct.filter(|v| v.is_finite()),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
