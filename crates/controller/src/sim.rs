//! Simulated plant bed for development without hardware.
//!
//! Models the three channels the controller reads:
//! - Soil probe: random walk with mean reversion, slow drying drift, ADC
//!   noise and occasional spikes.  Moisture rises while the pump runs.
//! - Reservoir probe: a tank level that drains while pumping, mapped onto
//!   raw counts either side of the configured threshold.
//! - Environment: diurnal temperature/humidity cycle with occasional failed
//!   reads.

use std::fmt;

use crate::safety::SafetyGate;
use crate::sensor::{SensorPort, SensorSample, SoilCalibration};
use crate::state::PumpState;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Simulation profiles selectable via the `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Starts mid-range and dries steadily; tank full.
    Drying,
    /// Hovers near the centre with low noise.
    Stable,
    /// Heavy noise, frequent spikes and environmental read failures.
    Flaky,
    /// Starts near the wet end.  The pump should stay off.
    Wet,
    /// Dry soil with an empty tank.  The pump must stay locked out.
    EmptyTank,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            "empty" | "empty-tank" | "empty_tank" => Self::EmptyTank,
            _ => Self::Drying,
        }
    }

    fn profile(self) -> Profile {
        match self {
            Scenario::Drying => Profile {
                drift: 0.006,
                walk_sigma: 0.004,
                noise_sigma: 0.01,
                spike_prob: 0.03,
                start_frac: 0.5,
                tank_start: 1.0,
                env_fail_prob: 0.02,
            },
            Scenario::Stable => Profile {
                drift: 0.0005,
                walk_sigma: 0.002,
                noise_sigma: 0.004,
                spike_prob: 0.005,
                start_frac: 0.4,
                tank_start: 1.0,
                env_fail_prob: 0.0,
            },
            Scenario::Flaky => Profile {
                drift: 0.004,
                walk_sigma: 0.008,
                noise_sigma: 0.03,
                spike_prob: 0.10,
                start_frac: 0.5,
                tank_start: 1.0,
                env_fail_prob: 0.25,
            },
            Scenario::Wet => Profile {
                drift: 0.001,
                walk_sigma: 0.003,
                noise_sigma: 0.008,
                spike_prob: 0.02,
                start_frac: 0.1,
                tank_start: 1.0,
                env_fail_prob: 0.02,
            },
            Scenario::EmptyTank => Profile {
                drift: 0.004,
                walk_sigma: 0.003,
                noise_sigma: 0.008,
                spike_prob: 0.02,
                start_frac: 0.9,
                tank_start: 0.0,
                env_fail_prob: 0.02,
            },
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
            Self::Wet => write!(f, "wet"),
            Self::EmptyTank => write!(f, "empty-tank"),
        }
    }
}

/// Per-scenario parameters.  Soil values are fractions of the calibrated
/// span, 0.0 = wet endpoint, 1.0 = dry endpoint.
struct Profile {
    drift: f64,
    walk_sigma: f64,
    noise_sigma: f64,
    spike_prob: f64,
    start_frac: f64,
    tank_start: f64,
    env_fail_prob: f64,
}

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

const MEAN_REVERSION: f64 = 0.02;
const CENTER_FRAC: f64 = 0.5;
/// Soil dryness removed per cycle while the pump runs.
const WET_RATE: f64 = 0.08;
/// Tank fraction used per pumping cycle.
const TANK_DRAIN: f64 = 0.01;
/// Cycles per simulated day.
const DIURNAL_PERIOD: f64 = 300.0;
const SPIKE_SIGMA: f64 = 0.15;

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct SimSensors {
    scenario: Scenario,
    profile: Profile,
    raw_dry: f64,
    raw_wet: f64,
    /// True dryness, fraction of the calibrated span.
    dryness: f64,
    /// Tank fill level, 0.0..=1.0.
    tank: f64,
    /// Raw counts for a full and an empty tank.
    tank_raw_full: f64,
    tank_raw_empty: f64,
    pumping: bool,
    cycle: u64,
}

impl SimSensors {
    pub fn new(scenario: Scenario, soil: SoilCalibration, gate: SafetyGate) -> Self {
        let profile = scenario.profile();

        // Full reads twice the threshold and empty half of it; an inverted
        // probe swaps the two.
        let threshold = gate.threshold_raw() as f64;
        let (high, low) = (threshold * 2.0, threshold / 2.0);
        let (tank_raw_full, tank_raw_empty) = if gate.inverted() {
            (low, high)
        } else {
            (high, low)
        };

        let dryness = (profile.start_frac + gaussian(0.0, 0.02)).clamp(0.0, 1.0);
        let tank = profile.tank_start;

        tracing::info!(%scenario, dryness, tank, "simulated bed initialised");

        Self {
            scenario,
            profile,
            raw_dry: soil.raw_dry() as f64,
            raw_wet: soil.raw_wet() as f64,
            dryness,
            tank,
            tank_raw_full,
            tank_raw_empty,
            pumping: false,
            cycle: 0,
        }
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Current tank fill level.
    pub fn tank_level(&self) -> f64 {
        self.tank
    }

    fn evolve(&mut self) {
        let p = &self.profile;
        let pull = MEAN_REVERSION * (CENTER_FRAC - self.dryness);
        let walk = gaussian(0.0, p.walk_sigma);
        let wet = if self.pumping { -WET_RATE } else { 0.0 };
        self.dryness = (self.dryness + p.drift + pull + walk + wet).clamp(-0.1, 1.1);

        if self.pumping {
            self.tank = (self.tank - TANK_DRAIN).max(0.0);
        }
        self.cycle += 1;
    }

    fn soil_raw(&self) -> i32 {
        let p = &self.profile;
        let noise = gaussian(0.0, p.noise_sigma);
        let spike = if fastrand::f64() < p.spike_prob {
            gaussian(0.0, SPIKE_SIGMA)
        } else {
            0.0
        };
        let frac = self.dryness + noise + spike;
        let raw = self.raw_wet + frac * (self.raw_dry - self.raw_wet);
        raw.round().clamp(0.0, 32767.0) as i32
    }

    fn water_raw(&self) -> i32 {
        let raw = self.tank_raw_empty + self.tank * (self.tank_raw_full - self.tank_raw_empty);
        (raw + gaussian(0.0, 5.0)).round().clamp(0.0, 32767.0) as i32
    }

    fn environment(&self) -> (Option<f32>, Option<f32>) {
        if fastrand::f64() < self.profile.env_fail_prob {
            return (None, None);
        }
        let phase = 2.0 * std::f64::consts::PI * self.cycle as f64 / DIURNAL_PERIOD;
        let temp = 21.0 + 6.0 * phase.sin() + gaussian(0.0, 0.2);
        let humidity = (55.0 - 15.0 * phase.sin() + gaussian(0.0, 1.0)).clamp(0.0, 100.0);
        (Some(temp as f32), Some(humidity as f32))
    }
}

impl SensorPort for SimSensors {
    fn read(&mut self) -> SensorSample {
        self.evolve();
        let (temp_c, humidity_pct) = self.environment();
        SensorSample {
            soil_raw: self.soil_raw(),
            water_raw: self.water_raw(),
            temp_c,
            humidity_pct,
        }
    }

    fn pump_feedback(&mut self, pump: PumpState) {
        self.pumping = pump.is_on();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
