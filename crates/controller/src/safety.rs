//! Reservoir safety gate.
//!
//! Float and level sensors come wired either way round: some pull the line
//! high when water is present, others when it is absent.  The gate compares
//! the raw reading against a threshold and flips the answer when `invert` is
//! configured, so the same code serves both wirings.

/// `true` when the reservoir reading says there is water to pump.
pub fn is_water_available(water_raw: i32, threshold: i32, invert: bool) -> bool {
    let above = water_raw > threshold;
    if invert {
        !above
    } else {
        above
    }
}

/// Reservoir threshold and polarity, fixed at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyGate {
    threshold_raw: i32,
    invert: bool,
}

impl SafetyGate {
    pub const fn new(threshold_raw: i32, invert: bool) -> Self {
        Self {
            threshold_raw,
            invert,
        }
    }

    pub fn threshold_raw(&self) -> i32 {
        self.threshold_raw
    }

    pub fn inverted(&self) -> bool {
        self.invert
    }

    pub fn water_ok(&self, water_raw: i32) -> bool {
        is_water_available(water_raw, self.threshold_raw, self.invert)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
