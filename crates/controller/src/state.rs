//! Process-wide control state: the moisture threshold and the pump state.
//!
//! These are the only two values that outlive a single sensing cycle.  Each
//! one has a single writer: [`remote::apply`](crate::remote::apply) replaces
//! the threshold and [`decision::evaluate`](crate::decision::evaluate) drives
//! the pump state.  The setters are crate-private; everything else only reads.

use std::fmt;

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

/// Soil-moisture percentage below which the bed is watered.
///
/// Always strictly between 0 and 100; there is no way to build one outside
/// that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Threshold(u8);

impl Threshold {
    /// Returns `None` unless `value` lies in the open interval (0, 100).
    pub fn new(value: i64) -> Option<Self> {
        if value > 0 && value < 100 {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// ---------------------------------------------------------------------------
// Pump state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PumpState {
    #[default]
    Off,
    /// Relay asserted; the bed is being watered.
    On,
}

impl PumpState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for PumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("OFF"),
            Self::On => f.write_str("ON"),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared control state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    threshold: Threshold,
    pump: PumpState,
}

impl ControlState {
    /// Boot state: the configured default threshold and the pump off.
    pub fn new(default_threshold: Threshold) -> Self {
        Self {
            threshold: default_threshold,
            pump: PumpState::Off,
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn pump(&self) -> PumpState {
        self.pump
    }

    /// Swap in a new threshold, returning the one it replaced.
    pub(crate) fn replace_threshold(&mut self, threshold: Threshold) -> Threshold {
        std::mem::replace(&mut self.threshold, threshold)
    }

    pub(crate) fn set_pump(&mut self, pump: PumpState) {
        self.pump = pump;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_accepts_open_interval() {
        assert_eq!(Threshold::new(1).map(Threshold::percent), Some(1));
        assert_eq!(Threshold::new(45).map(Threshold::percent), Some(45));
        assert_eq!(Threshold::new(99).map(Threshold::percent), Some(99));
    }

    #[test]
    fn threshold_rejects_endpoints_and_beyond() {
        assert_eq!(Threshold::new(0), None);
        assert_eq!(Threshold::new(100), None);
        assert_eq!(Threshold::new(-5), None);
        assert_eq!(Threshold::new(i64::MAX), None);
    }

    #[test]
    fn threshold_display_has_percent_sign() {
        assert_eq!(Threshold::new(30).unwrap().to_string(), "30%");
    }

    #[test]
    fn pump_state_display() {
        assert_eq!(PumpState::On.to_string(), "ON");
        assert_eq!(PumpState::Off.to_string(), "OFF");
    }

    #[test]
    fn control_state_boots_with_pump_off() {
        let st = ControlState::new(Threshold::new(30).unwrap());
        assert_eq!(st.pump(), PumpState::Off);
        assert_eq!(st.threshold().percent(), 30);
    }

    #[test]
    fn replace_threshold_returns_previous() {
        let mut st = ControlState::new(Threshold::new(30).unwrap());
        let prev = st.replace_threshold(Threshold::new(55).unwrap());
        assert_eq!(prev.percent(), 30);
        assert_eq!(st.threshold().percent(), 55);
    }
}
