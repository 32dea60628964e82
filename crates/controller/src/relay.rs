//! Pump relay.  The `gpio` feature gates the real rppal driver; without it,
//! a mock relay tracks the state in memory and logs changes.
//!
//! Both variants are safe to drive every cycle: writing the state the relay
//! already has is a no-op apart from the pin write itself.

use anyhow::Result;
use tracing::info;

#[cfg(feature = "gpio")]
use anyhow::Context;
#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

use crate::state::PumpState;

/// Actuation side of the pump decision.
pub trait PumpPort {
    fn set(&mut self, state: PumpState);
}

// ---------------------------------------------------------------------------
// Real GPIO relay (requires rppal and Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct PumpRelay {
    pin: OutputPin,
    active_low: bool, // many relay boards are active-low
    state: PumpState,
}

#[cfg(feature = "gpio")]
impl PumpRelay {
    pub fn new(gpio_pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().context("failed to open GPIO")?;
        let pin = gpio
            .get(gpio_pin)
            .with_context(|| format!("failed to claim GPIO {gpio_pin}"))?
            .into_output();

        let mut relay = Self {
            pin,
            active_low,
            state: PumpState::Off,
        };
        // Fail-safe: the pump starts de-asserted whatever the pin held before.
        relay.drive(PumpState::Off);
        info!(gpio = gpio_pin, active_low, "pump relay initialised");
        Ok(relay)
    }

    fn drive(&mut self, state: PumpState) {
        // active-low: LOW = ON; active-high: HIGH = ON
        if state.is_on() != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }
}

#[cfg(feature = "gpio")]
impl PumpPort for PumpRelay {
    fn set(&mut self, state: PumpState) {
        self.drive(state);
        if state != self.state {
            info!(pump = %state, "relay switched");
            self.state = state;
        }
    }
}

// ---------------------------------------------------------------------------
// Mock relay (no hardware, logs state changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct PumpRelay {
    pub(crate) state: PumpState,
    pub(crate) writes: u32,
}

#[cfg(not(feature = "gpio"))]
impl PumpRelay {
    pub fn new(gpio_pin: u8, _active_low: bool) -> Result<Self> {
        info!(gpio = gpio_pin, "[mock-gpio] pump relay initialised (no hardware)");
        Ok(Self {
            state: PumpState::Off,
            writes: 0,
        })
    }

    pub fn state(&self) -> PumpState {
        self.state
    }
}

#[cfg(not(feature = "gpio"))]
impl PumpPort for PumpRelay {
    fn set(&mut self, state: PumpState) {
        self.writes += 1;
        if state != self.state {
            info!(pump = %state, "[mock-gpio] relay switched");
            self.state = state;
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;

    #[test]
    fn relay_starts_off() {
        let relay = PumpRelay::new(25, false).unwrap();
        assert_eq!(relay.state(), PumpState::Off);
    }

    #[test]
    fn relay_switches_on_and_off() {
        let mut relay = PumpRelay::new(25, false).unwrap();
        relay.set(PumpState::On);
        assert_eq!(relay.state(), PumpState::On);
        relay.set(PumpState::Off);
        assert_eq!(relay.state(), PumpState::Off);
    }

    #[test]
    fn repeated_off_is_harmless() {
        let mut relay = PumpRelay::new(25, true).unwrap();
        relay.set(PumpState::Off);
        relay.set(PumpState::Off);
        assert_eq!(relay.state(), PumpState::Off);
        assert_eq!(relay.writes, 2);
    }
}
