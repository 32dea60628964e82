//! Four-line status surface.
//!
//! The lines are built here; putting them on a screen is somebody else's
//! job.  The only renderer shipped is [`LogDisplay`], which writes them to
//! the log at debug level.

use std::fmt;

use tracing::debug;

use crate::sensor::CalibratedReading;
use crate::state::{PumpState, Threshold};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLines {
    pub soil: String,
    pub temperature: String,
    pub reservoir: String,
    pub pump: String,
}

impl StatusLines {
    pub fn new(
        reading: &CalibratedReading,
        water_raw: i32,
        threshold: Threshold,
        pump: PumpState,
    ) -> Self {
        let temperature = match reading.temp_c {
            Some(t) => format!("Temp: {t:.1} C"),
            None => "Temp: -- C".to_string(),
        };
        Self {
            soil: format!("Soil: {}% / Set:{}", reading.soil_pct, threshold.percent()),
            temperature,
            reservoir: format!("Water Raw: {water_raw}"),
            pump: format!("Pump: {pump}"),
        }
    }

    pub fn lines(&self) -> [&str; 4] {
        [&self.soil, &self.temperature, &self.reservoir, &self.pump]
    }
}

impl fmt::Display for StatusLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join(" | "))
    }
}

/// A status surface.  Purely informational; it never feeds back.
pub trait StatusDisplay {
    fn render(&mut self, lines: &StatusLines);
}

/// Renders the status lines into the log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn render(&mut self, lines: &StatusLines) {
        debug!(status = %lines, "display refresh");
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> CalibratedReading {
        CalibratedReading {
            soil_pct: 27,
            water_ok: true,
            temp_c: Some(22.46),
            humidity_pct: Some(51.0),
        }
    }

    #[test]
    fn builds_four_lines() {
        let s = StatusLines::new(&reading(), 1800, Threshold::new(30).unwrap(), PumpState::On);
        assert_eq!(
            s.lines(),
            ["Soil: 27% / Set:30", "Temp: 22.5 C", "Water Raw: 1800", "Pump: ON"]
        );
    }

    #[test]
    fn missing_temperature_shows_dashes() {
        let r = CalibratedReading {
            temp_c: None,
            ..reading()
        };
        let s = StatusLines::new(&r, 0, Threshold::new(30).unwrap(), PumpState::Off);
        assert_eq!(s.temperature, "Temp: -- C");
        assert_eq!(s.pump, "Pump: OFF");
    }

    #[test]
    fn display_joins_lines() {
        let s = StatusLines::new(&reading(), 1800, Threshold::new(30).unwrap(), PumpState::Off);
        assert_eq!(
            s.to_string(),
            "Soil: 27% / Set:30 | Temp: 22.5 C | Water Raw: 1800 | Pump: OFF"
        );
    }
}
