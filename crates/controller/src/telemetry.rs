//! Telemetry record and the outbound sink.
//!
//! Wire format, one record per sensing cycle:
//!
//! ```text
//! soil_pct,temp_c,humidity_pct,water_ok
//! 42,21.5,48,1
//! ```
//!
//! Temperature carries one decimal, humidity none, `water_ok` is `0`/`1`.
//! A failed environmental read is written as [`INVALID`] so the record keeps
//! four positional fields.

use std::fmt;

use crate::sensor::CalibratedReading;

/// Number of comma-separated fields in every record.
pub const FIELD_COUNT: usize = 4;

/// Placeholder for a temperature or humidity that could not be read.
pub const INVALID: &str = "nan";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    pub soil_pct: u8,
    pub temp_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub water_ok: bool,
}

impl From<&CalibratedReading> for TelemetryRecord {
    fn from(r: &CalibratedReading) -> Self {
        Self {
            soil_pct: r.soil_pct,
            temp_c: r.temp_c,
            humidity_pct: r.humidity_pct,
            water_ok: r.water_ok,
        }
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},", self.soil_pct)?;
        match self.temp_c {
            Some(t) if t.is_finite() => write!(f, "{t:.1},")?,
            _ => write!(f, "{INVALID},")?,
        }
        match self.humidity_pct {
            Some(h) if h.is_finite() => write!(f, "{h:.0},")?,
            _ => write!(f, "{INVALID},")?,
        }
        f.write_str(if self.water_ok { "1" } else { "0" })
    }
}

/// Build the wire payload for one calibrated reading.
pub fn format(reading: &CalibratedReading) -> String {
    TelemetryRecord::from(reading).to_string()
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// What happened to an emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport.
    Sent,
    /// Channel unavailable; the record is gone.
    Dropped,
}

/// Outbound telemetry channel.  Best-effort: implementations must not queue
/// or retry a record they cannot send right now.
pub trait TelemetrySink {
    fn publish(&mut self, payload: String) -> Delivery;
}

// ===========================================================================
// Tests
// ===========================================================================
