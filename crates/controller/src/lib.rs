//! Closed-loop irrigation controller for a single plant bed.
//!
//! One cooperative loop samples soil moisture, reservoir level and the
//! environment on a fixed cadence, waters the bed while the soil is drier
//! than a remotely adjustable threshold, and refuses to run the pump when
//! the reservoir is empty.  Status goes to a four-line display surface and a
//! compact telemetry record goes out over MQTT.

#[cfg(not(any(feature = "sim", feature = "adc")))]
compile_error!("enable at least one sensor source: the `sim` or `adc` feature");

pub mod adc;
pub mod config;
pub mod control;
pub mod decision;
pub mod display;
pub mod mqtt;
pub mod relay;
pub mod remote;
pub mod safety;
pub mod sensor;
pub mod sht3x;
#[cfg(feature = "sim")]
pub mod sim;
pub mod state;
pub mod telemetry;
