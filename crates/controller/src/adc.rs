//! ADS1115 16-bit ADC over I2C: soil probe and reservoir probe.
//!
//! Reads single-ended channels at PGA ±4.096 V, 128 SPS, single-shot mode.
//! Register encoding is always compiled so it can be unit tested; the driver
//! itself needs the `adc` feature (rppal).

#![cfg_attr(not(feature = "adc"), allow(dead_code))]

#[cfg(feature = "adc")]
use std::{thread, time::Duration};

#[cfg(feature = "adc")]
use anyhow::{ensure, Context, Result};
#[cfg(feature = "adc")]
use rppal::i2c::I2c;

#[cfg(feature = "adc")]
use crate::config::AdcConfig;
use crate::safety::SafetyGate;
#[cfg(feature = "adc")]
use crate::sensor::{SensorPort, SensorSample};
use crate::sensor::SoilCalibration;
#[cfg(feature = "adc")]
use crate::sht3x::Sht3x;

// ── ADS1115 register addresses ──────────────────────────────────────────────

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       write 1 to start single-shot conversion
//   [14:12] MUX      input multiplexer (channel selection)
//   [11:9]  PGA      programmable gain amplifier
//   [8]     MODE     0 = continuous, 1 = single-shot
//   [7:5]   DR       data rate
//   [4:2]   COMP_*   comparator mode/polarity/latch
//   [1:0]   COMP_QUE 11 = comparator disabled

/// OS=1, PGA=001 (±4.096 V), MODE=1, DR=100 (128 SPS), COMP_QUE=11.
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

const MUX_SHIFT: u8 = 12;
/// AIN0..AIN3 against GND.
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

pub const MAX_CHANNEL: usize = 3;

/// Conversion-ready flag when the config register is read back.
const OS_READY_BIT: u16 = 1 << 15;

fn config_for_channel(channel: usize) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[channel] << MUX_SHIFT)
}

/// Single-ended results are non-negative; anything else is bus corruption.
fn clamp_single_ended(raw: i16) -> i32 {
    i32::from(raw).clamp(0, i32::from(i16::MAX))
}

/// Raw values substituted for failed soil and reservoir reads: the wet
/// endpoint, and a level the gate classifies as empty.  Either one alone
/// resolves the cycle to pump OFF.
fn read_failure_fallbacks(soil: SoilCalibration, gate: SafetyGate) -> (i32, i32) {
    let water = if gate.inverted() {
        gate.threshold_raw().saturating_add(1)
    } else {
        gate.threshold_raw()
    };
    (soil.raw_wet(), water)
}

// ── Driver ──────────────────────────────────────────────────────────────────

#[cfg(feature = "adc")]
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

#[cfg(feature = "adc")]
pub struct Ads1115 {
    i2c: I2c,
}

#[cfg(feature = "adc")]
impl Ads1115 {
    pub fn new(addr: u16) -> Result<Self> {
        let mut i2c = I2c::new().context("failed to open I2C bus")?;
        i2c.set_slave_address(addr)
            .with_context(|| format!("failed to address ADS1115 at 0x{addr:02x}"))?;
        tracing::info!(addr = format_args!("0x{addr:02x}"), "ads1115 initialised");
        Ok(Self { i2c })
    }

    /// Single-shot read of `channel`, clamped to 0..=32767.
    pub fn read_channel(&mut self, channel: usize) -> Result<i32> {
        ensure!(
            channel <= MAX_CHANNEL,
            "ADS1115 channel {channel} out of range (0-{MAX_CHANNEL})"
        );
        self.i2c
            .block_write(REG_CONFIG, &config_for_channel(channel).to_be_bytes())?;
        thread::sleep(CONVERSION_WAIT);

        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        Ok(clamp_single_ended(i16::from_be_bytes(buf)))
    }
}

// ── Board sensors ───────────────────────────────────────────────────────────

/// The real bed: ADS1115 for soil and reservoir, SHT3x for the environment.
///
/// Analog reads that fail are replaced with values that keep the pump off:
/// the soil probe's wet endpoint and a reservoir reading the gate treats as
/// empty.
#[cfg(feature = "adc")]
pub struct BoardSensors {
    adc: Ads1115,
    env: Option<Sht3x>,
    soil_channel: usize,
    water_channel: usize,
    soil_fallback: i32,
    water_fallback: i32,
}

#[cfg(feature = "adc")]
impl BoardSensors {
    pub fn new(cfg: &AdcConfig, soil: SoilCalibration, gate: SafetyGate) -> Result<Self> {
        let adc = Ads1115::new(cfg.i2c_addr)?;
        // The environment sensor is optional; the loop runs without it.
        let env = match Sht3x::new(cfg.env_addr) {
            Ok(env) => Some(env),
            Err(e) => {
                tracing::warn!("sht3x unavailable, environment will read nan: {e:#}");
                None
            }
        };
        let (soil_fallback, water_fallback) = read_failure_fallbacks(soil, gate);
        Ok(Self {
            adc,
            env,
            soil_channel: cfg.soil_channel,
            water_channel: cfg.water_channel,
            soil_fallback,
            water_fallback,
        })
    }

    fn read_or(&mut self, channel: usize, fallback: i32, what: &str) -> i32 {
        match self.adc.read_channel(channel) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(channel, fallback, "{what} read failed: {e:#}");
                fallback
            }
        }
    }
}

#[cfg(feature = "adc")]
impl SensorPort for BoardSensors {
    fn read(&mut self) -> SensorSample {
        let soil_raw = self.read_or(self.soil_channel, self.soil_fallback, "soil");
        let water_raw = self.read_or(self.water_channel, self.water_fallback, "reservoir");
        let (temp_c, humidity_pct) = match self.env.as_mut().map(Sht3x::measure) {
            Some(Ok(m)) => (Some(m.temp_c), Some(m.humidity_pct)),
            Some(Err(e)) => {
                tracing::debug!("environment read failed: {e:#}");
                (None, None)
            }
            None => (None, None),
        };
        SensorSample {
            soil_raw,
            water_raw,
            temp_c,
            humidity_pct,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
