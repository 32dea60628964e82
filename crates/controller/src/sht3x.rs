//! Sensirion SHT3x temperature/humidity sensor over I2C.
//!
//! Single-shot, high repeatability, no clock stretching.  The sensor answers
//! with six bytes: temperature word, CRC, humidity word, CRC.

#![cfg_attr(not(feature = "adc"), allow(dead_code))]

#[cfg(feature = "adc")]
use std::{thread, time::Duration};

#[cfg(feature = "adc")]
use anyhow::{Context, Result};
#[cfg(feature = "adc")]
use rppal::i2c::I2c;

/// Measurement command: high repeatability, clock stretching disabled.
const CMD_MEASURE_HIGH: [u8; 2] = [0x24, 0x00];

const CRC_POLY: u8 = 0x31;
const CRC_INIT: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temp_c: f32,
    pub humidity_pct: f32,
}

/// CRC-8 as specified by Sensirion (poly 0x31, init 0xFF, no reflection).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = CRC_INIT;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Decode a six-byte response.  `None` when either checksum fails.
pub fn decode(buf: &[u8; 6]) -> Option<Measurement> {
    if crc8(&buf[0..2]) != buf[2] || crc8(&buf[3..5]) != buf[5] {
        return None;
    }
    let raw_t = f32::from(u16::from_be_bytes([buf[0], buf[1]]));
    let raw_h = f32::from(u16::from_be_bytes([buf[3], buf[4]]));
    Some(Measurement {
        temp_c: -45.0 + 175.0 * raw_t / 65535.0,
        humidity_pct: (100.0 * raw_h / 65535.0).clamp(0.0, 100.0),
    })
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[cfg(feature = "adc")]
const MEASURE_WAIT: Duration = Duration::from_millis(15);

#[cfg(feature = "adc")]
pub struct Sht3x {
    i2c: I2c,
}

#[cfg(feature = "adc")]
impl Sht3x {
    pub fn new(addr: u16) -> Result<Self> {
        let mut i2c = I2c::new().context("failed to open I2C bus")?;
        i2c.set_slave_address(addr)
            .with_context(|| format!("failed to address SHT3x at 0x{addr:02x}"))?;
        tracing::info!(addr = format_args!("0x{addr:02x}"), "sht3x initialised");
        Ok(Self { i2c })
    }

    pub fn measure(&mut self) -> Result<Measurement> {
        self.i2c.write(&CMD_MEASURE_HIGH)?;
        thread::sleep(MEASURE_WAIT);
        let mut buf = [0u8; 6];
        self.i2c.read(&mut buf)?;
        decode(&buf).context("sht3x checksum mismatch")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
