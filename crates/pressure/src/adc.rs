//! ADS1115 16-bit ADC front end for a ratiometric pressure transducer.
//!
//! Reads one single-ended channel at PGA ±6.144 V, 128 SPS, single-shot
//! mode. The wider gain range keeps the full 0.5-4.5 V transducer swing
//! inside the converter's input window when the transducer runs from 5 V.
//!
//! Register math is always compiled so it stays testable on the host; the
//! I2C driver itself needs the `adc` feature.

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
#[cfg_attr(not(feature = "adc"), allow(dead_code))]
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
#[cfg_attr(not(feature = "adc"), allow(dead_code))]
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       write 1 to start single-shot conversion
//   [14:12] MUX      input multiplexer (channel selection)
//   [11:9]  PGA      programmable gain amplifier
//   [8]     MODE     0 = continuous, 1 = single-shot
//   [7:5]   DR       data rate
//   [4]     COMP_MODE
//   [3]     COMP_POL
//   [2]     COMP_LAT
//   [1:0]   COMP_QUE 11 = disable comparator (default)

/// OS=1 (start), PGA=000 (±6.144 V), MODE=1 (single-shot), DR=100 (128 SPS),
/// COMP_QUE=11 (comparator off).
const CONFIG_BASE: u16 = 0b1_000_000_1_100_0_0_0_11;

const MUX_SHIFT: u8 = 12;
/// AIN0: MUX=100, AIN1: MUX=101, AIN2: MUX=110, AIN3: MUX=111
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

/// Maximum valid ADS1115 channel index (0-3 for single-ended).
pub const MAX_CHANNEL: usize = 3;

/// Full-scale input voltage at PGA=000.
const FULL_SCALE_VOLTS: f32 = 6.144;

/// Build the config register value for a single-ended read on `channel`.
#[cfg_attr(not(feature = "adc"), allow(dead_code))]
fn config_for_channel(channel: usize) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[channel] << MUX_SHIFT)
}

/// Convert a raw conversion result to volts at the configured gain.
/// Single-ended inputs never go negative; bus noise that says otherwise is
/// clamped to zero.
pub fn raw_to_volts(raw: i16) -> f32 {
    let clamped = raw.max(0) as f32;
    clamped * FULL_SCALE_VOLTS / 32768.0
}

#[cfg(feature = "adc")]
pub use driver::Ads1115Transducer;

#[cfg(feature = "adc")]
mod driver {
    use anyhow::Context;
    use rppal::i2c::I2c;
    use std::{thread, time::Duration};

    use super::*;
    use crate::{Calibration, PressureSource};

    /// Conversion time at 128 SPS is ~7.8 ms.  We wait 9 ms for margin.
    const CONVERSION_WAIT: Duration = Duration::from_millis(9);

    /// Bit 15 of the config register: conversion-ready flag when read.
    const OS_READY_BIT: u16 = 1 << 15;

    /// Pressure transducer wired to one ADS1115 input.
    pub struct Ads1115Transducer {
        i2c: I2c,
        channel: usize,
        calibration: Calibration,
    }

    impl Ads1115Transducer {
        /// Open I2C bus 1 and address the ADS1115 at `addr`.
        pub fn new(addr: u16, channel: usize, calibration: Calibration) -> anyhow::Result<Self> {
            anyhow::ensure!(
                channel <= MAX_CHANNEL,
                "ADS1115 channel {channel} out of range (0-{MAX_CHANNEL})",
            );
            calibration.validate().context("invalid transducer calibration")?;

            let mut i2c = I2c::new()?;
            i2c.set_slave_address(addr)?;

            tracing::info!(
                addr = format_args!("0x{addr:02x}"),
                channel,
                full_scale_psi = calibration.full_scale_psi,
                "ads1115 pressure transducer initialised"
            );

            Ok(Self {
                i2c,
                channel,
                calibration,
            })
        }

        fn read_raw(&mut self) -> anyhow::Result<i16> {
            let config = config_for_channel(self.channel);
            self.i2c.block_write(REG_CONFIG, &config.to_be_bytes())?;

            thread::sleep(CONVERSION_WAIT);

            // One wait is normally enough at 128 SPS; poll OS briefly anyway.
            let mut ready = false;
            for _ in 0..3 {
                let mut buf = [0u8; 2];
                self.i2c.block_read(REG_CONFIG, &mut buf)?;
                if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                    ready = true;
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }
            anyhow::ensure!(ready, "ADS1115 conversion did not complete");

            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONVERSION, &mut buf)?;
            Ok(i16::from_be_bytes(buf))
        }
    }

    impl PressureSource for Ads1115Transducer {
        fn read_psi(&mut self) -> anyhow::Result<f32> {
            let raw = self
                .read_raw()
                .with_context(|| format!("ads1115 read failed on channel {}", self.channel))?;
            self.calibration.volts_to_psi(raw_to_volts(raw))
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
