//! Pressure sources for the misting controller.
//!
//! A [`PressureSource`] yields one reading in PSI per call. Two
//! implementations ship here: the ADS1115-backed transducer (`adc` feature)
//! and a closed-loop simulator for development without hardware (`sim`
//! feature).

use anyhow::{ensure, Result};
use serde::Deserialize;

pub mod adc;
#[cfg(feature = "sim")]
pub mod sim;

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Anything that can be sampled for a line pressure reading.
pub trait PressureSource: Send {
    /// Take one reading, in PSI.
    fn read_psi(&mut self) -> Result<f32>;

    /// Called before every sample with the current relay state. Real
    /// transducers ignore it; the simulator uses it to close the loop.
    fn observe_actuators(&mut self, _pump_on: bool, _misters_on: bool) {}
}

// ---------------------------------------------------------------------------
// Transducer calibration
// ---------------------------------------------------------------------------

/// Ratiometric transducer calibration: a linear map from output voltage to
/// PSI, plus a floor below which the signal is treated as a wiring fault.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Output voltage at 0 PSI (0.5 V for the common 0.5-4.5 V parts).
    pub zero_volts: f32,
    /// Output voltage at `full_scale_psi`.
    pub full_scale_volts: f32,
    pub full_scale_psi: f32,
    /// Anything below this is an open circuit, not a low pressure.
    pub min_valid_volts: f32,
}

/// Readings this far past full scale are clamped rather than rejected.
const OVER_RANGE_TOLERANCE_VOLTS: f32 = 0.25;

impl Default for Calibration {
    fn default() -> Self {
        Self {
            zero_volts: 0.5,
            full_scale_volts: 4.5,
            full_scale_psi: 150.0,
            min_valid_volts: 0.2,
        }
    }
}

impl Calibration {
    /// Check the calibration describes a usable, increasing transfer curve.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.full_scale_volts > self.zero_volts,
            "full_scale_volts ({}) must be greater than zero_volts ({})",
            self.full_scale_volts,
            self.zero_volts
        );
        ensure!(
            self.full_scale_psi > 0.0,
            "full_scale_psi must be positive, got {}",
            self.full_scale_psi
        );
        ensure!(
            self.min_valid_volts < self.zero_volts,
            "min_valid_volts ({}) must be below zero_volts ({})",
            self.min_valid_volts,
            self.zero_volts
        );
        Ok(())
    }

    /// Convert a transducer output voltage to PSI.
    ///
    /// Fails for an open or shorted signal line so the caller can keep its
    /// last good value instead of reporting a bogus zero.
    pub fn volts_to_psi(&self, volts: f32) -> Result<f32> {
        ensure!(volts.is_finite(), "transducer voltage is not a number");
        ensure!(
            volts >= self.min_valid_volts,
            "transducer signal {volts:.3} V below {:.3} V (sensor disconnected?)",
            self.min_valid_volts
        );
        ensure!(
            volts <= self.full_scale_volts + OVER_RANGE_TOLERANCE_VOLTS,
            "transducer signal {volts:.3} V above full scale (shorted?)"
        );

        let span = self.full_scale_volts - self.zero_volts;
        let psi = (volts - self.zero_volts) / span * self.full_scale_psi;
        Ok(psi.clamp(0.0, self.full_scale_psi))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
