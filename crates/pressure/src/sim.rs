//! Closed-loop line pressure simulator for local development.
//!
//! Models a pump feeding an accumulator that the misters drain:
//! - Pressure climbs while the pump runs
//! - Pressure falls while the misters are open
//! - A slow background leak
//! - Per-reading transducer noise and occasional spikes
//! - Occasional read dropouts (sensor flakiness)

use anyhow::{bail, Result};
use std::fmt;

use crate::PressureSource;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selected by `pressure.sim_scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Tight plumbing, low noise, no dropouts.
    Steady,
    /// Noticeable leak: the pump cycles even with the misters idle.
    Leaky,
    /// High noise and ~10% dropouts. Exercises the stale-reading path.
    Flaky,
    /// Every read fails. The controller must hold its last safe state.
    Dead,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "leaky" => Self::Leaky,
            "flaky" => Self::Flaky,
            "dead" => Self::Dead,
            _ => Self::Steady,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steady => write!(f, "steady"),
            Self::Leaky => write!(f, "leaky"),
            Self::Flaky => write!(f, "flaky"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Stateful simulator producing plausible PSI readings. All rates are per
/// sample, so the sampling interval sets the time scale.
pub struct PressureSim {
    psi: f64,
    full_scale_psi: f64,

    pump_rate: f64,
    mister_drain: f64,
    leak: f64,

    noise_sigma: f64,
    spike_prob: f32,
    spike_sigma: f64,
    dropout_prob: f32,

    pump_on: bool,
    misters_on: bool,
}

impl PressureSim {
    /// Create a simulator starting from `start_psi` with readings clamped to
    /// `0..=full_scale_psi`.
    pub fn new(scenario: Scenario, start_psi: f64, full_scale_psi: f64) -> Self {
        let (leak, noise_sigma, spike_prob, spike_sigma, dropout_prob) = match scenario {
            Scenario::Steady => (0.05, 0.3, 0.0_f32, 0.0, 0.0_f32),
            Scenario::Leaky => (0.6, 0.4, 0.01, 4.0, 0.0),
            Scenario::Flaky => (0.1, 1.5, 0.05, 10.0, 0.10),
            Scenario::Dead => (0.05, 0.3, 0.0, 0.0, 1.0),
        };

        Self {
            psi: start_psi.clamp(0.0, full_scale_psi),
            full_scale_psi,
            pump_rate: 2.0,
            mister_drain: 3.5,
            leak,
            noise_sigma,
            spike_prob,
            spike_sigma,
            dropout_prob,
            pump_on: false,
            misters_on: false,
        }
    }

    /// Advance the model one step and return the instantaneous reading.
    pub fn sample(&mut self) -> f64 {
        let pump = if self.pump_on { self.pump_rate } else { 0.0 };
        let drain = if self.misters_on { self.mister_drain } else { 0.0 };
        self.psi = (self.psi + pump - drain - self.leak).clamp(0.0, self.full_scale_psi);

        let noise = gaussian(0.0, self.noise_sigma);
        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        };

        (self.psi + noise + spike).clamp(0.0, self.full_scale_psi)
    }

    /// Underlying model pressure without noise.
    pub fn true_psi(&self) -> f64 {
        self.psi
    }
}

impl PressureSource for PressureSim {
    fn read_psi(&mut self) -> Result<f32> {
        let reading = self.sample();
        if fastrand::f32() < self.dropout_prob {
            bail!("simulated transducer dropout");
        }
        Ok(reading as f32)
    }

    fn observe_actuators(&mut self, pump_on: bool, misters_on: bool) {
        self.pump_on = pump_on;
        self.misters_on = misters_on;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
