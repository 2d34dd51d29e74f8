//! Field store: the single source of truth for tunable parameters and live
//! readings.
//!
//! Writable parameters live in [`Params`] and are only changed through
//! [`FieldStore::set`], which validates the whole candidate parameter set
//! before committing it. Derived fields (pump/mister state, pressure) have
//! crate-private writers used by the controllers.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::error::FieldError;
use crate::field::{Field, Value};

pub const MIST_DURATION_MS: RangeInclusive<u32> = 500..=30_000;
pub const MIN_PSI: RangeInclusive<f32> = 50.0..=110.0;
pub const MAX_PSI: RangeInclusive<f32> = 60.0..=115.0;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Writable parameters. Also the `[fields]` table of the config file, keyed
/// by the same names the wire uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    #[serde(rename = "MistStatus")]
    pub mist_enabled: bool,
    #[serde(rename = "MistDuration")]
    pub mist_duration_ms: u32,
    #[serde(rename = "MistInterval")]
    pub mist_interval_ms: u32,
    #[serde(rename = "MinPSI")]
    pub min_psi: f32,
    #[serde(rename = "MaxPSI")]
    pub max_psi: f32,
    #[serde(rename = "PumpOverride")]
    pub pump_override: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            mist_enabled: false,
            mist_duration_ms: 5_000,
            mist_interval_ms: 5 * 60 * 1000,
            min_psi: 80.0,
            max_psi: 100.0,
            pump_override: false,
        }
    }
}

impl Params {
    /// Every range and cross-field violation, not just the first.
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !MIST_DURATION_MS.contains(&self.mist_duration_ms) {
            errors.push(format!(
                "MistDuration {} out of range [{}, {}] ms",
                self.mist_duration_ms,
                MIST_DURATION_MS.start(),
                MIST_DURATION_MS.end()
            ));
        }
        if self.mist_interval_ms < self.mist_duration_ms {
            errors.push(format!(
                "MistInterval ({}) must be at least MistDuration ({})",
                self.mist_interval_ms, self.mist_duration_ms
            ));
        }

        if !MIN_PSI.contains(&self.min_psi) {
            errors.push(format!(
                "MinPSI {} out of range [{}, {}]",
                self.min_psi,
                MIN_PSI.start(),
                MIN_PSI.end()
            ));
        }
        if !MAX_PSI.contains(&self.max_psi) {
            errors.push(format!(
                "MaxPSI {} out of range [{}, {}]",
                self.max_psi,
                MAX_PSI.start(),
                MAX_PSI.end()
            ));
        }
        // Written as a negation so NaN fails too.
        if !(self.min_psi < self.max_psi) {
            errors.push(format!(
                "MaxPSI ({}) must be greater than MinPSI ({})",
                self.max_psi, self.min_psi
            ));
        }

        errors
    }

    fn with(mut self, field: Field, value: Value) -> Result<Self, FieldError> {
        let mismatch = || FieldError::Validation(format!("{field}: wrong value type"));
        match field {
            Field::MistStatus => self.mist_enabled = value.as_bool().ok_or_else(mismatch)?,
            Field::MistDuration => self.mist_duration_ms = value.as_millis().ok_or_else(mismatch)?,
            Field::MistInterval => self.mist_interval_ms = value.as_millis().ok_or_else(mismatch)?,
            Field::MinPsi => self.min_psi = value.as_psi().ok_or_else(mismatch)?,
            Field::MaxPsi => self.max_psi = value.as_psi().ok_or_else(mismatch)?,
            Field::PumpOverride => self.pump_override = value.as_bool().ok_or_else(mismatch)?,
            Field::PumpStatus | Field::Pressure | Field::PressureStale | Field::MistersOn => {
                return Err(FieldError::Validation(format!("{field} is not a parameter")));
            }
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FieldStore {
    params: Params,
    /// Last explicit `PumpStatus` write; what the pump follows under override.
    manual_pump: bool,
    pump_on: bool,
    misters_on: bool,
    pressure: Option<f32>,
    pressure_stale: bool,
}

impl FieldStore {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            manual_pump: false,
            pump_on: false,
            misters_on: false,
            pressure: None,
            pressure_stale: false,
        }
    }

    pub fn get(&self, field: Field) -> Result<Value, FieldError> {
        let p = &self.params;
        let value = match field {
            Field::MistStatus => Value::Bool(p.mist_enabled),
            Field::MistDuration => Value::Millis(p.mist_duration_ms),
            Field::MistInterval => Value::Millis(p.mist_interval_ms),
            Field::PumpStatus => Value::Bool(self.pump_on),
            Field::PumpOverride => Value::Bool(p.pump_override),
            Field::MinPsi => Value::Psi(p.min_psi),
            Field::MaxPsi => Value::Psi(p.max_psi),
            Field::Pressure => Value::Psi(self.pressure.ok_or(FieldError::Unavailable(field))?),
            Field::PressureStale => Value::Bool(self.pressure_stale),
            Field::MistersOn => Value::Bool(self.misters_on),
        };
        Ok(value)
    }

    /// Validate and commit a write. Returns whether the stored value
    /// changed. On error nothing is modified.
    pub fn set(&mut self, field: Field, value: Value) -> Result<bool, FieldError> {
        if !field.is_writable() {
            return Err(FieldError::Validation(format!("{field} is read-only")));
        }

        if field == Field::PumpStatus {
            let on = value.as_bool().ok_or_else(|| {
                FieldError::Validation(format!("{field}: wrong value type"))
            })?;
            if !self.params.pump_override {
                return Err(FieldError::Validation(
                    "PumpStatus is automatic; enable PumpOverride to switch the pump manually"
                        .to_string(),
                ));
            }
            let changed = self.manual_pump != on;
            self.manual_pump = on;
            return Ok(changed);
        }

        let candidate = self.params.with(field, value)?;
        let errors = candidate.violations();
        if !errors.is_empty() {
            return Err(FieldError::Validation(errors.join("; ")));
        }

        // Entering override: hold whatever the pump is doing right now.
        if field == Field::PumpOverride && candidate.pump_override && !self.params.pump_override {
            self.manual_pump = self.pump_on;
        }

        let changed = candidate != self.params;
        self.params = candidate;
        Ok(changed)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn manual_pump(&self) -> bool {
        self.manual_pump
    }

    pub fn pump_on(&self) -> bool {
        self.pump_on
    }

    pub fn misters_on(&self) -> bool {
        self.misters_on
    }

    pub fn pressure(&self) -> Option<f32> {
        self.pressure
    }

    pub fn pressure_stale(&self) -> bool {
        self.pressure_stale
    }

    // -- Derived-field writers (controllers only) -------------------------

    pub(crate) fn set_pump_on(&mut self, on: bool) {
        self.pump_on = on;
    }

    pub(crate) fn set_misters_on(&mut self, on: bool) {
        self.misters_on = on;
    }

    pub(crate) fn record_pressure(&mut self, psi: f32) {
        self.pressure = Some(psi);
    }

    pub(crate) fn set_pressure_stale(&mut self, stale: bool) {
        self.pressure_stale = stale;
    }

    /// Test hook for states validation normally prevents.
    #[cfg(test)]
    pub(crate) fn force_params(&mut self, params: Params) {
        self.params = params;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
