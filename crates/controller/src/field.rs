//! The closed set of fields exposed through `getValue` / `setValue`, and
//! their plain-text wire encoding.
//!
//! Wire names are matched exactly (they are what the control panel sends).
//! Booleans travel as `"1"` / `"0"`, durations as whole milliseconds, and
//! pressures as plain decimals.

use std::fmt;
use std::str::FromStr;

use crate::error::FieldError;

// ---------------------------------------------------------------------------
// Field identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    MistStatus,
    MistDuration,
    MistInterval,
    PumpStatus,
    PumpOverride,
    MinPsi,
    MaxPsi,
    Pressure,
    PressureStale,
    MistersOn,
}

/// Storage type behind a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Millis,
    Psi,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::MistStatus,
        Field::MistDuration,
        Field::MistInterval,
        Field::PumpStatus,
        Field::PumpOverride,
        Field::MinPsi,
        Field::MaxPsi,
        Field::Pressure,
        Field::PressureStale,
        Field::MistersOn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::MistStatus => "MistStatus",
            Field::MistDuration => "MistDuration",
            Field::MistInterval => "MistInterval",
            Field::PumpStatus => "PumpStatus",
            Field::PumpOverride => "PumpOverride",
            Field::MinPsi => "MinPSI",
            Field::MaxPsi => "MaxPSI",
            Field::Pressure => "Pressure",
            Field::PressureStale => "PressureStale",
            Field::MistersOn => "MistersOn",
        }
    }

    pub fn kind(self) -> Kind {
        match self {
            Field::MistDuration | Field::MistInterval => Kind::Millis,
            Field::MinPsi | Field::MaxPsi | Field::Pressure => Kind::Psi,
            Field::MistStatus
            | Field::PumpStatus
            | Field::PumpOverride
            | Field::PressureStale
            | Field::MistersOn => Kind::Bool,
        }
    }

    /// Sensor and relay readbacks cannot be written through the API.
    pub fn is_writable(self) -> bool {
        !matches!(
            self,
            Field::Pressure | Field::PressureStale | Field::MistersOn
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| FieldError::NotFound(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Typed values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Millis(u32),
    Psi(f32),
}

impl Value {
    /// Parse wire text into the type `field` stores. Range checks are the
    /// store's job; this only rejects text that is not the right shape.
    pub fn parse(field: Field, text: &str) -> Result<Self, FieldError> {
        let t = text.trim();
        match field.kind() {
            Kind::Bool => parse_bool(t).map(Value::Bool).ok_or_else(|| {
                FieldError::Validation(format!("{field}: expected 1 or 0, got {t:?}"))
            }),
            Kind::Millis => parse_millis(t).map(Value::Millis).ok_or_else(|| {
                FieldError::Validation(format!("{field}: expected whole milliseconds, got {t:?}"))
            }),
            Kind::Psi => match t.parse::<f32>() {
                Ok(v) if v.is_finite() => Ok(Value::Psi(v)),
                _ => Err(FieldError::Validation(format!(
                    "{field}: expected a number, got {t:?}"
                ))),
            },
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_millis(self) -> Option<u32> {
        match self {
            Value::Millis(ms) => Some(ms),
            _ => None,
        }
    }

    pub fn as_psi(self) -> Option<f32> {
        match self {
            Value::Psi(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => f.write_str("1"),
            Value::Bool(false) => f.write_str("0"),
            Value::Millis(ms) => write!(f, "{ms}"),
            Value::Psi(v) => write!(f, "{v}"),
        }
    }
}

/// Wire text for `value` read from `field`. Live pressure is rounded to a
/// tenth; everything else uses the shortest round-trip form.
pub fn encode(field: Field, value: Value) -> String {
    match (field, value) {
        (Field::Pressure, Value::Psi(v)) => format!("{v:.1}"),
        _ => value.to_string(),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Largest distance from a whole millisecond still treated as float noise.
const MILLIS_TOLERANCE: f64 = 0.01;

/// The panel converts seconds to milliseconds in floating point, so
/// `1.1 s` can arrive as `1100.0000000000002`. That noise is absorbed; a
/// genuine fraction such as `1500.7` is rejected.
fn parse_millis(s: &str) -> Option<u32> {
    let v: f64 = s.parse().ok()?;
    if !v.is_finite() || v < 0.0 || v > u32::MAX as f64 {
        return None;
    }
    let whole = v.round();
    if (v - whole).abs() > MILLIS_TOLERANCE {
        return None;
    }
    Some(whole as u32)
}

// ===========================================================================
// Tests
// ===========================================================================
