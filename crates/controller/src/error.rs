//! Error kinds surfaced by the field API and the control loop.

use thiserror::Error;

use crate::field::Field;

/// Returned to callers of the field API. A rejected write never changes
/// stored state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("unknown field '{0}'")]
    NotFound(String),

    /// Range, invariant, parse or access violation.
    #[error("{0}")]
    Validation(String),

    /// The field exists but has no value yet (pressure before the first
    /// good sample).
    #[error("{0} has not been sampled yet")]
    Unavailable(Field),
}

/// Recoverable faults raised inside the control loop. Logged and recorded
/// in the event log; never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ControlError {
    #[error("pressure sensor stale after {missed} missed sample(s)")]
    SensorFault { missed: u32 },

    #[error("MinPSI ({min_psi}) is not below MaxPSI ({max_psi}); pump forced off")]
    InvariantViolation { min_psi: f32, max_psi: f32 },
}
