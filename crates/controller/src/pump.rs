//! Pressure-hysteresis pump control.
//!
//! ```text
//!        Pressure <= MinPSI
//!   Off ───────────────────▶ On
//!    ▲                        │
//!    └────────────────────────┘
//!        Pressure >= MaxPSI
//! ```
//!
//! Between the thresholds the pump holds its state. With `PumpOverride`
//! set, automatic transitions stop and the pump follows the last manual
//! `PumpStatus` write.

use serde::Serialize;

use crate::error::ControlError;
use crate::relay::{Relay, RelayBoard};
use crate::store::FieldStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpState {
    Off,
    On,
}

impl PumpState {
    fn from_on(on: bool) -> Self {
        if on {
            PumpState::On
        } else {
            PumpState::Off
        }
    }

    pub fn is_on(self) -> bool {
        self == PumpState::On
    }
}

/// Everything a pump decision depends on, snapshotted from the store.
#[derive(Debug, Clone, Copy)]
pub struct PumpInputs {
    /// `None` until the first good sample.
    pub pressure: Option<f32>,
    pub min_psi: f32,
    pub max_psi: f32,
    pub override_on: bool,
    pub manual_on: bool,
}

impl PumpInputs {
    pub fn from_store(store: &FieldStore) -> Self {
        let p = store.params();
        Self {
            pressure: store.pressure(),
            min_psi: p.min_psi,
            max_psi: p.max_psi,
            override_on: p.pump_override,
            manual_on: store.manual_pump(),
        }
    }
}

/// Pure transition function.
/// A broken threshold ordering is an error in every mode, manual included.
pub fn next_state(current: PumpState, inputs: &PumpInputs) -> Result<PumpState, ControlError> {
    if !(inputs.min_psi < inputs.max_psi) {
        return Err(ControlError::InvariantViolation {
            min_psi: inputs.min_psi,
            max_psi: inputs.max_psi,
        });
    }

    if inputs.override_on {
        return Ok(PumpState::from_on(inputs.manual_on));
    }

    // No reading yet: never start blind.
    let Some(psi) = inputs.pressure else {
        return Ok(PumpState::Off);
    };

    Ok(match current {
        PumpState::Off if psi <= inputs.min_psi => PumpState::On,
        PumpState::On if psi >= inputs.max_psi => PumpState::Off,
        held => held,
    })
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct PumpController {
    state: PumpState,
}

impl PumpController {
    pub fn new() -> Self {
        Self {
            state: PumpState::Off,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Re-evaluate against the store and drive the relay. Returns the new
    /// state when it changed. On an invariant violation the pump is forced
    /// off before the error is returned.
    pub fn evaluate(
        &mut self,
        store: &mut FieldStore,
        relays: &mut RelayBoard,
    ) -> Result<Option<PumpState>, ControlError> {
        let inputs = PumpInputs::from_store(store);
        match next_state(self.state, &inputs) {
            Ok(next) if next != self.state => {
                self.apply(next, store, relays);
                Ok(Some(next))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                if self.state != PumpState::Off {
                    self.apply(PumpState::Off, store, relays);
                }
                Err(e)
            }
        }
    }

    fn apply(&mut self, next: PumpState, store: &mut FieldStore, relays: &mut RelayBoard) {
        relays.set(Relay::Pump, next.is_on());
        store.set_pump_on(next.is_on());
        self.state = next;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
