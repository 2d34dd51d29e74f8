//! Shared test fixtures.

use std::collections::VecDeque;

use aero_pressure::PressureSource;
use anyhow::{anyhow, Result};

use crate::controller::{Controller, Hardware};
use crate::relay::RelayBoard;
use crate::sensor::SamplingConfig;
use crate::store::Params;

/// Plays back a fixed sequence of readings. Once exhausted it repeats the
/// last good value, or fails if there never was one.
pub struct ScriptedSource {
    script: VecDeque<Result<f32, &'static str>>,
    last: Option<f32>,
}

impl ScriptedSource {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<f32, &'static str>>,
    {
        Self {
            script: script.into_iter().collect(),
            last: None,
        }
    }

    /// A source that always reads `psi`.
    pub fn constant(psi: f32) -> Self {
        Self::new([Ok(psi)])
    }
}

impl PressureSource for ScriptedSource {
    fn read_psi(&mut self) -> Result<f32> {
        match self.script.pop_front() {
            Some(Ok(psi)) => {
                self.last = Some(psi);
                Ok(psi)
            }
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => self.last.ok_or_else(|| anyhow!("script exhausted")),
        }
    }
}

/// Controller on the mock relay board, sampling every second.
pub fn controller(params: Params, source: ScriptedSource) -> Controller {
    let hw = Hardware {
        relays: RelayBoard::new(17, 27, true).unwrap(),
        sensor: Box::new(source),
    };
    Controller::new(params, SamplingConfig::default(), hw)
}
