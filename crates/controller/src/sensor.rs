//! Pressure sampling on its own cadence, independent of the loop tick.

use aero_pressure::PressureSource;
use serde::Deserialize;

use crate::store::FieldStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub sample_interval_ms: u32,
    /// Consecutive failed samples before the reading is flagged stale.
    pub stale_after_missed: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1_000,
            stale_after_missed: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Fresh(f32),
    Missed {
        /// Consecutive misses including this one.
        missed: u32,
        /// True once `missed` has reached the stale threshold.
        stale: bool,
        error: String,
    },
}

pub struct PressureAdapter {
    cfg: SamplingConfig,
    next_due: u64,
    missed: u32,
}

impl PressureAdapter {
    pub fn new(cfg: SamplingConfig) -> Self {
        Self {
            cfg,
            next_due: 0,
            missed: 0,
        }
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Take a sample if one is due at `now_ms`. A good reading replaces the
    /// stored pressure and clears the stale flag; a failed one keeps the
    /// last known value.
    pub fn poll(
        &mut self,
        now_ms: u64,
        source: &mut dyn PressureSource,
        store: &mut FieldStore,
    ) -> Option<SampleOutcome> {
        if now_ms < self.next_due {
            return None;
        }
        // Fixed cadence: late polls don't push the schedule back. A whole
        // missed interval re-anchors on now instead of bursting to catch up.
        let interval = u64::from(self.cfg.sample_interval_ms);
        self.next_due += interval;
        if self.next_due <= now_ms {
            self.next_due = now_ms + interval;
        }

        let reading = source.read_psi().and_then(|psi| {
            anyhow::ensure!(psi.is_finite(), "non-finite reading {psi}");
            Ok(psi)
        });

        match reading {
            Ok(psi) => {
                self.missed = 0;
                store.record_pressure(psi);
                store.set_pressure_stale(false);
                Some(SampleOutcome::Fresh(psi))
            }
            Err(e) => {
                self.missed = self.missed.saturating_add(1);
                let stale = self.missed >= self.cfg.stale_after_missed;
                if stale {
                    store.set_pressure_stale(true);
                }
                tracing::warn!(
                    missed = self.missed,
                    stale,
                    last_psi = ?store.pressure(),
                    "pressure sample failed: {e:#}"
                );
                Some(SampleOutcome::Missed {
                    missed: self.missed,
                    stale,
                    error: format!("{e:#}"),
                })
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
