//! Misting duty cycle.
//!
//! ```text
//!            boundary                 boundary + MistDuration
//!   Idle ────────────────▶ Bursting ─────────────────────────▶ Idle
//!    ▲                                                           │
//!    └──────────────── boundary + MistInterval ──────────────────┘
//! ```
//!
//! Enabling `MistStatus` makes "now" the first period boundary. Disabling
//! it suspends the cycle and closes the mister immediately, even
//! mid-burst.
//!
//! `MistDuration` and `MistInterval` are latched at each boundary: editing
//! them mid-cycle never truncates or stretches the burst or period already
//! under way; the new values shape the cycle that starts at the next
//! boundary.

use serde::Serialize;

use crate::relay::{Relay, RelayBoard};
use crate::store::FieldStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MistPhase {
    Idle,
    Bursting,
}

/// Misting parameters as read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MistParams {
    pub enabled: bool,
    pub duration_ms: u32,
    pub interval_ms: u32,
}

impl MistParams {
    pub fn from_store(store: &FieldStore) -> Self {
        let p = store.params();
        Self {
            enabled: p.mist_enabled,
            duration_ms: p.mist_duration_ms,
            interval_ms: p.mist_interval_ms,
        }
    }
}

/// One period, with timing latched at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cycle {
    started_at: u64,
    burst_ms: u32,
    period_ms: u32,
}

impl Cycle {
    fn latch(started_at: u64, params: MistParams) -> Self {
        Self {
            started_at,
            burst_ms: params.duration_ms,
            period_ms: params.interval_ms,
        }
    }

    fn burst_end(&self) -> u64 {
        self.started_at + u64::from(self.burst_ms)
    }

    fn next_boundary(&self) -> u64 {
        self.started_at + u64::from(self.period_ms)
    }
}

/// What changed in one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MistEvent {
    BurstStarted { at_ms: u64 },
    BurstEnded,
    Suspended,
}

#[derive(Debug, Default)]
pub struct MistScheduler {
    /// `None` while misting is disabled (timer suspended).
    cycle: Option<Cycle>,
}

impl MistScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the cycle to `now_ms` and return the phase the mister should
    /// be in, plus whether a new period began.
    fn advance(&mut self, now_ms: u64, params: MistParams) -> (MistPhase, bool) {
        if !params.enabled {
            self.cycle = None;
            return (MistPhase::Idle, false);
        }

        let mut new_period = false;
        match self.cycle {
            None => {
                self.cycle = Some(Cycle::latch(now_ms, params));
                new_period = true;
            }
            Some(c) if now_ms >= c.next_boundary() => {
                let boundary = c.next_boundary();
                // A tick that lands after the whole burst window would
                // otherwise skip the burst; start the period from now.
                let anchor = if now_ms - boundary < u64::from(params.duration_ms) {
                    boundary
                } else {
                    now_ms
                };
                self.cycle = Some(Cycle::latch(anchor, params));
                new_period = true;
            }
            Some(_) => {}
        }

        let phase = match self.cycle {
            Some(c) if now_ms < c.burst_end() => MistPhase::Bursting,
            _ => MistPhase::Idle,
        };
        (phase, new_period)
    }

    /// Re-evaluate against the store and drive the mister relay. The relay
    /// is only written on an actual edge.
    pub fn evaluate(
        &mut self,
        now_ms: u64,
        store: &mut FieldStore,
        relays: &mut RelayBoard,
    ) -> Option<MistEvent> {
        let params = MistParams::from_store(store);
        let was_on = store.misters_on();
        let (phase, new_period) = self.advance(now_ms, params);
        let on = phase == MistPhase::Bursting;

        if on != was_on {
            relays.set(Relay::Mister, on);
            store.set_misters_on(on);
        }

        match (was_on, on) {
            (_, true) if new_period => Some(MistEvent::BurstStarted { at_ms: now_ms }),
            (true, false) if !params.enabled => Some(MistEvent::Suspended),
            (true, false) => Some(MistEvent::BurstEnded),
            _ => None,
        }
    }

    pub fn phase(&self, now_ms: u64) -> MistPhase {
        match self.cycle {
            Some(c) if now_ms < c.burst_end() => MistPhase::Bursting,
            _ => MistPhase::Idle,
        }
    }

    /// Start of the next period, if the cycle is running.
    pub fn next_boundary(&self) -> Option<u64> {
        self.cycle.map(|c| c.next_boundary())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params(enabled: bool, duration_ms: u32, interval_ms: u32) -> MistParams {
        MistParams {
            enabled,
            duration_ms,
            interval_ms,
        }
    }

    /// Sample the phase every `step` ms over `[0, until)`.
    fn timeline(sched: &mut MistScheduler, p: MistParams, until: u64, step: u64) -> Vec<(u64, MistPhase)> {
        (0..until)
            .step_by(step as usize)
            .map(|t| (t, sched.advance(t, p).0))
            .collect()
    }

    // -- Duty cycle -------------------------------------------------------

    #[test]
    fn two_seconds_every_ten() {
        let mut sched = MistScheduler::new();
        let p = params(true, 2_000, 10_000);
        for (t, phase) in timeline(&mut sched, p, 30_000, 100) {
            let expected = if t % 10_000 < 2_000 {
                MistPhase::Bursting
            } else {
                MistPhase::Idle
            };
            assert_eq!(phase, expected, "t={t}");
        }
    }

    #[test]
    fn burst_edges_are_half_open() {
        let mut sched = MistScheduler::new();
        let p = params(true, 2_000, 10_000);
        assert_eq!(sched.advance(0, p).0, MistPhase::Bursting);
        assert_eq!(sched.advance(1_999, p).0, MistPhase::Bursting);
        assert_eq!(sched.advance(2_000, p).0, MistPhase::Idle);
        assert_eq!(sched.advance(9_999, p).0, MistPhase::Idle);
        assert_eq!(sched.advance(10_000, p).0, MistPhase::Bursting);
    }

    #[test]
    fn disabled_is_idle_and_suspended() {
        let mut sched = MistScheduler::new();
        let p = params(false, 2_000, 10_000);
        assert_eq!(sched.advance(0, p), (MistPhase::Idle, false));
        assert_eq!(sched.next_boundary(), None);
    }

    #[test]
    fn enabling_starts_a_period_immediately() {
        let mut sched = MistScheduler::new();
        sched.advance(0, params(false, 2_000, 10_000));
        let (phase, new_period) = sched.advance(4_321, params(true, 2_000, 10_000));
        assert_eq!(phase, MistPhase::Bursting);
        assert!(new_period);
        assert_eq!(sched.next_boundary(), Some(14_321));
    }

    #[test]
    fn disabling_mid_burst_resets_the_cycle() {
        let mut sched = MistScheduler::new();
        let on = params(true, 2_000, 10_000);
        sched.advance(0, on);
        assert_eq!(sched.advance(1_000, params(false, 2_000, 10_000)).0, MistPhase::Idle);
        // Re-enabling later starts a fresh period at that moment.
        assert_eq!(sched.advance(5_000, on).0, MistPhase::Bursting);
        assert_eq!(sched.next_boundary(), Some(15_000));
    }

    // -- Mid-cycle edits --------------------------------------------------

    #[test]
    fn duration_change_mid_burst_applies_next_period() {
        let mut sched = MistScheduler::new();
        sched.advance(0, params(true, 2_000, 10_000));
        // Shortened to 1 s while the 2 s burst is running: burst continues.
        let shorter = params(true, 1_000, 10_000);
        assert_eq!(sched.advance(1_500, shorter).0, MistPhase::Bursting);
        assert_eq!(sched.advance(2_000, shorter).0, MistPhase::Idle);
        // Next period uses the new duration.
        assert_eq!(sched.advance(10_000, shorter).0, MistPhase::Bursting);
        assert_eq!(sched.advance(11_000, shorter).0, MistPhase::Idle);
    }

    #[test]
    fn lengthened_duration_does_not_extend_current_burst() {
        let mut sched = MistScheduler::new();
        sched.advance(0, params(true, 2_000, 10_000));
        let longer = params(true, 5_000, 10_000);
        assert_eq!(sched.advance(3_000, longer).0, MistPhase::Idle);
        assert_eq!(sched.advance(14_999, longer).0, MistPhase::Bursting);
    }

    #[test]
    fn interval_change_mid_cycle_applies_next_period() {
        let mut sched = MistScheduler::new();
        sched.advance(0, params(true, 2_000, 10_000));
        let faster = params(true, 2_000, 4_000);
        // Current period still ends at 10 s.
        assert_eq!(sched.advance(4_000, faster).0, MistPhase::Idle);
        assert_eq!(sched.advance(10_000, faster).0, MistPhase::Bursting);
        // The period that began at 10 s is 4 s long.
        assert_eq!(sched.next_boundary(), Some(14_000));
        assert_eq!(sched.advance(14_000, faster).0, MistPhase::Bursting);
    }

    // -- Timing edge cases ------------------------------------------------

    #[test]
    fn slightly_late_tick_keeps_the_grid() {
        let mut sched = MistScheduler::new();
        let p = params(true, 2_000, 10_000);
        sched.advance(0, p);
        assert_eq!(sched.advance(10_150, p).0, MistPhase::Bursting);
        assert_eq!(sched.next_boundary(), Some(20_000));
    }

    #[test]
    fn very_late_tick_reanchors() {
        let mut sched = MistScheduler::new();
        let p = params(true, 2_000, 10_000);
        sched.advance(0, p);
        // Loop stalled for 25 s: burst now, next period counted from here.
        assert_eq!(sched.advance(25_000, p).0, MistPhase::Bursting);
        assert_eq!(sched.next_boundary(), Some(35_000));
    }

    #[test]
    fn duration_equal_to_interval_is_continuous() {
        let mut sched = MistScheduler::new();
        let p = params(true, 5_000, 5_000);
        for (t, phase) in timeline(&mut sched, p, 20_000, 250) {
            assert_eq!(phase, MistPhase::Bursting, "t={t}");
        }
    }

    #[cfg(not(feature = "gpio"))]
    mod with_relays {
        use super::super::*;
        use crate::field::{Field, Value};
        use crate::store::{FieldStore, Params};

        fn setup() -> (MistScheduler, FieldStore, RelayBoard) {
            let mut store = FieldStore::new(Params::default());
            store.set(Field::MistDuration, Value::Millis(2_000)).unwrap();
            store.set(Field::MistInterval, Value::Millis(10_000)).unwrap();
            (
                MistScheduler::new(),
                store,
                RelayBoard::new(17, 27, true).unwrap(),
            )
        }

        #[test]
        fn evaluate_reports_edges_and_drives_relay() {
            let (mut sched, mut store, mut relays) = setup();
            assert_eq!(sched.evaluate(0, &mut store, &mut relays), None);

            store.set(Field::MistStatus, Value::Bool(true)).unwrap();
            assert_eq!(
                sched.evaluate(0, &mut store, &mut relays),
                Some(MistEvent::BurstStarted { at_ms: 0 })
            );
            assert!(relays.is_on(Relay::Mister));
            assert!(store.misters_on());

            assert_eq!(sched.evaluate(1_000, &mut store, &mut relays), None);
            assert_eq!(
                sched.evaluate(2_000, &mut store, &mut relays),
                Some(MistEvent::BurstEnded)
            );
            assert!(!relays.is_on(Relay::Mister));
        }

        #[test]
        fn evaluate_suspends_mid_burst() {
            let (mut sched, mut store, mut relays) = setup();
            store.set(Field::MistStatus, Value::Bool(true)).unwrap();
            sched.evaluate(0, &mut store, &mut relays);

            store.set(Field::MistStatus, Value::Bool(false)).unwrap();
            assert_eq!(
                sched.evaluate(500, &mut store, &mut relays),
                Some(MistEvent::Suspended)
            );
            assert!(!relays.is_on(Relay::Mister));
            assert_eq!(sched.next_boundary(), None);
        }

        #[test]
        fn continuous_misting_never_blips_the_relay() {
            let (mut sched, mut store, mut relays) = setup();
            store.set(Field::MistInterval, Value::Millis(2_000)).unwrap();
            store.set(Field::MistStatus, Value::Bool(true)).unwrap();
            for t in (0..10_000).step_by(100) {
                sched.evaluate(t, &mut store, &mut relays);
            }
            assert_eq!(relays.switches, 1);
        }
    }
}
