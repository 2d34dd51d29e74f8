//! The controller owns the field store, both control loops and the
//! hardware. The web layer and the tick loop share it behind one mutex, so
//! every API call and every tick is a single critical section.

use aero_pressure::PressureSource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::error::{ControlError, FieldError};
use crate::events::{EventKind, EventLog, SystemEvent};
use crate::field::{encode, Field, Value};
use crate::mist::{MistEvent, MistPhase, MistScheduler};
use crate::pump::{PumpController, PumpState};
use crate::relay::RelayBoard;
use crate::sensor::{PressureAdapter, SampleOutcome, SamplingConfig};
use crate::store::{FieldStore, Params};
use crate::telemetry::Telemetry;

pub type SharedController = Arc<Mutex<Controller>>;

/// Actuators and the pressure source, owned by the controller and lent to
/// each evaluation.
pub struct Hardware {
    pub relays: RelayBoard,
    pub sensor: Box<dyn PressureSource>,
}

pub struct Controller {
    store: FieldStore,
    pump: PumpController,
    mist: MistScheduler,
    sampler: PressureAdapter,
    hw: Hardware,
    events: EventLog,
    outbox: Vec<Telemetry>,
    started_at: Instant,
    mqtt_connected: bool,
    /// Latched while MinPSI >= MaxPSI is observed, so the fault is reported
    /// once rather than every tick.
    invariant_fault: bool,
}

// ---------------------------------------------------------------------------
// JSON response (what /api/status returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    /// Every field by wire name; `null` where there is no value yet.
    pub fields: BTreeMap<&'static str, Option<String>>,
    pub pump: PumpState,
    pub mist_phase: MistPhase,
    /// Milliseconds until the next burst, while misting is enabled.
    pub next_mist_in_ms: Option<u64>,
    pub missed_samples: u32,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & control loop
// ---------------------------------------------------------------------------

impl Controller {
    pub fn new(params: Params, sampling: SamplingConfig, mut hw: Hardware) -> Self {
        hw.relays.all_off();
        let mut events = EventLog::new();
        events.push(EventKind::System, "controller started");

        Self {
            store: FieldStore::new(params),
            pump: PumpController::new(),
            mist: MistScheduler::new(),
            sampler: PressureAdapter::new(sampling),
            hw,
            events,
            outbox: Vec::new(),
            started_at: Instant::now(),
            mqtt_connected: false,
            invariant_fault: false,
        }
    }

    /// Milliseconds since the controller was built. The clock for `tick`
    /// and `set_value`.
    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// One pass of the control loop: sample pressure if due, then the pump,
    /// then the misting cycle.
    pub fn tick(&mut self, now_ms: u64) {
        self.hw
            .sensor
            .observe_actuators(self.store.pump_on(), self.store.misters_on());
        self.sample(now_ms);
        self.evaluate_pump();
        self.evaluate_mist(now_ms);
    }

    fn sample(&mut self, now_ms: u64) {
        let was_stale = self.store.pressure_stale();
        let Some(outcome) = self
            .sampler
            .poll(now_ms, self.hw.sensor.as_mut(), &mut self.store)
        else {
            return;
        };

        match outcome {
            SampleOutcome::Fresh(psi) => {
                self.outbox.push(Telemetry::Pressure(psi));
                if was_stale {
                    tracing::info!(psi, "pressure sensor recovered");
                    self.events
                        .push(EventKind::Sensor, format!("pressure sensor recovered at {psi:.1} PSI"));
                }
            }
            SampleOutcome::Missed { missed, stale, error } => {
                if stale && !was_stale {
                    let fault = ControlError::SensorFault { missed };
                    tracing::error!(missed, "{fault}");
                    self.events
                        .push(EventKind::Error, format!("{fault}: {error}"));
                }
            }
        }
    }

    fn evaluate_pump(&mut self) {
        let was_on = self.store.pump_on();
        let result = self.pump.evaluate(&mut self.store, &mut self.hw.relays);

        let on = self.store.pump_on();
        if on != was_on {
            let psi = self
                .store
                .pressure()
                .map_or_else(|| "n/a".to_string(), |p| format!("{p:.1}"));
            let mode = if self.store.params().pump_override {
                "manual"
            } else {
                "auto"
            };
            tracing::info!(on, %psi, mode, "pump switched");
            self.events.push(
                EventKind::Pump,
                format!("pump {} ({mode}, {psi} PSI)", if on { "ON" } else { "OFF" }),
            );
            self.outbox.push(Telemetry::Pump(on));
        }

        match result {
            Ok(_) => self.invariant_fault = false,
            Err(e) => {
                if !self.invariant_fault {
                    tracing::error!("{e}");
                    self.events.push(EventKind::Error, e.to_string());
                }
                self.invariant_fault = true;
            }
        }
    }

    fn evaluate_mist(&mut self, now_ms: u64) {
        let was_on = self.store.misters_on();
        let event = self
            .mist
            .evaluate(now_ms, &mut self.store, &mut self.hw.relays);

        let on = self.store.misters_on();
        if on != was_on {
            self.outbox.push(Telemetry::Misters(on));
        }

        match event {
            Some(MistEvent::BurstStarted { at_ms }) => {
                let p = self.store.params();
                tracing::info!(
                    at_ms,
                    duration_ms = p.mist_duration_ms,
                    interval_ms = p.mist_interval_ms,
                    "mist burst started"
                );
                if on != was_on {
                    self.events.push(
                        EventKind::Mister,
                        format!("misters ON for {} ms", p.mist_duration_ms),
                    );
                }
                self.outbox.push(Telemetry::LastMistTime(
                    OffsetDateTime::now_utc().unix_timestamp(),
                ));
            }
            Some(MistEvent::BurstEnded) => {
                tracing::info!(now_ms, "mist burst ended");
                self.events.push(EventKind::Mister, "misters OFF");
            }
            Some(MistEvent::Suspended) => {
                tracing::info!(now_ms, "misting suspended mid-burst");
                self.events
                    .push(EventKind::Mister, "misters OFF (misting disabled)");
            }
            None => {}
        }
    }

    /// Fail-safe for process exit: both relays off.
    pub fn shutdown(&mut self) {
        self.hw.relays.all_off();
        self.store.set_pump_on(false);
        self.store.set_misters_on(false);
        self.events.push(EventKind::System, "controller stopped, relays off");
        tracing::info!("relays off");
    }
}

// ---------------------------------------------------------------------------
// Field access API
// ---------------------------------------------------------------------------

impl Controller {
    pub fn get_value(&self, name: &str) -> Result<String, FieldError> {
        let field: Field = name.parse()?;
        let value = self.store.get(field)?;
        Ok(encode(field, value))
    }

    pub fn set_value(&mut self, name: &str, text: &str) -> Result<(), FieldError> {
        let now = self.uptime_ms();
        self.set_value_at(name, text, now)
    }

    /// Parse, validate and commit a write, then re-evaluate whichever
    /// controller depends on the field before returning.
    pub fn set_value_at(&mut self, name: &str, text: &str, now_ms: u64) -> Result<(), FieldError> {
        let field: Field = name.parse()?;
        let value = Value::parse(field, text)?;

        let changed = match self.store.set(field, value) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(field = %field, value = %text, "write rejected: {e}");
                return Err(e);
            }
        };

        if changed {
            tracing::info!(field = %field, %value, "field updated");
            self.events
                .push(EventKind::System, format!("{field} set to {value}"));
        }

        match field {
            Field::MistStatus | Field::MistDuration | Field::MistInterval => {
                self.evaluate_mist(now_ms)
            }
            _ => self.evaluate_pump(),
        }
        Ok(())
    }

    pub fn record(&mut self, kind: EventKind, detail: impl Into<String>) {
        self.events.push(kind, detail);
    }

    pub fn mqtt_connected(&self) -> bool {
        self.mqtt_connected
    }

    pub fn set_mqtt_connected(&mut self, connected: bool) {
        self.mqtt_connected = connected;
    }

    /// Take everything queued for MQTT since the last drain.
    pub fn drain_telemetry(&mut self) -> Vec<Telemetry> {
        std::mem::take(&mut self.outbox)
    }

    pub fn status(&self) -> StatusResponse {
        let now = self.uptime_ms();
        let fields = Field::ALL
            .iter()
            .map(|&f| (f.name(), self.store.get(f).ok().map(|v| encode(f, v))))
            .collect();

        StatusResponse {
            uptime_secs: now / 1000,
            mqtt_connected: self.mqtt_connected,
            fields,
            pump: self.pump.state(),
            mist_phase: self.mist.phase(now),
            next_mist_in_ms: self.mist.next_boundary().map(|b| b.saturating_sub(now)),
            missed_samples: self.sampler.missed(),
            events: self.events.recent(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;
    use crate::relay::Relay;
    use crate::testutil::{controller, ScriptedSource};

    fn ctl(psi: f32) -> Controller {
        controller(Params::default(), ScriptedSource::constant(psi))
    }

    // -- Field API: reads and writes ---------------------------------------

    #[test]
    fn set_then_get_round_trips() {
        let mut c = ctl(90.0);
        for (name, text) in [
            ("MistDuration", "2000"),
            ("MistInterval", "10000"),
            ("MinPSI", "72.5"),
            ("MaxPSI", "110"),
            ("MistStatus", "1"),
            ("PumpOverride", "1"),
            ("PumpStatus", "1"),
        ] {
            c.set_value_at(name, text, 0).unwrap();
            assert_eq!(c.get_value(name).unwrap(), text, "{name}");
        }
    }

    #[test]
    fn long_mist_interval_round_trips() {
        let mut c = ctl(90.0);
        c.set_value_at("MistInterval", "3600000", 0).unwrap();
        assert_eq!(c.get_value("MistInterval").unwrap(), "3600000");
    }

    #[test]
    fn defaults_read_back() {
        let c = ctl(90.0);
        assert_eq!(c.get_value("MistStatus").unwrap(), "0");
        assert_eq!(c.get_value("MinPSI").unwrap(), "80");
        assert_eq!(c.get_value("MaxPSI").unwrap(), "100");
        assert_eq!(c.get_value("PumpStatus").unwrap(), "0");
    }

    #[test]
    fn unknown_field_is_not_found() {
        let mut c = ctl(90.0);
        assert_eq!(
            c.get_value("Flow").unwrap_err(),
            FieldError::NotFound("Flow".into())
        );
        assert_eq!(
            c.set_value_at("Flow", "1", 0).unwrap_err(),
            FieldError::NotFound("Flow".into())
        );
    }

    #[test]
    fn out_of_range_is_rejected_and_unchanged() {
        let mut c = ctl(90.0);
        let err = c.set_value_at("MistDuration", "60000", 0).unwrap_err();
        assert!(matches!(err, FieldError::Validation(_)));
        assert_eq!(c.get_value("MistDuration").unwrap(), "5000");
    }

    #[test]
    fn threshold_crossing_rejected_both_directions() {
        let mut c = ctl(90.0);
        assert!(c.set_value_at("MinPSI", "100", 0).is_err());
        assert!(c.set_value_at("MaxPSI", "80", 0).is_err());
        assert!(c.set_value_at("MaxPSI", "70", 0).is_err());
        assert_eq!(c.get_value("MinPSI").unwrap(), "80");
        assert_eq!(c.get_value("MaxPSI").unwrap(), "100");
    }

    #[test]
    fn garbage_text_is_validation_error() {
        let mut c = ctl(90.0);
        assert!(matches!(
            c.set_value_at("MinPSI", "high", 0).unwrap_err(),
            FieldError::Validation(_)
        ));
    }

    #[test]
    fn readbacks_reject_writes() {
        let mut c = ctl(90.0);
        assert!(c.set_value_at("Pressure", "50", 0).is_err());
        assert!(c.set_value_at("MistersOn", "1", 0).is_err());
    }

    // -- Pressure ---------------------------------------------------------

    #[test]
    fn pressure_unavailable_until_first_sample() {
        let mut c = ctl(85.04);
        assert_eq!(
            c.get_value("Pressure").unwrap_err(),
            FieldError::Unavailable(Field::Pressure)
        );
        c.tick(0);
        assert_eq!(c.get_value("Pressure").unwrap(), "85.0");
    }

    #[test]
    fn sensor_failures_go_stale_and_keep_last_value() {
        let src = ScriptedSource::new([Ok(90.0), Err("bus"), Err("bus"), Err("bus")]);
        let mut c = controller(Params::default(), src);
        for t in 0..4 {
            c.tick(t * 1_000);
        }
        assert_eq!(c.get_value("PressureStale").unwrap(), "1");
        assert_eq!(c.get_value("Pressure").unwrap(), "90.0");
        let faults = c
            .status()
            .events
            .into_iter()
            .filter(|e| e.kind == EventKind::Error)
            .count();
        assert_eq!(faults, 1);
    }

    // -- Pump -------------------------------------------------------------

    #[test]
    fn low_pressure_starts_pump_on_tick() {
        let mut c = ctl(70.0);
        c.tick(0);
        assert_eq!(c.get_value("PumpStatus").unwrap(), "1");
        assert!(c.hw.relays.is_on(Relay::Pump));
        let out = c.drain_telemetry();
        assert!(out.contains(&Telemetry::Pressure(70.0)));
        assert!(out.contains(&Telemetry::Pump(true)));
        assert!(c.drain_telemetry().is_empty());
    }

    #[test]
    fn pump_stays_off_without_a_reading() {
        let mut c = controller(Params::default(), ScriptedSource::new([]));
        c.tick(0);
        assert_eq!(c.get_value("PumpStatus").unwrap(), "0");
    }

    #[test]
    fn threshold_write_reevaluates_immediately() {
        let mut c = ctl(85.0);
        c.tick(0);
        assert_eq!(c.get_value("PumpStatus").unwrap(), "0");
        c.set_value_at("MinPSI", "90", 10).unwrap();
        assert_eq!(c.get_value("PumpStatus").unwrap(), "1");
        assert!(c.hw.relays.is_on(Relay::Pump));
    }

    #[test]
    fn pump_status_write_needs_override() {
        let mut c = ctl(70.0);
        c.tick(0);
        let err = c.set_value_at("PumpStatus", "0", 10).unwrap_err();
        assert!(matches!(err, FieldError::Validation(_)));
        assert_eq!(c.get_value("PumpStatus").unwrap(), "1");
    }

    #[test]
    fn override_holds_then_follows_manual() {
        let mut c = ctl(70.0);
        c.tick(0);
        c.set_value_at("PumpOverride", "1", 10).unwrap();
        assert_eq!(c.get_value("PumpStatus").unwrap(), "1");

        c.set_value_at("PumpStatus", "0", 20).unwrap();
        assert!(!c.hw.relays.is_on(Relay::Pump));
        // Low pressure no longer starts it.
        c.tick(1_000);
        assert_eq!(c.get_value("PumpStatus").unwrap(), "0");

        c.set_value_at("PumpOverride", "0", 1_100).unwrap();
        assert_eq!(c.get_value("PumpStatus").unwrap(), "1");
    }

    fn error_events(c: &Controller) -> usize {
        c.status()
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Error)
            .count()
    }

    #[test]
    fn inverted_thresholds_force_manual_pump_off_and_report_once() {
        let mut c = ctl(95.0);
        c.set_value_at("PumpOverride", "1", 0).unwrap();
        c.set_value_at("PumpStatus", "1", 0).unwrap();
        assert!(c.hw.relays.is_on(Relay::Pump));

        let inverted = Params {
            min_psi: 100.0,
            max_psi: 90.0,
            pump_override: true,
            ..Params::default()
        };
        c.store.force_params(inverted);
        for t in [0, 100, 200] {
            c.tick(t);
        }
        assert_eq!(c.get_value("PumpStatus").unwrap(), "0");
        assert!(!c.hw.relays.is_on(Relay::Pump));
        assert_eq!(error_events(&c), 1);

        // Once the ordering is sane again the latch re-arms.
        c.store.force_params(Params {
            pump_override: true,
            ..Params::default()
        });
        c.tick(300);
        assert_eq!(c.get_value("PumpStatus").unwrap(), "1");
        c.store.force_params(inverted);
        c.tick(400);
        assert_eq!(error_events(&c), 2);
    }

    // -- Misting ----------------------------------------------------------

    fn misting(c: &mut Controller) {
        c.set_value_at("MistDuration", "2000", 0).unwrap();
        c.set_value_at("MistInterval", "10000", 0).unwrap();
        c.set_value_at("MistStatus", "1", 0).unwrap();
    }

    #[test]
    fn mist_cycle_follows_duty() {
        let mut c = ctl(90.0);
        misting(&mut c);
        assert_eq!(c.get_value("MistersOn").unwrap(), "1");
        c.tick(1_999);
        assert!(c.hw.relays.is_on(Relay::Mister));
        c.tick(2_000);
        assert!(!c.hw.relays.is_on(Relay::Mister));
        c.tick(10_000);
        assert!(c.hw.relays.is_on(Relay::Mister));
        c.tick(12_000);
        assert!(!c.hw.relays.is_on(Relay::Mister));
    }

    #[test]
    fn disabling_mid_burst_stops_misters_at_once() {
        let mut c = ctl(90.0);
        misting(&mut c);
        c.set_value_at("MistStatus", "0", 500).unwrap();
        assert!(!c.hw.relays.is_on(Relay::Mister));
        assert_eq!(c.get_value("MistersOn").unwrap(), "0");
        c.tick(10_000);
        assert!(!c.hw.relays.is_on(Relay::Mister));
    }

    #[test]
    fn burst_start_queues_last_mist_time() {
        let mut c = ctl(90.0);
        misting(&mut c);
        let out = c.drain_telemetry();
        assert!(out.contains(&Telemetry::Misters(true)));
        assert!(out
            .iter()
            .any(|t| matches!(t, Telemetry::LastMistTime(secs) if *secs > 0)));
    }

    // -- Status & shutdown ------------------------------------------------

    #[test]
    fn status_lists_every_field() {
        let mut c = ctl(88.0);
        c.tick(0);
        let st = c.status();
        assert_eq!(st.fields.len(), Field::ALL.len());
        assert_eq!(st.fields["Pressure"].as_deref(), Some("88.0"));
        assert_eq!(st.pump, PumpState::Off);
        assert_eq!(st.next_mist_in_ms, None);
    }

    #[test]
    fn status_pressure_is_null_before_sampling() {
        let st = ctl(88.0).status();
        assert_eq!(st.fields["Pressure"], None);
    }

    #[test]
    fn shutdown_turns_everything_off() {
        let mut c = ctl(70.0);
        misting(&mut c);
        c.tick(0);
        assert!(c.hw.relays.is_on(Relay::Pump));
        c.shutdown();
        assert!(!c.hw.relays.is_on(Relay::Pump));
        assert!(!c.hw.relays.is_on(Relay::Mister));
        assert_eq!(c.get_value("PumpStatus").unwrap(), "0");
    }
}
