//! TOML config file loading and validation: boot defaults for every
//! writable field plus the hardware, web and MQTT settings.

use aero_pressure::adc::MAX_CHANNEL;
use aero_pressure::Calibration;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::sensor::SamplingConfig;
use crate::store::Params;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Boot values, keyed by wire name (`MistDuration = 2000`, ...).
    pub fields: Params,
    pub pressure: PressureConfig,
    pub relays: RelayConfig,
    pub web: WebConfig,
    pub mqtt: MqttConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub sample_interval_ms: u32,
    pub stale_after_missed: u32,
    pub i2c_address: u16,
    pub adc_channel: usize,
    pub calibration: Calibration,
    /// Simulator scenario for builds without the ADC: steady, leaky,
    /// flaky or dead.
    pub sim_scenario: String,
}

impl Default for PressureConfig {
    fn default() -> Self {
        let sampling = SamplingConfig::default();
        Self {
            sample_interval_ms: sampling.sample_interval_ms,
            stale_after_missed: sampling.stale_after_missed,
            i2c_address: 0x48,
            adc_channel: 0,
            calibration: Calibration::default(),
            sim_scenario: "steady".to_string(),
        }
    }
}

impl PressureConfig {
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            sample_interval_ms: self.sample_interval_ms,
            stale_after_missed: self.stale_after_missed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub pump_gpio: u8,
    pub mister_gpio: u8,
    /// Many common relay boards are active-low. If yours is active-high,
    /// set false.
    pub active_low: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pump_gpio: 17,
            mister_gpio: 27,
            active_low: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "aero-controller".to_string(),
            topic_prefix: "aero".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Control loop period. Sampling runs on its own interval.
    pub tick_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[u8] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// 7-bit addresses the ADS1115 can be strapped to.
const ADS1115_ADDRESSES: &[u16] = &[0x48, 0x49, 0x4A, 0x4B];

const SIM_SCENARIOS: &[&str] = &["steady", "leaky", "flaky", "dead"];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every section. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        errors.extend(self.fields.violations().into_iter().map(|e| format!("fields: {e}")));
        self.validate_pressure(&mut errors);
        self.validate_relays(&mut errors);
        self.validate_network(&mut errors);

        if self.control.tick_ms == 0 {
            errors.push("control: tick_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_pressure(&self, errors: &mut Vec<String>) {
        let p = &self.pressure;

        if p.sample_interval_ms == 0 {
            errors.push("pressure: sample_interval_ms must be positive".to_string());
        }
        if p.stale_after_missed == 0 {
            errors.push("pressure: stale_after_missed must be at least 1".to_string());
        }

        // ── ADC wiring ──────────────────────────────────────
        if !ADS1115_ADDRESSES.contains(&p.i2c_address) {
            errors.push(format!(
                "pressure: i2c_address {:#04x} is not an ADS1115 address (0x48-0x4b)",
                p.i2c_address
            ));
        }
        if p.adc_channel > MAX_CHANNEL {
            errors.push(format!(
                "pressure: adc_channel {} out of range [0, {MAX_CHANNEL}]",
                p.adc_channel
            ));
        }

        if let Err(e) = p.calibration.validate() {
            errors.push(format!("pressure.calibration: {e}"));
        }

        if !SIM_SCENARIOS.contains(&p.sim_scenario.as_str()) {
            errors.push(format!(
                "pressure: sim_scenario '{}' unknown (expected one of {})",
                p.sim_scenario,
                SIM_SCENARIOS.join(", ")
            ));
        }
    }

    fn validate_relays(&self, errors: &mut Vec<String>) {
        let r = &self.relays;
        for (name, pin) in [("pump_gpio", r.pump_gpio), ("mister_gpio", r.mister_gpio)] {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "relays: {name} {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            }
        }
        if r.pump_gpio == r.mister_gpio {
            errors.push(format!(
                "relays: pump_gpio and mister_gpio are both {}",
                r.pump_gpio
            ));
        }
    }

    fn validate_network(&self, errors: &mut Vec<String>) {
        if self.web.port == 0 {
            errors.push("web: port must be non-zero".to_string());
        }

        let m = &self.mqtt;
        if m.enabled {
            if m.host.trim().is_empty() {
                errors.push("mqtt: host is empty".to_string());
            }
            if m.port == 0 {
                errors.push("mqtt: port must be non-zero".to_string());
            }
            if m.client_id.trim().is_empty() {
                errors.push("mqtt: client_id is empty".to_string());
            }
        }
    }

    /// Deployment overrides: `WEB_PORT`, `MQTT_HOST`, `MQTT_PORT`,
    /// `RELAY_ACTIVE_LOW`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("WEB_PORT") {
            self.web.port = v
                .parse()
                .with_context(|| format!("WEB_PORT is not a port: {v:?}"))?;
        }
        if let Some(v) = var("MQTT_HOST") {
            self.mqtt.host = v;
        }
        if let Some(v) = var("MQTT_PORT") {
            self.mqtt.port = v
                .parse()
                .with_context(|| format!("MQTT_PORT is not a port: {v:?}"))?;
        }
        if let Some(v) = var("RELAY_ACTIVE_LOW") {
            self.relays.active_low = v == "1" || v.eq_ignore_ascii_case("true");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file yields the
/// defaults; environment overrides are applied before validation.
pub fn load(path: &str) -> Result<Config> {
    let mut config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::warn!(path, "config file not found, using defaults");
        Config::default()
    };

    config.apply_env()?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
