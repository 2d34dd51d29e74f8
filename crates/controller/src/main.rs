mod config;
mod controller;
mod error;
mod events;
mod field;
mod mist;
mod pump;
mod relay;
mod sensor;
mod store;
mod telemetry;
mod web;

#[cfg(test)]
mod testutil;

use aero_pressure::PressureSource;
use anyhow::Result;
use std::{env, sync::Arc, time::Duration};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::PressureConfig;
use controller::{Controller, Hardware};
use relay::RelayBoard;
use telemetry::Telemetry;

#[cfg(not(any(feature = "adc", feature = "sim")))]
compile_error!("enable the `adc` feature for a real transducer or `sim` for development");

/// Telemetry messages buffered between the control loop and the MQTT task.
const TELEMETRY_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    tracing::info!(
        path = %config_path,
        tick_ms = cfg.control.tick_ms,
        sample_interval_ms = cfg.pressure.sample_interval_ms,
        mqtt = cfg.mqtt.enabled,
        "config loaded"
    );

    // ── Hardware ────────────────────────────────────────────────────
    let relays = RelayBoard::new(
        cfg.relays.pump_gpio,
        cfg.relays.mister_gpio,
        cfg.relays.active_low,
    )?;
    let sensor = build_sensor(&cfg.pressure)?;

    let controller = Controller::new(cfg.fields, cfg.pressure.sampling(), Hardware { relays, sensor });
    let shared = Arc::new(Mutex::new(controller));

    // ── Web server ──────────────────────────────────────────────────
    let web_state = Arc::clone(&shared);
    let web_port = cfg.web.port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state, web_port).await {
            tracing::error!("{e:#}");
        }
    });

    // ── MQTT telemetry (optional) ───────────────────────────────────
    let telemetry_tx = if cfg.mqtt.enabled {
        let (tx, rx) = mpsc::channel::<Telemetry>(TELEMETRY_QUEUE);
        tokio::spawn(telemetry::run(cfg.mqtt.clone(), rx, Arc::clone(&shared)));
        Some(tx)
    } else {
        None
    };

    // ── Control loop ────────────────────────────────────────────────
    let mut ticker = interval(Duration::from_millis(cfg.control.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outbox = {
                    let mut ctl = shared.lock().await;
                    let now = ctl.uptime_ms();
                    ctl.tick(now);
                    ctl.drain_telemetry()
                };
                if let Some(tx) = &telemetry_tx {
                    forward_telemetry(tx, outbox);
                }
            }
            res = &mut shutdown => {
                if let Err(e) = res {
                    tracing::error!("failed to listen for ctrl-c: {e}");
                }
                tracing::info!("shutdown requested");
                shared.lock().await.shutdown();
                return Ok(());
            }
        }
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Never blocks the loop: a full queue drops the message.
fn forward_telemetry(tx: &mpsc::Sender<Telemetry>, outbox: Vec<Telemetry>) {
    for msg in outbox {
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(?msg, "telemetry queue full, dropping");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("telemetry task gone, dropping");
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pressure source
// ---------------------------------------------------------------------------

#[cfg(feature = "adc")]
fn build_sensor(cfg: &PressureConfig) -> Result<Box<dyn PressureSource>> {
    use aero_pressure::adc::Ads1115Transducer;

    let adc = Ads1115Transducer::new(cfg.i2c_address, cfg.adc_channel, cfg.calibration)?;
    tracing::info!(
        address = cfg.i2c_address,
        channel = cfg.adc_channel,
        "ADS1115 pressure transducer ready"
    );
    Ok(Box::new(adc))
}

#[cfg(all(feature = "sim", not(feature = "adc")))]
fn build_sensor(cfg: &PressureConfig) -> Result<Box<dyn PressureSource>> {
    use aero_pressure::sim::{PressureSim, Scenario};

    let scenario = Scenario::from_str_lossy(&cfg.sim_scenario);
    tracing::info!(%scenario, "using simulated pressure source");
    Ok(Box::new(PressureSim::new(
        scenario,
        0.0,
        f64::from(cfg.calibration.full_scale_psi),
    )))
}

// ===========================================================================
// Tests
// ===========================================================================
