//! Optional MQTT telemetry. The control loop never touches the client: it
//! drains the controller's outbox into a bounded channel, and this task
//! forwards whatever arrives to the broker.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::MqttConfig;
use crate::controller::SharedController;
use crate::events::EventKind;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    Pressure(f32),
    Pump(bool),
    Misters(bool),
    /// Unix seconds of the most recent burst start.
    LastMistTime(i64),
}

impl Telemetry {
    pub fn topic(&self, prefix: &str) -> String {
        let leaf = match self {
            Telemetry::Pressure(_) => "pressure",
            Telemetry::Pump(_) => "pump",
            Telemetry::Misters(_) => "mistersOn",
            Telemetry::LastMistTime(_) => "lastMistTime",
        };
        topic(prefix, leaf)
    }

    pub fn payload(&self) -> String {
        match self {
            Telemetry::Pressure(psi) => format!("{psi:.1}"),
            Telemetry::Pump(true) => "on".to_string(),
            Telemetry::Pump(false) => "off".to_string(),
            Telemetry::Misters(true) => "1".to_string(),
            Telemetry::Misters(false) => "0".to_string(),
            Telemetry::LastMistTime(secs) => secs.to_string(),
        }
    }

    /// Last-value topics are retained so a dashboard that subscribes late
    /// still sees the current state.
    pub fn retained(&self) -> bool {
        !matches!(self, Telemetry::Pressure(_))
    }
}

/// Join a prefix and a leaf, tolerating a trailing slash on the prefix.
pub(crate) fn topic(prefix: &str, leaf: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        leaf.to_string()
    } else {
        format!("{prefix}/{leaf}")
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Own the MQTT connection for the life of the process. Returns only if the
/// telemetry channel closes.
pub async fn run(cfg: MqttConfig, mut rx: mpsc::Receiver<Telemetry>, shared: SharedController) {
    let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    options.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(options, 20);
    let status_topic = topic(&cfg.topic_prefix, "status");

    let publisher = client.clone();
    let prefix = cfg.topic_prefix.clone();
    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let topic = msg.topic(&prefix);
            if let Err(e) = publisher
                .publish(topic.as_str(), QoS::AtLeastOnce, msg.retained(), msg.payload())
                .await
            {
                tracing::warn!(%topic, "mqtt publish failed: {e}");
            }
        }
    });

    tracing::info!(host = %cfg.host, port = cfg.port, "mqtt telemetry starting");

    loop {
        if forward.is_finished() {
            tracing::info!("telemetry channel closed, stopping mqtt");
            return;
        }

        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("mqtt connected");
                if let Err(e) =
                    client.try_publish(status_topic.as_str(), QoS::AtLeastOnce, true, "CONNECTED")
                {
                    tracing::warn!("mqtt status publish failed: {e}");
                }
                let mut ctl = shared.lock().await;
                ctl.set_mqtt_connected(true);
                ctl.record(EventKind::System, "mqtt connected");
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("mqtt disconnected");
                let mut ctl = shared.lock().await;
                ctl.set_mqtt_connected(false);
                ctl.record(EventKind::System, "mqtt disconnected");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("mqtt error: {e}. reconnecting...");
                {
                    let mut ctl = shared.lock().await;
                    if ctl.mqtt_connected() {
                        ctl.record(EventKind::Error, format!("mqtt error: {e}"));
                    }
                    ctl.set_mqtt_connected(false);
                }
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
