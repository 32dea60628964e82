mod alert;
mod config;
mod mqtt;
mod state;
mod web;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Settings;
use mqtt::parse_record;
use state::{MonitorState, SharedState};
use web::WebState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let settings = Settings::from_lookup(|key| env::var(key).ok())?;

    // ── Shared state (ephemeral, for the web API) ───────────────────
    let shared = MonitorState::shared();
    shared
        .write()
        .await
        .record_system("monitor started".to_string());

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new(
        settings.client_id.clone(),
        settings.mqtt_host.clone(),
        settings.mqtt_port,
    );
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    if !settings.mqtt_username.is_empty() {
        mqttoptions.set_credentials(
            settings.mqtt_username.clone(),
            settings.mqtt_password.clone(),
        );
    }
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    // ── Web server ──────────────────────────────────────────────────
    let web_state = WebState {
        shared: SharedState::clone(&shared),
        client: client.clone(),
        command_topic: settings.command_topic.clone(),
    };
    let web_port = settings.web_port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state, web_port).await {
            tracing::error!("{e:#}");
        }
    });

    // ── Reservoir alert ─────────────────────────────────────────────
    tokio::spawn(alert::run(SharedState::clone(&shared), settings.alert_interval));

    info!(
        broker = %format_args!("{}:{}", settings.mqtt_host, settings.mqtt_port),
        telemetry = %settings.telemetry_topic,
        "monitor running"
    );

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if p.topic != settings.telemetry_topic {
                    debug!(topic = %p.topic, "unhandled topic");
                    continue;
                }
                match parse_record(&p.payload) {
                    Ok(record) => {
                        debug!(?record, "telemetry");
                        shared.write().await.record_telemetry(record);
                    }
                    Err(msg) => {
                        warn!("bad telemetry: {msg}");
                        shared
                            .write()
                            .await
                            .record_error(format!("bad telemetry: {msg}"));
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                // The request channel is drained by this same loop, so a
                // blocking subscribe here could never complete.
                if let Err(e) = client.try_subscribe(&settings.telemetry_topic, QoS::AtMostOnce) {
                    warn!("subscribe failed: {e}");
                }
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("mqtt error: {e}. reconnecting...");
                {
                    let mut st = shared.write().await;
                    if st.mqtt_connected {
                        st.record_error(format!("mqtt error: {e}"));
                    }
                    st.mqtt_connected = false;
                }
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
