//! MQTT session: outbound telemetry and inbound threshold commands.
//!
//! The event loop runs in its own task.  It never touches control state;
//! command payloads go into the mailbox and the control loop picks them up
//! on its next pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::remote::CommandSender;
use crate::telemetry::{Delivery, TelemetrySink};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REQUEST_CAPACITY: usize = 10;

pub fn options(cfg: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_s));
    if !cfg.username.is_empty() {
        opts.set_credentials(&cfg.username, &cfg.password);
    }
    opts
}

// ---------------------------------------------------------------------------
// Telemetry publisher
// ---------------------------------------------------------------------------

/// Fire-and-forget publisher.  Records produced while the broker is
/// unreachable are dropped, never queued.
#[derive(Clone)]
pub struct TelemetryPublisher {
    client: AsyncClient,
    topic: String,
    connected: Arc<AtomicBool>,
}

impl TelemetryPublisher {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for TelemetryPublisher {
    fn publish(&mut self, payload: String) -> Delivery {
        if !self.is_connected() {
            debug!("telemetry dropped: broker not connected");
            return Delivery::Dropped;
        }
        match self
            .client
            .try_publish(&self.topic, QoS::AtMostOnce, false, payload)
        {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                debug!("telemetry dropped: {e}");
                Delivery::Dropped
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Event-loop side of the connection.
struct Session {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    command_topic: String,
    commands: CommandSender,
}

impl Session {
    fn handle(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                self.connected.store(true, Ordering::Relaxed);
                // Subscriptions do not survive a clean-session reconnect.
                match self
                    .client
                    .try_subscribe(&self.command_topic, QoS::AtLeastOnce)
                {
                    Ok(()) => info!(topic = %self.command_topic, "mqtt connected; subscribed"),
                    Err(e) => warn!(topic = %self.command_topic, "mqtt subscribe failed: {e}"),
                }
            }
            Event::Incoming(Packet::Publish(p)) => {
                if p.topic == self.command_topic {
                    debug!(bytes = p.payload.len(), "threshold command received");
                    self.commands.post(p.payload.to_vec());
                } else {
                    debug!(topic = %p.topic, "ignoring publish on unexpected topic");
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                self.connected.store(false, Ordering::Relaxed);
                warn!("mqtt disconnected by broker");
            }
            _ => {}
        }
    }
}

/// Start the MQTT event loop.  Returns the telemetry side and the task
/// handle; the task reconnects forever.
pub fn spawn(cfg: &MqttConfig, commands: CommandSender) -> (TelemetryPublisher, JoinHandle<()>) {
    let (client, eventloop) = AsyncClient::new(options(cfg), REQUEST_CAPACITY);
    let connected = Arc::new(AtomicBool::new(false));

    let publisher = TelemetryPublisher {
        client: client.clone(),
        topic: cfg.telemetry_topic.clone(),
        connected: Arc::clone(&connected),
    };
    let session = Session {
        client,
        connected,
        command_topic: cfg.command_topic.clone(),
        commands,
    };

    info!(
        broker = %format_args!("{}:{}", cfg.host, cfg.port),
        telemetry = %cfg.telemetry_topic,
        command = %cfg.command_topic,
        "mqtt session starting"
    );
    let handle = tokio::spawn(run(session, eventloop));
    (publisher, handle)
}

async fn run(session: Session, mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(event) => session.handle(event),
            Err(e) => {
                if session.connected.swap(false, Ordering::Relaxed) {
                    warn!("mqtt connection lost: {e}. reconnecting...");
                } else {
                    debug!("mqtt connect failed: {e}. retrying...");
                }
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mailbox;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};

    /// Client whose event loop is never polled; requests pile up in the
    /// bounded channel.  Keep the event loop alive for the whole test.
    fn test_client() -> (AsyncClient, EventLoop) {
        let opts = MqttOptions::new("test-controller", "127.0.0.1", 1883);
        AsyncClient::new(opts, REQUEST_CAPACITY)
    }

    fn publisher(connected: bool) -> (TelemetryPublisher, EventLoop) {
        let (client, el) = test_client();
        let p = TelemetryPublisher {
            client,
            topic: "smartgarden/data".into(),
            connected: Arc::new(AtomicBool::new(connected)),
        };
        (p, el)
    }

    // -- options --------------------------------------------------------------

    #[test]
    fn options_carry_broker_settings() {
        let cfg = MqttConfig::default();
        let opts = options(&cfg);
        assert_eq!(opts.broker_address(), ("127.0.0.1".to_string(), 1883));
        assert_eq!(opts.client_id(), "irrigation-controller");
        assert_eq!(opts.keep_alive(), Duration::from_secs(30));
        assert_eq!(opts.credentials(), None);
    }

    #[test]
    fn options_include_credentials_when_username_set() {
        let cfg = MqttConfig {
            username: "bed".into(),
            password: "pw".into(),
            ..MqttConfig::default()
        };
        assert_eq!(
            options(&cfg).credentials(),
            Some(("bed".to_string(), "pw".to_string()))
        );
    }

    // -- TelemetryPublisher ---------------------------------------------------

    #[tokio::test]
    async fn publish_while_disconnected_is_dropped() {
        let (mut p, _el) = publisher(false);
        assert_eq!(p.publish("42,21.0,50,1".into()), Delivery::Dropped);
    }

    #[tokio::test]
    async fn publish_while_connected_is_sent() {
        let (mut p, _el) = publisher(true);
        assert_eq!(p.publish("42,21.0,50,1".into()), Delivery::Sent);
    }

    #[tokio::test]
    async fn full_request_queue_drops_instead_of_blocking() {
        let (mut p, _el) = publisher(true);
        for _ in 0..REQUEST_CAPACITY {
            assert_eq!(p.publish("1,nan,nan,0".into()), Delivery::Sent);
        }
        assert_eq!(p.publish("1,nan,nan,0".into()), Delivery::Dropped);
    }

    // -- Session event handling -------------------------------------------------

    fn session() -> (Session, crate::remote::CommandInbox, EventLoop) {
        let (client, el) = test_client();
        let (tx, rx) = mailbox();
        let s = Session {
            client,
            connected: Arc::new(AtomicBool::new(false)),
            command_topic: "smartgarden/control".into(),
            commands: tx,
        };
        (s, rx, el)
    }

    #[tokio::test]
    async fn connack_marks_connected() {
        let (s, _rx, _el) = session();
        s.handle(Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        ))));
        assert!(s.connected.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn disconnect_marks_disconnected() {
        let (s, _rx, _el) = session();
        s.connected.store(true, Ordering::Relaxed);
        s.handle(Event::Incoming(Packet::Disconnect));
        assert!(!s.connected.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn command_publish_goes_to_mailbox() {
        let (s, mut rx, _el) = session();
        s.handle(Event::Incoming(Packet::Publish(Publish::new(
            "smartgarden/control",
            QoS::AtLeastOnce,
            "45",
        ))));
        assert_eq!(rx.take(), Some(b"45".to_vec()));
    }

    #[tokio::test]
    async fn publish_on_other_topic_is_ignored() {
        let (s, mut rx, _el) = session();
        s.handle(Event::Incoming(Packet::Publish(Publish::new(
            "smartgarden/data",
            QoS::AtMostOnce,
            "45,20.0,50,1",
        ))));
        assert_eq!(rx.take(), None);
    }

    #[tokio::test]
    async fn later_command_replaces_earlier_one() {
        let (s, mut rx, _el) = session();
        for payload in ["20", "60"] {
            s.handle(Event::Incoming(Packet::Publish(Publish::new(
                "smartgarden/control",
                QoS::AtLeastOnce,
                payload,
            ))));
        }
        assert_eq!(rx.take(), Some(b"60".to_vec()));
        assert_eq!(rx.take(), None);
    }
}
