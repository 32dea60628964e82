//! Environment configuration for the monitor.

use anyhow::{bail, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub client_id: String,
    pub telemetry_topic: String,
    pub command_topic: String,
    pub web_port: u16,
    pub alert_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            client_id: "irrigation-monitor".to_string(),
            telemetry_topic: "smartgarden/data".to_string(),
            command_topic: "smartgarden/control".to_string(),
            web_port: 8080,
            alert_interval: Duration::from_secs(60),
        }
    }
}

impl Settings {
    /// Build settings from `lookup` (`std::env::var` in production).  Every
    /// malformed variable is reported, not just the first.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        let mut errors: Vec<String> = Vec::new();

        if let Some(v) = lookup("MQTT_HOST") {
            s.mqtt_host = v;
        }
        if let Some(v) = lookup("MQTT_USERNAME") {
            s.mqtt_username = v;
        }
        if let Some(v) = lookup("MQTT_PASSWORD") {
            s.mqtt_password = v;
        }
        if let Some(v) = lookup("MQTT_CLIENT_ID") {
            s.client_id = v;
        }
        if let Some(v) = lookup("TELEMETRY_TOPIC") {
            s.telemetry_topic = v;
        }
        if let Some(v) = lookup("COMMAND_TOPIC") {
            s.command_topic = v;
        }
        parse_into(&lookup, "MQTT_PORT", &mut s.mqtt_port, &mut errors);
        parse_into(&lookup, "WEB_PORT", &mut s.web_port, &mut errors);

        let mut alert_s = s.alert_interval.as_secs();
        parse_into(&lookup, "ALERT_INTERVAL_S", &mut alert_s, &mut errors);
        s.alert_interval = Duration::from_secs(alert_s);

        s.validate(&mut errors);

        if errors.is_empty() {
            Ok(s)
        } else {
            bail!(
                "monitor config invalid ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.mqtt_host.trim().is_empty() {
            errors.push("MQTT_HOST is empty".to_string());
        }
        if self.client_id.trim().is_empty() {
            errors.push("MQTT_CLIENT_ID is empty".to_string());
        }
        for (name, topic) in [
            ("TELEMETRY_TOPIC", &self.telemetry_topic),
            ("COMMAND_TOPIC", &self.command_topic),
        ] {
            if topic.trim().is_empty() {
                errors.push(format!("{name} is empty"));
            } else if topic.contains(['+', '#']) {
                errors.push(format!("{name} '{topic}' must not contain wildcards"));
            }
        }
        if self.alert_interval.is_zero() {
            errors.push("ALERT_INTERVAL_S must be positive".to_string());
        }
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T, errors: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => errors.push(format!("{key}: cannot parse {raw:?}")),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
