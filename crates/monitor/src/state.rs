use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::mqtt::Record;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<MonitorState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct MonitorState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub latest: Option<LatestRecord>,
    /// Last threshold this monitor asked for.  The controller never
    /// acknowledges, so this is a request, not the applied value.
    pub requested_threshold: Option<u8>,
    pub events: VecDeque<MonitorEvent>,
}

#[derive(Clone, Serialize)]
pub struct LatestRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(flatten)]
    pub record: Record,
}

#[derive(Clone, Serialize)]
pub struct MonitorEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Telemetry,
    Command,
    Alert,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub latest: Option<LatestRecord>,
    pub reservoir_empty: bool,
    pub requested_threshold: Option<u8>,
    pub events: Vec<MonitorEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl MonitorState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            latest: None,
            requested_threshold: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Record a telemetry record from the controller.
    pub(crate) fn record_telemetry(&mut self, record: Record) {
        let fmt = |v: Option<f32>| v.map_or_else(|| "--".to_string(), |v| format!("{v:.1}"));
        let detail = format!(
            "soil={}% temp={} hum={} water={}",
            record.soil_pct,
            fmt(record.temp_c),
            fmt(record.humidity_pct),
            if record.water_ok { "ok" } else { "EMPTY" }
        );
        self.latest = Some(LatestRecord {
            received_at: OffsetDateTime::now_utc(),
            record,
        });
        self.push_event(EventKind::Telemetry, detail);
    }

    /// Record a threshold command that was handed to the broker.
    pub fn record_command(&mut self, threshold: u8) {
        self.requested_threshold = Some(threshold);
        self.push_event(EventKind::Command, format!("threshold set to {threshold}%"));
    }

    pub fn record_alert(&mut self, detail: String) {
        self.push_event(EventKind::Alert, detail);
    }

    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// `true` only when the latest record positively reports an empty
    /// reservoir.  No data is not the same as no water.
    pub fn reservoir_empty(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|l| !l.record.water_ok)
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            latest: self.latest.clone(),
            reservoir_empty: self.reservoir_empty(),
            requested_threshold: self.requested_threshold,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(MonitorEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
