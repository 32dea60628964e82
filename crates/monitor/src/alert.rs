//! Reservoir-empty alert: while the controller reports an empty tank, raise
//! an alert event on a fixed interval.
//!
//! Only a received record with the water flag clear counts as empty.  Before
//! the first record arrives there is nothing to alert on, so a monitor that
//! never hears from the controller stays quiet rather than reporting a dry
//! tank.

use std::time::Duration;

use tracing::{info, warn};

use crate::state::{MonitorState, SharedState};

pub const ALERT_MESSAGE: &str = "reservoir empty: refill the tank";

/// One alert check.  Returns `true` when an alert was raised.
pub fn check(state: &mut MonitorState) -> bool {
    if state.reservoir_empty() {
        warn!("{ALERT_MESSAGE}");
        state.record_alert(ALERT_MESSAGE.to_string());
        true
    } else {
        false
    }
}

/// Run the alert loop.  Intended to be `tokio::spawn`-ed from main.
pub async fn run(shared: SharedState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately; skip it so a fresh monitor waits
    // for telemetry before judging the tank.
    ticker.tick().await;
    info!(interval_s = every.as_secs(), "reservoir alert started");

    loop {
        ticker.tick().await;
        let mut st = shared.write().await;
        check(&mut st);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
