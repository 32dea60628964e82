//! Remote threshold commands.
//!
//! Commands arrive on the MQTT event-loop task at any moment.  They are not
//! applied there: the event loop drops the raw payload into a single-slot
//! mailbox ([`mailbox`]) and the control loop takes it out once per pass,
//! then calls [`apply`].  A newer command overwrites one that has not been
//! picked up yet; only the latest threshold matters.
//!
//! Malformed or out-of-range commands are discarded.  Nothing is sent back
//! to the sender.

use std::fmt;

use tokio::sync::watch;
use tracing::info;

use crate::state::{ControlState, Threshold};

/// Longest command text echoed into a rejection.
const MAX_ECHO_CHARS: usize = 32;

/// Why a command was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRejected {
    NotUtf8,
    NotAnInteger(String),
    OutOfRange(i64),
}

impl fmt::Display for CommandRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotUtf8 => f.write_str("payload is not valid UTF-8"),
            Self::NotAnInteger(text) => write!(f, "'{text}' is not a decimal integer"),
            Self::OutOfRange(v) => write!(f, "threshold {v} outside (0, 100)"),
        }
    }
}

/// Parse a command payload into a threshold.  Surrounding whitespace is
/// ignored; anything else that is not a plain decimal integer is rejected.
pub fn parse_threshold(raw: &[u8]) -> Result<Threshold, CommandRejected> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| CommandRejected::NotUtf8)?
        .trim();
    let value: i64 = text
        .parse()
        .map_err(|_| CommandRejected::NotAnInteger(text.chars().take(MAX_ECHO_CHARS).collect()))?;
    Threshold::new(value).ok_or(CommandRejected::OutOfRange(value))
}

/// Validate `raw` and, if it is acceptable, replace the shared threshold.
/// On rejection the state is untouched.
pub fn apply(raw: &[u8], state: &mut ControlState) -> Result<Threshold, CommandRejected> {
    let threshold = parse_threshold(raw)?;
    let previous = state.replace_threshold(threshold);
    info!(
        previous = previous.percent(),
        threshold = threshold.percent(),
        "moisture threshold updated"
    );
    Ok(threshold)
}

// ---------------------------------------------------------------------------
// Latest-command mailbox
// ---------------------------------------------------------------------------

/// Build a connected sender/inbox pair.
pub fn mailbox() -> (CommandSender, CommandInbox) {
    let (tx, rx) = watch::channel(None);
    (CommandSender { tx }, CommandInbox { rx })
}

/// Writing end, held by the MQTT event-loop task.
#[derive(Debug)]
pub struct CommandSender {
    tx: watch::Sender<Option<Vec<u8>>>,
}

impl CommandSender {
    /// Store `payload`, replacing any command not yet taken.
    pub fn post(&self, payload: Vec<u8>) {
        self.tx.send_replace(Some(payload));
    }
}

/// Reading end, drained by the control loop.
#[derive(Debug)]
pub struct CommandInbox {
    rx: watch::Receiver<Option<Vec<u8>>>,
}

impl CommandInbox {
    /// Take the latest unseen command, if any.
    pub fn take(&mut self) -> Option<Vec<u8>> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
