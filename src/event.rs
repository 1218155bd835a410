//! # Typed player events and the audit entries derived from them.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::timefmt;

/// What one classified log line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEventKind {
    /// A player connected; `client` names the client flavour
    /// (`"vanilla"` when the line carries no client info).
    Join { player: String, client: String },
    /// A player disconnected.
    Leave { player: String },
    /// A player ran a server command or a bracketed client action.
    /// `command` keeps its `/` or `[…]` framing; `player` may be empty for
    /// bracketed actions with no recognisable name.
    Command { player: String, command: String },
    /// Ordinary chat.
    Chat { player: String, text: String },
    /// Anything the classifier does not recognise.
    Other,
}

/// One classified line: the advisory server timestamp plus its meaning.
#[derive(Debug, Clone)]
pub struct PlayerEvent {
    /// Parsed from the line's `[HH:MM:SS` prefix, falling back to now.
    pub at: DateTime<Local>,
    pub kind: PlayerEventKind,
}

/// One entry of the supervisor's audit ring, as served by the API.
///
/// The timestamp is the wall clock at classification time; the embedded
/// server timestamp is advisory only and lives on [`PlayerEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    #[serde(rename = "timestamp", serialize_with = "timefmt::serialize")]
    pub at: DateTime<Local>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub player: String,
    pub content: String,
}
