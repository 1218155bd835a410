//! # Log line classification.
//!
//! [`classify`] is a pure function from one raw child-output line to a
//! [`PlayerEvent`]. It holds no state of its own; the single piece of context
//! it needs (which player names have ever been seen) comes in through the
//! [`KnownPlayerResolver`] capability.
//!
//! Steps, in order:
//! 1. strip terminal control sequences (including escape-stripped residue),
//! 2. parse the advisory `[HH:MM:SS` server timestamp,
//! 3. anchor on the `]: ` content marker,
//! 4. match the content against the known patterns, first match wins.

use chrono::{DateTime, Local};

use crate::event::{PlayerEvent, PlayerEventKind};

/// Read-side capability over the set of player names ever observed joining.
pub trait KnownPlayerResolver {
    /// Returns the known player name that appears *earliest* in `content`,
    /// if any appears at all.
    fn find_known_player(&self, content: &str) -> Option<String>;
}

/// Classifies one raw log line into a typed event.
pub fn classify(line: &str, known: &dyn KnownPlayerResolver) -> PlayerEvent {
    let clean = strip_ansi(line);
    let at = parse_log_time(&clean);

    let Some(anchor) = clean.find("]: ") else {
        return PlayerEvent {
            at,
            kind: PlayerEventKind::Other,
        };
    };
    let content = &clean[anchor + 3..];

    PlayerEvent {
        at,
        kind: classify_content(content, known),
    }
}

fn classify_content(content: &str, known: &dyn KnownPlayerResolver) -> PlayerEventKind {
    // Modded join line: "Player <NAME> joined with <CLIENT>".
    if let Some(pos) = content.find(" joined with ") {
        if let Some(player_pos) = content[..pos].rfind("Player ") {
            let player = content[player_pos + 7..pos].trim().to_string();
            let client = content[pos + 13..].trim().trim_end_matches('\n').to_string();
            return PlayerEventKind::Join { player, client };
        }
    }

    // Vanilla join line.
    if let Some(pos) = content.find(" joined the game") {
        return PlayerEventKind::Join {
            player: content[..pos].trim().to_string(),
            client: "vanilla".to_string(),
        };
    }

    if let Some(pos) = content.find(" left the game") {
        return PlayerEventKind::Leave {
            player: content[..pos].trim().to_string(),
        };
    }

    if let Some(pos) = content.find(" issued server command: /") {
        let player = content[..pos].trim().to_string();
        let rest = content[pos + 25..].trim_end_matches('\n');
        return PlayerEventKind::Command {
            player,
            command: format!("/{rest}"),
        };
    }

    // Bracketed client action, e.g. "[Alice: Toggled debug screen]". The
    // colon must sit inside the brackets; the acting player is whichever
    // known name shows up first anywhere in the content.
    if content.starts_with('[') {
        if let (Some(end), Some(colon)) = (content.find(']'), content.find(':')) {
            if colon < end {
                let action = content[1..end].trim_end_matches('\n');
                let player = known.find_known_player(content).unwrap_or_default();
                return PlayerEventKind::Command {
                    player,
                    command: format!("[{action}]"),
                };
            }
        }
    }

    if let Some(rest) = content.strip_prefix('<') {
        if let Some(end) = rest.find('>') {
            return PlayerEventKind::Chat {
                player: rest[..end].to_string(),
                text: rest[end + 1..].trim().to_string(),
            };
        }
    }

    PlayerEventKind::Other
}

/// Removes `ESC [ params letter` runs, plus bare `[digits(;digits)* m` runs
/// left behind when an upstream component already ate the escape byte.
pub fn strip_ansi(line: &str) -> String {
    let bytes = line.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == 0x1b {
            if i + 1 < bytes.len() && bytes[i + 1] == b'[' {
                i += 2;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b';') {
                    i += 1;
                }
                if i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
            } else {
                i += 1;
            }
            continue;
        }

        if bytes[i] == b'[' {
            let mut j = i + 1;
            if j < bytes.len() && bytes[j].is_ascii_digit() {
                while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b';') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j] == b'm' {
                    i = j + 1;
                    continue;
                }
            }
        }

        out.push(bytes[i]);
        i += 1;
    }
    // Only ASCII runs were removed, so the remainder is still valid UTF-8.
    String::from_utf8_lossy(&out).into_owned()
}

/// Parses the first `[HH:MM:SS` prefix into today's wall clock.
/// Missing or malformed timestamps fall back to now.
fn parse_log_time(line: &str) -> DateTime<Local> {
    let now = Local::now();
    let Some(time) = extract_hms(line) else {
        return now;
    };
    now.date_naive()
        .and_hms_opt(time.0, time.1, time.2)
        .and_then(|naive| naive.and_local_timezone(Local).single())
        .unwrap_or(now)
}

fn extract_hms(line: &str) -> Option<(u32, u32, u32)> {
    let start = line.find('[')?;
    let end = line[start..].find(' ').map(|off| start + off)?;
    let mut parts = line[start + 1..end].splitn(3, ':');
    let h = leading_digits(parts.next()?)?;
    let m = leading_digits(parts.next()?)?;
    let s = leading_digits(parts.next()?)?;
    Some((h, m, s))
}

/// Parses the leading decimal digits of `part`, ignoring any trailing junk
/// such as the `]` that follows the seconds field.
fn leading_digits(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Case-folded, whitespace-stripped projection used for keyword matching.
pub(crate) fn fold_key(s: &str) -> String {
    s.chars()
        .filter(|c| *c != ' ' && *c != '\t')
        .flat_map(|c| c.to_lowercase())
        .collect()
}
