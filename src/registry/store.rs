//! On-disk form of the player and ban lists.
//!
//! `players.list` carries one known-player name per line. `banned.list` is
//! pipe-delimited, one record per line, with a `#` header; the permanent
//! sentinel is written as `0000-00-00 00:00:00`. Loading tolerates blank
//! lines, comments, and malformed records; saving overwrites.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::Path;

use chrono::Local;

use crate::registry::BanRecord;
use crate::timefmt;

pub fn load_players(path: &Path) -> io::Result<BTreeSet<String>> {
    let text = match read_or_create(path)? {
        Some(text) => text,
        None => return Ok(BTreeSet::new()),
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn save_players(path: &Path, players: &BTreeSet<String>) -> io::Result<()> {
    let mut out = String::new();
    for name in players {
        out.push_str(name);
        out.push('\n');
    }
    std::fs::write(path, out)
}

pub fn load_bans(path: &Path) -> io::Result<HashMap<String, BanRecord>> {
    let text = match read_or_create(path)? {
        Some(text) => text,
        None => return Ok(HashMap::new()),
    };

    let mut bans = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.splitn(4, '|');
        let (Some(name), Some(reason), Some(banned), Some(unbans)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let record = BanRecord {
            name: name.to_string(),
            reason: reason.to_string(),
            banned_at: timefmt::parse(banned).unwrap_or_else(Local::now),
            unbans_at: timefmt::parse(unbans),
        };
        bans.insert(record.name.clone(), record);
    }
    Ok(bans)
}

pub fn save_bans(path: &Path, bans: &HashMap<String, BanRecord>) -> io::Result<()> {
    let mut out = String::from("# name|reason|ban_time|unban_time\n");
    for record in bans.values() {
        out.push_str(&format!(
            "{}|{}|{}|{}\n",
            record.name,
            record.reason,
            timefmt::format(record.banned_at),
            record
                .unbans_at
                .map(timefmt::format)
                .unwrap_or_else(|| timefmt::SENTINEL.to_string()),
        ));
    }
    std::fs::write(path, out)
}

/// Reads the file, creating an empty placeholder (and parent dirs) when it
/// does not exist yet.
fn read_or_create(path: &Path) -> io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, b"")?;
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
