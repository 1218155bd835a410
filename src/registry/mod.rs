//! # Player ledger and ban enforcement.
//!
//! [`BanRegistry`] holds everything the moderation engine knows about
//! players: the insertion-only set of names ever seen joining, the map of
//! currently online players, the ban records with their unban deadlines, and
//! the immutable forbidden-action rule table. The supervisor feeds every
//! classified event into [`BanRegistry::on_event`]; forbidden commands
//! escalate to a ban issued back through the [`CommandSink`].
//!
//! Locking discipline: the data mutex guards short critical sections only.
//! Work that calls outward (sink writes, `ban`/`pardon`, file saves) is
//! gathered under the lock and performed after releasing it.

mod rules;
mod store;

pub use rules::{load_rules, ForbiddenRule};

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::{fold_key, KnownPlayerResolver};
use crate::event::{PlayerEvent, PlayerEventKind};
use crate::sink::CommandSink;
use crate::timefmt;

/// A player currently connected to the game server.
#[derive(Debug, Clone)]
pub struct OnlinePlayer {
    pub name: String,
    pub joined_at: DateTime<Local>,
    pub client: String,
}

/// One ban. `unbans_at == None` encodes the permanent sentinel, a deadline
/// strictly later than any real clock reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub name: String,
    pub reason: String,
    pub banned_at: DateTime<Local>,
    pub unbans_at: Option<DateTime<Local>>,
}

impl BanRecord {
    pub fn is_permanent(&self) -> bool {
        self.unbans_at.is_none()
    }
}

struct State {
    players: BTreeSet<String>,
    online: HashMap<String, OnlinePlayer>,
    banned: HashMap<String, BanRecord>,
}

/// Persistent registry of known, online, and banned players.
pub struct BanRegistry {
    player_file: PathBuf,
    banned_file: PathBuf,
    rules: Vec<ForbiddenRule>,
    sink: Arc<dyn CommandSink>,
    state: Mutex<State>,
}

impl BanRegistry {
    /// Loads the player list, ban list, and rule table, creating empty
    /// placeholder files where missing.
    pub fn open(
        player_file: &Path,
        banned_file: &Path,
        forbidden_file: &Path,
        sink: Arc<dyn CommandSink>,
    ) -> io::Result<Self> {
        let players = store::load_players(player_file)?;
        let banned = store::load_bans(banned_file)?;
        let rules = rules::load_rules(forbidden_file)?;
        info!(
            "loaded {} known players, {} bans, {} forbidden rules",
            players.len(),
            banned.len(),
            rules.len()
        );
        Ok(Self {
            player_file: player_file.to_path_buf(),
            banned_file: banned_file.to_path_buf(),
            rules,
            sink,
            state: Mutex::new(State {
                players,
                online: HashMap::new(),
                banned,
            }),
        })
    }

    /// Applies one classified event.
    ///
    /// Joins extend the known set and the online map, leaves shrink the
    /// online map, and commands are checked against the rule table; the
    /// first matching rule wins and escalates to [`BanRegistry::ban`].
    pub async fn on_event(&self, event: &PlayerEvent) {
        match &event.kind {
            PlayerEventKind::Join { player, client } => {
                let mut state = self.lock();
                state.players.insert(player.clone());
                state.online.insert(
                    player.clone(),
                    OnlinePlayer {
                        name: player.clone(),
                        joined_at: event.at,
                        client: client.clone(),
                    },
                );
            }
            PlayerEventKind::Leave { player } => {
                let mut state = self.lock();
                state.online.remove(player);
            }
            PlayerEventKind::Command { player, command } => {
                if player.is_empty() {
                    return;
                }
                // The rule table is immutable, so the match itself needs no
                // lock; `ban` takes the data mutex on its own.
                let folded = fold_key(command);
                let hit = self
                    .rules
                    .iter()
                    .find(|rule| folded.contains(&fold_key(&rule.keyword)))
                    .cloned();
                if let Some(rule) = hit {
                    let reason = compose_reason(command, &rule);
                    self.ban(player, &reason, rule.ban_hours).await;
                }
            }
            PlayerEventKind::Chat { .. } | PlayerEventKind::Other => {}
        }
    }

    /// Upserts a ban record, forwards `ban <name> <reason>` to the child,
    /// and persists. `hours == 0` bans permanently.
    pub async fn ban(&self, name: &str, reason: &str, hours: u64) {
        let banned_at = Local::now();
        let unbans_at = (hours != 0).then(|| banned_at + chrono::Duration::hours(hours as i64));
        let record = BanRecord {
            name: name.to_string(),
            reason: reason.to_string(),
            banned_at,
            unbans_at,
        };
        {
            let mut state = self.lock();
            state.banned.insert(name.to_string(), record);
        }
        info!(
            "banned {name} ({}): {reason}",
            if hours == 0 { "permanent".to_string() } else { format!("{hours} h") }
        );
        if let Err(err) = self.sink.send_line(&format!("ban {name} {reason}\n")).await {
            warn!("could not forward ban for {name}: {err}");
        }
        self.persist();
    }

    /// Removes a ban if present and forwards `pardon <name>` to the child.
    /// Returns `false` when the player was not banned.
    pub async fn pardon(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            state.banned.remove(name).is_some()
        };
        if !removed {
            return false;
        }
        info!("pardoned {name}");
        if let Err(err) = self.sink.send_line(&format!("pardon {name}\n")).await {
            warn!("could not forward pardon for {name}: {err}");
        }
        self.persist();
        true
    }

    /// Every player name ever observed joining.
    pub fn players(&self) -> Vec<String> {
        self.lock().players.iter().cloned().collect()
    }

    /// Snapshot of the current ban records.
    pub fn banned_records(&self) -> Vec<BanRecord> {
        self.lock().banned.values().cloned().collect()
    }

    /// Snapshot of the currently online players.
    pub fn online_players(&self) -> Vec<OnlinePlayer> {
        self.lock().online.values().cloned().collect()
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.lock().players.contains(name)
    }

    pub fn is_banned(&self, name: &str) -> bool {
        self.lock().banned.contains_key(name)
    }

    pub fn is_online(&self, name: &str) -> bool {
        self.lock().online.contains_key(name)
    }

    /// Writes both registry files. Best-effort: failures are logged and the
    /// in-memory state stands; the next successful save re-synchronises.
    pub fn persist(&self) {
        let (players, banned) = {
            let state = self.lock();
            (state.players.clone(), state.banned.clone())
        };
        if let Err(err) = store::save_players(&self.player_file, &players) {
            error!("failed to save {}: {err}", self.player_file.display());
        }
        if let Err(err) = store::save_bans(&self.banned_file, &banned) {
            error!("failed to save {}: {err}", self.banned_file.display());
        }
    }

    /// Pardons every non-permanent ban whose deadline has passed.
    /// Returns how many players were unbanned.
    pub async fn sweep_due(&self) -> usize {
        let now = Local::now();
        let due: Vec<String> = {
            let state = self.lock();
            state
                .banned
                .values()
                .filter(|record| record.unbans_at.is_some_and(|at| at <= now))
                .map(|record| record.name.clone())
                .collect()
        };
        let mut unbanned = 0;
        for name in due {
            if self.pardon(&name).await {
                info!("auto-unbanned {name}");
                unbanned += 1;
            }
        }
        unbanned
    }

    /// Spawns the auto-unban sweeper: one [`BanRegistry::sweep_due`] pass per
    /// `interval`, until cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = token.cancelled() => break,
                }
                registry.sweep_due().await;
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KnownPlayerResolver for BanRegistry {
    fn find_known_player(&self, content: &str) -> Option<String> {
        let state = self.lock();
        state
            .players
            .iter()
            .filter_map(|name| content.find(name.as_str()).map(|pos| (pos, name)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, name)| name.clone())
    }
}

fn compose_reason(content: &str, rule: &ForbiddenRule) -> String {
    if rule.is_permanent() {
        format!("Executed forbidden action {content}; permanently banned. Appeal on the server admin site.")
    } else {
        let until = Local::now() + chrono::Duration::hours(rule.ban_hours as i64);
        format!(
            "Executed forbidden action {content}; banned until {}. Appeal on the server admin site.",
            timefmt::format(until)
        )
    }
}
