//! # The supervisor: child, classifier, registry, audit ring.
//!
//! [`Supervisor`] owns the [`ChildProcess`] exclusively and wires the read
//! path together: a log pump task takes one stdout line at a time, classifies
//! it, feeds the event into the [`BanRegistry`], and appends an [`AuditEntry`]
//! to the bounded audit ring. Unrecognised lines are echoed verbatim to the
//! operator's stdout and never audited.
//!
//! ```text
//!   ChildProcess ─► LineBuffer ─► log pump ─► classify ─► BanRegistry
//!                                      │
//!                                      └─► audit ring (last 1000)
//! ```
//!
//! When the pump observes the child gone it trips the `child_exited` token so
//! the main loop can initiate shutdown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Local;
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier;
use crate::config::Config;
use crate::error::ChildError;
use crate::event::{AuditEntry, PlayerEventKind};
use crate::io::{ChildProcess, StreamKind};
use crate::ops::{self, OpInfo};
use crate::registry::BanRegistry;

pub struct Supervisor {
    cfg: Config,
    child: Arc<ChildProcess>,
    registry: Arc<BanRegistry>,
    audit: Mutex<VecDeque<AuditEntry>>,
    ops: Vec<OpInfo>,
    exited: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Wires the supervisor and reads the operator list once.
    /// A missing or broken `ops.json` is logged and treated as empty.
    pub fn new(cfg: Config, child: Arc<ChildProcess>, registry: Arc<BanRegistry>) -> Self {
        let ops = match ops::load_ops(&cfg.ops_file) {
            Ok(ops) => {
                info!("loaded {} operators", ops.len());
                ops
            }
            Err(err) => {
                warn!("could not read {}: {err}", cfg.ops_file.display());
                Vec::new()
            }
        };
        Self {
            cfg,
            child,
            registry,
            audit: Mutex::new(VecDeque::new()),
            ops,
            exited: CancellationToken::new(),
            pump: Mutex::new(None),
        }
    }

    /// Starts the child and schedules the log pump.
    pub async fn start(self: &Arc<Self>, token: CancellationToken) -> Result<(), ChildError> {
        self.child.run().await?;
        info!("game server started");
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.pump_loop(token).await });
        *self.lock_pump() = Some(handle);
        Ok(())
    }

    /// Cancelled once the pump observes the child gone.
    pub fn child_exited(&self) -> &CancellationToken {
        &self.exited
    }

    /// Snapshot of the audit ring, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.lock_audit().iter().cloned().collect()
    }

    /// Operator names from `ops.json`.
    pub fn op_names(&self) -> Vec<String> {
        self.ops.iter().map(|op| op.name.clone()).collect()
    }

    pub fn running(&self) -> bool {
        self.child.running()
    }

    /// Joins the pump, asks the child to terminate gracefully, and stops the
    /// pipe reader. Call after cancelling the runtime token.
    pub async fn shutdown(&self) {
        let handle = self.lock_pump().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        if self.child.running() {
            if let Err(err) = self.child.stop() {
                warn!("could not stop child: {err}");
            }
        }
        self.child.shutdown().await;
        info!("game server supervisor stopped");
    }

    async fn pump_loop(&self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }
            if !self.child.running() {
                info!(
                    "game server exited with code {}",
                    self.child.exit_code()
                );
                self.exited.cancel();
                break;
            }
            match self.child.read_line(StreamKind::Stdout) {
                Some(line) => self.handle_line(&line).await,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                        _ = token.cancelled() => break,
                    }
                }
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        let event = classifier::classify(line, self.registry.as_ref());
        self.registry.on_event(&event).await;

        let entry = match &event.kind {
            PlayerEventKind::Join { player, client } => {
                info!("player {player} joined with client {client}");
                AuditEntry {
                    at: Local::now(),
                    kind: "join",
                    player: player.clone(),
                    content: client.clone(),
                }
            }
            PlayerEventKind::Leave { player } => {
                info!("player {player} left");
                AuditEntry {
                    at: Local::now(),
                    kind: "leave",
                    player: player.clone(),
                    content: String::new(),
                }
            }
            PlayerEventKind::Command { player, command } => {
                info!("player {player} ran {command}");
                AuditEntry {
                    at: Local::now(),
                    kind: "command",
                    player: player.clone(),
                    content: command.clone(),
                }
            }
            PlayerEventKind::Chat { player, text } => {
                info!("<{player}> {text}");
                AuditEntry {
                    at: Local::now(),
                    kind: "chat",
                    player: player.clone(),
                    content: text.clone(),
                }
            }
            PlayerEventKind::Other => {
                // Unclassified server output goes straight to the operator.
                let raw = line.trim_end_matches('\n');
                if !raw.is_empty() {
                    println!("{raw}");
                }
                return;
            }
        };

        let mut audit = self.lock_audit();
        audit.push_back(entry);
        while audit.len() > self.cfg.audit_capacity {
            audit.pop_front();
        }
    }

    fn lock_audit(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEntry>> {
        self.audit.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pump(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::sink::CommandSink;

    struct NullSink;

    #[async_trait]
    impl CommandSink for NullSink {
        async fn send_line(&self, _line: &str) -> Result<(), ChildError> {
            Ok(())
        }
    }

    fn test_supervisor() -> (Arc<Supervisor>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.audit_capacity = 3;
        cfg.player_file = dir.path().join("players.list");
        cfg.banned_file = dir.path().join("banned.list");
        cfg.forbidden_file = dir.path().join("forbidden.list");
        cfg.ops_file = dir.path().join("ops.json");

        let registry = Arc::new(
            BanRegistry::open(
                &cfg.player_file,
                &cfg.banned_file,
                &cfg.forbidden_file,
                Arc::new(NullSink),
            )
            .unwrap(),
        );
        let child = Arc::new(ChildProcess::new("true"));
        (Arc::new(Supervisor::new(cfg, child, registry)), dir)
    }

    #[tokio::test]
    async fn classified_lines_land_in_the_audit_ring() {
        let (supervisor, _dir) = test_supervisor();
        supervisor
            .handle_line("[10:00:00] [Server thread/INFO]: Alice joined the game\n")
            .await;
        supervisor
            .handle_line("[10:00:05] [Server thread/INFO]: <Alice> hi\n")
            .await;

        let audit = supervisor.audit_log();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].kind, "join");
        assert_eq!(audit[0].player, "Alice");
        assert_eq!(audit[0].content, "vanilla");
        assert_eq!(audit[1].kind, "chat");
        assert_eq!(audit[1].content, "hi");
    }

    #[tokio::test]
    async fn join_precedes_later_events_for_the_same_player() {
        let (supervisor, _dir) = test_supervisor();
        supervisor
            .handle_line("[10:00:00] [Server thread/INFO]: Alice joined the game\n")
            .await;
        supervisor
            .handle_line("[10:00:01] [Server thread/INFO]: Alice issued server command: /home\n")
            .await;
        supervisor
            .handle_line("[10:00:02] [Server thread/INFO]: Alice left the game\n")
            .await;

        let kinds: Vec<&str> = supervisor.audit_log().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["join", "command", "leave"]);
    }

    #[tokio::test]
    async fn unrecognised_lines_are_not_audited() {
        let (supervisor, _dir) = test_supervisor();
        supervisor
            .handle_line("[10:00:00] [Server thread/INFO]: Done (3.14s)!\n")
            .await;
        assert!(supervisor.audit_log().is_empty());
    }

    #[tokio::test]
    async fn the_ring_is_trimmed_to_its_capacity() {
        let (supervisor, _dir) = test_supervisor();
        for i in 0..5 {
            supervisor
                .handle_line(&format!(
                    "[10:00:0{i}] [Server thread/INFO]: <Alice> message {i}\n"
                ))
                .await;
        }
        let audit = supervisor.audit_log();
        assert_eq!(audit.len(), 3);
        assert_eq!(audit[0].content, "message 2");
        assert_eq!(audit[2].content, "message 4");
    }
}
