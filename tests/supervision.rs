//! End-to-end supervision test.
//!
//! Uses `cat` as the game server: everything written to its stdin comes back
//! on stdout, so scripted log lines flow through the real pipe, the reader
//! task, the line buffer, the pump, the classifier, and the registry,
//! including the ban command the registry pushes back into the child.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use craftvisor::{BanRegistry, ChildProcess, Config, Supervisor};

async fn wait_until(mut probe: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if probe() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn scripted_log_lines_drive_classification_and_banning() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.server_command = "cat".to_string();
    cfg.player_file = dir.path().join("players.list");
    cfg.banned_file = dir.path().join("banned.list");
    cfg.forbidden_file = dir.path().join("forbidden.list");
    cfg.ops_file = dir.path().join("ops.json");
    std::fs::write(&cfg.forbidden_file, "killall 24\n").unwrap();

    let child = Arc::new(ChildProcess::new(cfg.server_command.clone()));
    let registry = Arc::new(
        BanRegistry::open(
            &cfg.player_file,
            &cfg.banned_file,
            &cfg.forbidden_file,
            child.clone(),
        )
        .unwrap(),
    );
    let supervisor = Arc::new(Supervisor::new(cfg, child.clone(), registry.clone()));

    let token = CancellationToken::new();
    supervisor.start(token.child_token()).await.unwrap();

    child
        .send("[12:34:56] [Server thread/INFO]: Player Alice joined with fabric 0.15\n")
        .await
        .unwrap();
    assert!(wait_until(|| registry.is_online("Alice")).await);
    assert!(registry.is_known("Alice"));

    child
        .send("[12:35:00] [Server thread/INFO]: Alice issued server command: /kill all\n")
        .await
        .unwrap();
    assert!(wait_until(|| registry.is_banned("Alice")).await);

    let record = registry
        .banned_records()
        .into_iter()
        .find(|record| record.name == "Alice")
        .unwrap();
    assert!(record.reason.contains("/kill all"));
    assert!(!record.is_permanent());

    // The ban command went back through the child and echoed out again.
    assert!(
        wait_until(|| {
            supervisor
                .audit_log()
                .iter()
                .any(|entry| entry.kind == "command" && entry.content == "/kill all")
        })
        .await
    );

    child
        .send("[12:36:00] [Server thread/INFO]: Alice left the game\n")
        .await
        .unwrap();
    assert!(wait_until(|| !registry.is_online("Alice")).await);

    token.cancel();
    let _ = child.kill();
    supervisor.shutdown().await;
}
