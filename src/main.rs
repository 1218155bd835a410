//! # craftvisor binary.
//!
//! `craftvisor <serverCommand> [port]` spawns the game server through a
//! shell, starts the moderation workers and the admin HTTP interface, then
//! waits for a shutdown signal or the child dying. Exit code 0 on a normal
//! stop, 1 on usage or startup errors.

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use craftvisor::web::{self, AppState, SystemLog};
use craftvisor::{
    wait_for_shutdown_signal, BanRegistry, ChildProcess, CommandSink, Config, RequestVoteEngine,
    RuntimeError, Supervisor,
};

fn usage(program: &str) {
    eprintln!("usage: {program} <serverCommand> [port]");
    eprintln!("example: {program} \"cd server && java -jar server.jar nogui\" 8080");
}

fn parse_args() -> Option<(String, u16)> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 && args.len() != 3 {
        usage(args.first().map(String::as_str).unwrap_or("craftvisor"));
        return None;
    }
    let command = args[1].clone();
    let port = match args.get(2) {
        Some(raw) => match raw.parse() {
            Ok(port) => port,
            Err(_) => {
                usage(&args[0]);
                return None;
            }
        },
        None => 8080,
    };
    Some((command, port))
}

#[actix_web::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let Some((server_command, http_port)) = parse_args() else {
        return ExitCode::from(1);
    };
    let cfg = Config {
        server_command,
        http_port,
        ..Config::default()
    };

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(1)
        }
    }
}

async fn run(cfg: Config) -> Result<(), RuntimeError> {
    let child = Arc::new(ChildProcess::new(cfg.server_command.clone()));
    let sink: Arc<dyn CommandSink> = child.clone();

    let registry = Arc::new(
        BanRegistry::open(
            &cfg.player_file,
            &cfg.banned_file,
            &cfg.forbidden_file,
            sink.clone(),
        )
        .map_err(|source| RuntimeError::Storage {
            path: cfg.banned_file.clone(),
            source,
        })?,
    );
    let engine = Arc::new(
        RequestVoteEngine::open(
            &cfg.request_file,
            &cfg.upload_dir,
            cfg.vote_threshold,
            cfg.executed_request_ttl,
            cfg.unexecuted_request_ttl,
            sink,
        )
        .map_err(|source| RuntimeError::Storage {
            path: cfg.request_file.clone(),
            source,
        })?,
    );
    let supervisor = Arc::new(Supervisor::new(cfg.clone(), child, registry.clone()));
    let system_log = Arc::new(SystemLog::new(cfg.system_log_capacity));

    let token = CancellationToken::new();
    supervisor
        .start(token.child_token())
        .await
        .map_err(|source| RuntimeError::ChildStart { source })?;
    let sweeper = registry.spawn_sweeper(cfg.sweep_interval, token.child_token());
    let executor = engine.spawn_executor(cfg.executor_interval, token.child_token());

    let server = web::serve(
        &cfg,
        AppState {
            supervisor: supervisor.clone(),
            registry: registry.clone(),
            engine: engine.clone(),
            system_log,
            max_upload_bytes: cfg.max_upload_bytes,
        },
    )
    .map_err(|source| RuntimeError::HttpBind {
        port: cfg.http_port,
        source,
    })?;
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    info!("craftvisor up, admin interface on http://localhost:{}", cfg.http_port);

    tokio::select! {
        _ = wait_for_shutdown_signal() => info!("shutdown signal received"),
        _ = supervisor.child_exited().cancelled() => warn!("game server exited, shutting down"),
    }

    // Cooperative teardown: flag everyone, then join in dependency order.
    token.cancel();
    server_handle.stop(true).await;
    let _ = server_task.await;
    supervisor.shutdown().await;
    let _ = sweeper.await;
    let _ = executor.await;

    registry.persist();
    engine.persist();
    info!("craftvisor stopped");
    Ok(())
}
