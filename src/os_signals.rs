//! OS signal handling for the supervisor process itself.
//!
//! [`wait_for_shutdown_signal`] completes when the operator asks us to stop:
//! SIGINT (Ctrl-C) or SIGTERM on Unix, with [`tokio::signal::ctrl_c`] as the
//! fallback elsewhere. Signals addressed at the *child* go through
//! [`ChildProcess::stop`](crate::io::ChildProcess::stop) instead.

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
