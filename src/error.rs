//! # Error types used by the craftvisor runtime.
//!
//! Two error enums cover the fallible seams:
//!
//! - [`ChildError`]: failures around the supervised child process
//!   (spawn, stdin writes, signalling).
//! - [`RuntimeError`]: failures of the surrounding runtime itself
//!   (startup wiring, HTTP bind).
//!
//! Persistence is deliberately *not* represented here: saves are best-effort
//! (logged, never rolled back) and loads tolerate malformed records, so both
//! surface as plain [`std::io::Error`] where they can fail at all.

use thiserror::Error;

/// Errors produced while managing the supervised child process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChildError {
    /// `run()` was called while a child is already live.
    #[error("child process is already running")]
    AlreadyRunning,

    /// The operation needs a live child, but it has exited or never started.
    #[error("child process is not running")]
    NotRunning,

    /// Spawning the shell failed, or a stdio pipe was not captured.
    #[error("failed to spawn child: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    /// Writing to the child's stdin failed mid-stream.
    #[error("failed to write to child stdin: {source}")]
    Stdin {
        #[source]
        source: std::io::Error,
    },

    /// Delivering a termination signal to the child failed.
    #[error("failed to signal child: {errno}")]
    Signal { errno: nix::errno::Errno },
}

/// Errors produced by the runtime wiring around the components.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The supervised child could not be started.
    #[error("game server failed to start: {source}")]
    ChildStart {
        #[source]
        source: ChildError,
    },

    /// The admin HTTP server could not bind its port.
    #[error("failed to bind HTTP port {port}: {source}")]
    HttpBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A persistent store could not be opened at startup.
    #[error("failed to open {path}: {source}")]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
