//! # The capability for pushing console lines into the game server.
//!
//! The ban registry and the vote engine both need to issue commands to the
//! child's stdin, and the supervisor owns the child exclusively. Instead of
//! mutual ownership, both hold a [`CommandSink`], the one-method capability
//! the child process implements.

use async_trait::async_trait;

use crate::error::ChildError;

/// Write-side capability over the supervised child's console.
///
/// `line` must carry its own trailing newline; the sink forwards it verbatim.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Sends one console line to the child.
    ///
    /// Fails with [`ChildError::NotRunning`] once the child is gone.
    async fn send_line(&self, line: &str) -> Result<(), ChildError>;
}
