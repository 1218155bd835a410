//! # craftvisor
//!
//! **Craftvisor** supervises a long-running Minecraft server process and puts
//! a small moderation and auditing surface in front of it.
//!
//! | Area               | Description                                                        | Key types                                 |
//! |--------------------|--------------------------------------------------------------------|-------------------------------------------|
//! | **Child I/O**      | Shell-spawned child, buffered line reads, stdin writes, signals.   | [`ChildProcess`], [`LineBuffer`]          |
//! | **Classification** | Pure mapping from one log line to a typed player event.            | [`classify`], [`PlayerEvent`]             |
//! | **Moderation**     | Known/online/banned players, forbidden rules, auto-unban sweeper.  | [`BanRegistry`], [`BanRecord`]            |
//! | **Voting**         | IP-keyed command requests with a deferred executor and expiry.     | [`RequestVoteEngine`], [`CommandRequest`] |
//! | **Supervision**    | Log pump, audit ring, cooperative shutdown.                        | [`Supervisor`]                            |
//! | **Admin API**      | actix-web JSON surface, static dashboard, uploads.                 | [`web::serve`], [`web::AppState`]         |
//!
//! The binary wires it together:
//!
//! ```text
//!   craftvisor "<server command>" [port]
//!
//!   ChildProcess ─► LineBuffer ─► Supervisor ─► classify ─► BanRegistry
//!        ▲                            │
//!        │ stdin                      └─► audit ring ─► /api/logs
//!        └── BanRegistry bans / RequestVoteEngine executions / votes
//! ```
//!
//! Every mutable collection sits behind its own mutex and no lock is held
//! across an `.await` or an outward call; background workers are tokio tasks
//! cancelled through a shared `CancellationToken` and joined on shutdown.

mod classifier;
mod config;
mod error;
mod event;
mod io;
mod ops;
mod os_signals;
mod registry;
mod requests;
mod sink;
mod supervisor;
mod timefmt;
pub mod web;

// ---- Public re-exports ----

pub use classifier::{classify, strip_ansi, KnownPlayerResolver};
pub use config::Config;
pub use error::{ChildError, RuntimeError};
pub use event::{AuditEntry, PlayerEvent, PlayerEventKind};
pub use io::{ChildProcess, LineBuffer, StreamKind};
pub use ops::{load_ops, OpInfo};
pub use os_signals::wait_for_shutdown_signal;
pub use registry::{load_rules, BanRecord, BanRegistry, ForbiddenRule, OnlinePlayer};
pub use requests::{CommandRequest, RequestVoteEngine, VoteOutcome};
pub use sink::CommandSink;
pub use supervisor::Supervisor;
