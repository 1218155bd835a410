//! # Global runtime configuration.
//!
//! [`Config`] defines everything the supervisor and its side-tasks need:
//! the shell command for the child, filesystem layout, worker cadences,
//! ring capacities, the vote threshold, and request expiry.
//!
//! # Example
//! ```
//! use craftvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.server_command = "cd server && java -jar server.jar nogui".into();
//! cfg.http_port = 8081;
//!
//! assert_eq!(cfg.vote_threshold, 5);
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the supervisor, registries, and admin API.
#[derive(Clone, Debug)]
pub struct Config {
    /// Shell command that starts the game server (passed to `sh -c`).
    pub server_command: String,
    /// Port the admin HTTP server listens on.
    pub http_port: u16,

    /// Static web root served at `/`.
    pub web_root: PathBuf,
    /// Known-player list, one name per line.
    pub player_file: PathBuf,
    /// Ban records, pipe-delimited.
    pub banned_file: PathBuf,
    /// Forbidden-action rules, `keyword <hours>` per line.
    pub forbidden_file: PathBuf,
    /// Command-request store.
    pub request_file: PathBuf,
    /// Directory holding uploaded confession images.
    pub upload_dir: PathBuf,
    /// Operator list written by the game server.
    pub ops_file: PathBuf,

    /// Votes needed before a command request is executed.
    pub vote_threshold: usize,
    /// Audit ring capacity (classified player events).
    pub audit_capacity: usize,
    /// System log ring capacity (web-layer notices).
    pub system_log_capacity: usize,
    /// Largest accepted POST body, uploads included.
    pub max_upload_bytes: usize,

    /// Backoff of the log pump when the child has no complete line.
    pub poll_interval: Duration,
    /// Cadence of the auto-unban sweeper.
    pub sweep_interval: Duration,
    /// Cadence of the request executor/expiry tick.
    pub executor_interval: Duration,

    /// How long an executed request (and its image) is kept around.
    pub executed_request_ttl: Duration,
    /// Optional expiry for requests that never reach the threshold.
    /// `None` keeps them until executed or manually removed.
    pub unexecuted_request_ttl: Option<Duration>,
}

impl Default for Config {
    /// Provides the stock deployment layout:
    /// - data files under `data/`, uploads under `data/uploads/`
    /// - web root `web/`, operator list `server/ops.json`
    /// - port `8080`, vote threshold `5`
    /// - 1000-entry audit ring, 100-entry system ring, 10 MiB uploads
    /// - 10 ms pump backoff, 30 s sweeper, 10 s executor
    /// - executed requests expire after 24 h, unexecuted ones never
    fn default() -> Self {
        Self {
            server_command: String::new(),
            http_port: 8080,
            web_root: PathBuf::from("web"),
            player_file: PathBuf::from("data/players.list"),
            banned_file: PathBuf::from("data/banned.list"),
            forbidden_file: PathBuf::from("data/forbidden_commands.list"),
            request_file: PathBuf::from("data/requests.dat"),
            upload_dir: PathBuf::from("data/uploads"),
            ops_file: PathBuf::from("server/ops.json"),
            vote_threshold: 5,
            audit_capacity: 1000,
            system_log_capacity: 100,
            max_upload_bytes: 10 * 1024 * 1024,
            poll_interval: Duration::from_millis(10),
            sweep_interval: Duration::from_secs(30),
            executor_interval: Duration::from_secs(10),
            executed_request_ttl: Duration::from_secs(24 * 60 * 60),
            unexecuted_request_ttl: None,
        }
    }
}
