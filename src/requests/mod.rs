//! # Community-voted command requests.
//!
//! Players file a [`CommandRequest`] over the admin API; anyone may vote for
//! it, de-duplicated by client IP. A background tick materialises every
//! request that crossed the vote threshold by pushing its command into the
//! game server through the [`CommandSink`], and expires executed requests
//! (plus their confession images) after their retention window.
//!
//! Execution is deferred to the tick rather than run inline on the crossing
//! vote: the vote path stays allocation- and callback-free, executions are
//! serialised on one task, and external command pressure stays bounded.
//!
//! Locking discipline matches the registry: mark-and-collect under a short
//! critical section, then act (sink writes, file deletes, saves) with the
//! lock released.

mod store;

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info, warn};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::fold_key;
use crate::sink::CommandSink;

/// One pending or executed command request.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub id: String,
    pub applicant: String,
    pub command: String,
    pub reason: String,
    /// Base name of the confession image inside the upload dir, if any.
    pub image: Option<String>,
    pub voted_ips: HashSet<String>,
    pub created_at: DateTime<Local>,
    pub executed_at: Option<DateTime<Local>>,
    pub executed: bool,
}

impl CommandRequest {
    pub fn votes(&self) -> usize {
        self.voted_ips.len()
    }
}

/// Result of one vote attempt. Non-accepted outcomes leave the request
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted,
    DuplicateVote,
    NotFound,
    AlreadyExecuted,
}

/// Persistent, IP-keyed voting engine with a deferred executor.
pub struct RequestVoteEngine {
    request_file: PathBuf,
    upload_dir: PathBuf,
    threshold: usize,
    executed_ttl: chrono::Duration,
    unexecuted_ttl: Option<chrono::Duration>,
    sink: Arc<dyn CommandSink>,
    requests: Mutex<HashMap<String, CommandRequest>>,
}

impl RequestVoteEngine {
    /// Loads the request store and makes sure the upload directory exists.
    ///
    /// `unexecuted_ttl` is the optional expiry for requests that never reach
    /// the threshold; `None` keeps them indefinitely.
    pub fn open(
        request_file: &Path,
        upload_dir: &Path,
        threshold: usize,
        executed_ttl: Duration,
        unexecuted_ttl: Option<Duration>,
        sink: Arc<dyn CommandSink>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(upload_dir)?;
        let requests = store::load_requests(request_file)?;
        info!("loaded {} command requests", requests.len());
        Ok(Self {
            request_file: request_file.to_path_buf(),
            upload_dir: upload_dir.to_path_buf(),
            threshold,
            executed_ttl: chrono::Duration::from_std(executed_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
            unexecuted_ttl: unexecuted_ttl.map(|ttl| {
                chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24))
            }),
            sink,
            requests: Mutex::new(requests),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Files a new request and returns its id. A non-empty `image` is written
    /// to the upload dir as `<id><image_ext>`; only the base name is stored.
    pub async fn create(
        &self,
        applicant: &str,
        command: &str,
        reason: &str,
        image: &[u8],
        image_ext: &str,
    ) -> String {
        let id = generate_id();
        let image_name = if image.is_empty() {
            None
        } else {
            let filename = format!("{id}{image_ext}");
            match tokio::fs::write(self.upload_dir.join(&filename), image).await {
                Ok(()) => Some(filename),
                Err(err) => {
                    error!("failed to store upload for request {id}: {err}");
                    None
                }
            }
        };

        let request = CommandRequest {
            id: id.clone(),
            applicant: applicant.trim().to_string(),
            command: command.trim().to_string(),
            reason: reason.trim().to_string(),
            image: image_name,
            voted_ips: HashSet::new(),
            created_at: Local::now(),
            executed_at: None,
            executed: false,
        };
        {
            let mut requests = self.lock();
            requests.insert(id.clone(), request);
        }
        self.persist();
        id
    }

    /// Records one vote. Only [`VoteOutcome::Accepted`] mutates the request;
    /// execution itself is left to the next tick.
    pub fn vote(&self, id: &str, ip: &str) -> VoteOutcome {
        let mut requests = self.lock();
        let Some(request) = requests.get_mut(id) else {
            return VoteOutcome::NotFound;
        };
        if request.executed {
            return VoteOutcome::AlreadyExecuted;
        }
        if request.voted_ips.contains(ip) {
            return VoteOutcome::DuplicateVote;
        }
        request.voted_ips.insert(ip.to_string());
        VoteOutcome::Accepted
    }

    /// Snapshot of every request, newest first.
    pub fn list(&self) -> Vec<CommandRequest> {
        let mut requests: Vec<CommandRequest> = self.lock().values().cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests
    }

    pub fn get(&self, id: &str) -> Option<CommandRequest> {
        self.lock().get(id).cloned()
    }

    /// True when executing `command` would pardon the applicant themself.
    /// The admin API demands an attached confession image for these.
    pub fn is_self_pardon(applicant: &str, command: &str) -> bool {
        let folded = fold_key(command);
        let folded = folded.strip_prefix('/').unwrap_or(&folded);
        match folded.strip_prefix("pardon") {
            Some(rest) => rest.contains(&applicant.to_lowercase()),
            None => false,
        }
    }

    /// Executes every unexecuted request at or past the threshold: marks it
    /// executed under the lock, then pushes the command (leading `/`
    /// stripped) into the child. Returns how many ran.
    pub async fn execute_ready(&self) -> usize {
        let now = Local::now();
        let ready: Vec<(String, String)> = {
            let mut requests = self.lock();
            requests
                .values_mut()
                .filter(|request| !request.executed && request.votes() >= self.threshold)
                .map(|request| {
                    request.executed = true;
                    request.executed_at = Some(now);
                    (request.command.clone(), request.applicant.clone())
                })
                .collect()
        };

        for (command, applicant) in &ready {
            let line = command.trim();
            let line = line.strip_prefix('/').unwrap_or(line);
            if let Err(err) = self.sink.send_line(&format!("{line}\n")).await {
                warn!("could not forward approved request '{command}': {err}");
            }
            info!("executed community request '{command}' (applicant {applicant})");
        }
        if !ready.is_empty() {
            self.persist();
        }
        ready.len()
    }

    /// Removes requests past their retention window and deletes their images
    /// (best-effort; a missing file is not an error). Returns how many were
    /// removed.
    pub async fn expire_old(&self) -> usize {
        let now = Local::now();
        let mut images = Vec::new();
        let removed = {
            let mut requests = self.lock();
            let due: Vec<String> = requests
                .values()
                .filter(|request| self.is_expired(request, now))
                .map(|request| request.id.clone())
                .collect();
            for id in &due {
                if let Some(request) = requests.remove(id) {
                    images.extend(request.image);
                }
            }
            due.len()
        };

        for image in images {
            let path = self.upload_dir.join(&image);
            if let Err(err) = tokio::fs::remove_file(&path).await {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("failed to delete {}: {err}", path.display());
                }
            }
        }
        if removed > 0 {
            info!("expired {removed} command requests");
            self.persist();
        }
        removed
    }

    /// Spawns the executor: one execute-then-expire pass per `interval`,
    /// until cancelled.
    pub fn spawn_executor(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = token.cancelled() => break,
                }
                engine.execute_ready().await;
                engine.expire_old().await;
            }
        })
    }

    /// Writes the request store. Best-effort, like every persistence path.
    pub fn persist(&self) {
        let snapshot = self.lock().clone();
        if let Err(err) = store::save_requests(&self.request_file, &snapshot) {
            error!("failed to save {}: {err}", self.request_file.display());
        }
    }

    fn is_expired(&self, request: &CommandRequest, now: DateTime<Local>) -> bool {
        if request.executed {
            return request
                .executed_at
                .is_some_and(|at| now - at >= self.executed_ttl);
        }
        self.unexecuted_ttl
            .is_some_and(|ttl| now - request.created_at >= ttl)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CommandRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lowercase-hex millisecond epoch, a dash, and a uniform 4-digit suffix.
fn generate_id() -> String {
    let millis = Local::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(1000..=9999);
    format!("{millis:x}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use crate::error::ChildError;

    #[derive(Default)]
    struct MockSink {
        lines: Mutex<Vec<String>>,
    }

    impl MockSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSink for MockSink {
        async fn send_line(&self, line: &str) -> Result<(), ChildError> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    struct Fixture {
        engine: Arc<RequestVoteEngine>,
        sink: Arc<MockSink>,
        dir: tempfile::TempDir,
    }

    fn fixture(threshold: usize, unexecuted_ttl: Option<Duration>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MockSink::default());
        let engine = RequestVoteEngine::open(
            &dir.path().join("requests.dat"),
            &dir.path().join("uploads"),
            threshold,
            Duration::from_secs(24 * 60 * 60),
            unexecuted_ttl,
            sink.clone(),
        )
        .unwrap();
        Fixture {
            engine: Arc::new(engine),
            sink,
            dir,
        }
    }

    #[tokio::test]
    async fn ids_look_like_hex_millis_dash_suffix() {
        let first = generate_id();
        let second = generate_id();
        let (millis, suffix) = first.split_once('-').unwrap();
        assert!(millis.chars().all(|c| c.is_ascii_hexdigit()));
        let suffix: u32 = suffix.parse().unwrap();
        assert!((1000..=9999).contains(&suffix));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn votes_deduplicate_by_ip() {
        let f = fixture(5, None);
        let id = f.engine.create("Alice", "/list", "why", &[], "").await;

        assert_eq!(f.engine.vote(&id, "1.2.3.4"), VoteOutcome::Accepted);
        assert_eq!(f.engine.vote(&id, "1.2.3.4"), VoteOutcome::DuplicateVote);
        assert_eq!(f.engine.vote(&id, "1.2.3.5"), VoteOutcome::Accepted);
        assert_eq!(f.engine.get(&id).unwrap().votes(), 2);
    }

    #[tokio::test]
    async fn voting_on_a_missing_request_is_not_found() {
        let f = fixture(5, None);
        assert_eq!(f.engine.vote("no-such", "1.2.3.4"), VoteOutcome::NotFound);
    }

    #[tokio::test]
    async fn threshold_crossing_executes_exactly_once() {
        let f = fixture(2, None);
        let id = f.engine.create("Alice", "/kill all", "please", &[], "").await;
        f.engine.vote(&id, "1.2.3.4");
        f.engine.vote(&id, "1.2.3.5");

        assert_eq!(f.engine.execute_ready().await, 1);
        let request = f.engine.get(&id).unwrap();
        assert!(request.executed);
        assert!(request.executed_at.is_some());
        assert_eq!(f.sink.lines(), vec!["kill all\n".to_string()]);

        // A second tick finds nothing new to run.
        assert_eq!(f.engine.execute_ready().await, 0);
        assert_eq!(f.sink.lines().len(), 1);
        assert_eq!(f.engine.vote(&id, "1.2.3.6"), VoteOutcome::AlreadyExecuted);
    }

    #[tokio::test]
    async fn below_threshold_requests_stay_pending() {
        let f = fixture(3, None);
        let id = f.engine.create("Alice", "/list", "why", &[], "").await;
        f.engine.vote(&id, "1.2.3.4");
        assert_eq!(f.engine.execute_ready().await, 0);
        assert!(!f.engine.get(&id).unwrap().executed);
        assert!(f.sink.lines().is_empty());
    }

    #[tokio::test]
    async fn expiry_removes_old_executed_requests_and_their_images() {
        let f = fixture(1, None);
        let id = f
            .engine
            .create("Alice", "/pardon Bob", "sorry", b"\x89PNG", ".png")
            .await;
        let image_path = f.dir.path().join("uploads").join(format!("{id}.png"));
        assert!(image_path.exists());

        f.engine.vote(&id, "1.2.3.4");
        f.engine.execute_ready().await;
        {
            let mut requests = f.engine.lock();
            let request = requests.get_mut(&id).unwrap();
            request.executed_at = Some(Local::now() - ChronoDuration::hours(25));
        }

        assert_eq!(f.engine.expire_old().await, 1);
        assert!(f.engine.get(&id).is_none());
        assert!(!image_path.exists());
    }

    #[tokio::test]
    async fn fresh_executed_requests_are_kept() {
        let f = fixture(1, None);
        let id = f.engine.create("Alice", "/list", "why", &[], "").await;
        f.engine.vote(&id, "1.2.3.4");
        f.engine.execute_ready().await;
        assert_eq!(f.engine.expire_old().await, 0);
        assert!(f.engine.get(&id).is_some());
    }

    #[tokio::test]
    async fn unexecuted_requests_never_expire_by_default() {
        let f = fixture(5, None);
        let id = f.engine.create("Alice", "/list", "why", &[], "").await;
        {
            let mut requests = f.engine.lock();
            requests.get_mut(&id).unwrap().created_at = Local::now() - ChronoDuration::days(365);
        }
        assert_eq!(f.engine.expire_old().await, 0);
        assert!(f.engine.get(&id).is_some());
    }

    #[tokio::test]
    async fn unexecuted_requests_expire_when_configured() {
        let f = fixture(5, Some(Duration::from_secs(60 * 60)));
        let id = f.engine.create("Alice", "/list", "why", &[], "").await;
        {
            let mut requests = f.engine.lock();
            requests.get_mut(&id).unwrap().created_at = Local::now() - ChronoDuration::hours(2);
        }
        assert_eq!(f.engine.expire_old().await, 1);
        assert!(f.engine.get(&id).is_none());
    }

    #[tokio::test]
    async fn list_is_sorted_newest_first() {
        let f = fixture(5, None);
        let first = f.engine.create("Alice", "/a", "r", &[], "").await;
        let second = f.engine.create("Alice", "/b", "r", &[], "").await;
        {
            let mut requests = f.engine.lock();
            requests.get_mut(&first).unwrap().created_at =
                Local::now() - ChronoDuration::minutes(10);
        }
        let listed = f.engine.list();
        assert_eq!(listed[0].id, second);
        assert_eq!(listed[1].id, first);
    }

    #[tokio::test]
    async fn store_round_trips_through_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MockSink::default());
        let path = dir.path().join("requests.dat");
        let uploads = dir.path().join("uploads");

        let engine = RequestVoteEngine::open(
            &path,
            &uploads,
            5,
            Duration::from_secs(24 * 60 * 60),
            None,
            sink.clone(),
        )
        .unwrap();
        let id = engine
            .create("Alice", "/pardon Bob", "he apologised", b"png", ".png")
            .await;
        engine.vote(&id, "1.2.3.4");
        engine.vote(&id, "5.6.7.8");
        engine.persist();
        let before = engine.get(&id).unwrap();

        let reopened = RequestVoteEngine::open(
            &path,
            &uploads,
            5,
            Duration::from_secs(24 * 60 * 60),
            None,
            sink,
        )
        .unwrap();
        let after = reopened.get(&id).unwrap();
        assert_eq!(after.applicant, before.applicant);
        assert_eq!(after.command, before.command);
        assert_eq!(after.reason, before.reason);
        assert_eq!(after.image, before.image);
        assert_eq!(after.voted_ips, before.voted_ips);
        assert_eq!(
            crate::timefmt::format(after.created_at),
            crate::timefmt::format(before.created_at)
        );
        assert_eq!(after.executed, before.executed);
    }

    #[test]
    fn self_pardon_detection_is_case_and_space_insensitive() {
        assert!(RequestVoteEngine::is_self_pardon("Bob", "/pardon bob"));
        assert!(RequestVoteEngine::is_self_pardon("Bob", "pardon  BOB"));
        assert!(RequestVoteEngine::is_self_pardon("Bob", "/ Pardon Bob "));
        assert!(!RequestVoteEngine::is_self_pardon("Bob", "/pardon carol"));
        assert!(!RequestVoteEngine::is_self_pardon("Bob", "/ban bob"));
        assert!(!RequestVoteEngine::is_self_pardon("Bob", "/list"));
    }
}
