//! On-disk form of the command-request queue.
//!
//! One flat text file of `=== REQUEST ===` … `=== END ===` blocks with
//! `key|value` lines inside. Unknown keys and truncated blocks are skipped on
//! load so old files keep working; saving overwrites the whole file.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

use chrono::Local;

use crate::requests::CommandRequest;
use crate::timefmt;

const BLOCK_START: &str = "=== REQUEST ===";
const BLOCK_END: &str = "=== END ===";

pub fn load_requests(path: &Path) -> io::Result<HashMap<String, CommandRequest>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, b"")?;
            return Ok(HashMap::new());
        }
        Err(err) => return Err(err),
    };
    Ok(decode(&text))
}

pub fn save_requests(path: &Path, requests: &HashMap<String, CommandRequest>) -> io::Result<()> {
    std::fs::write(path, encode(requests))
}

fn decode(text: &str) -> HashMap<String, CommandRequest> {
    let mut requests = HashMap::new();
    let mut current: Option<CommandRequest> = None;

    for line in text.lines() {
        let line = line.trim();
        if line == BLOCK_START {
            current = Some(blank_request());
            continue;
        }
        if line == BLOCK_END {
            if let Some(request) = current.take() {
                if !request.id.is_empty() {
                    requests.insert(request.id.clone(), request);
                }
            }
            continue;
        }
        let Some(request) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = line.split_once('|') else {
            continue;
        };
        match key {
            "id" => request.id = value.to_string(),
            "applicant" => request.applicant = value.to_string(),
            "command" => request.command = value.to_string(),
            "reason" => request.reason = value.to_string(),
            "image" => {
                request.image = (!value.is_empty()).then(|| value.to_string());
            }
            "created" => {
                request.created_at = timefmt::parse(value).unwrap_or_else(Local::now);
            }
            "executed" => request.executed = value == "1",
            "executed_at" => request.executed_at = timefmt::parse(value),
            "votes" => {
                request.voted_ips = value
                    .split(',')
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }
    requests
}

fn encode(requests: &HashMap<String, CommandRequest>) -> String {
    let mut out = String::new();
    for request in requests.values() {
        out.push_str(BLOCK_START);
        out.push('\n');
        out.push_str(&format!("id|{}\n", request.id));
        out.push_str(&format!("applicant|{}\n", request.applicant));
        out.push_str(&format!("command|{}\n", request.command));
        out.push_str(&format!("reason|{}\n", request.reason));
        out.push_str(&format!("image|{}\n", request.image.as_deref().unwrap_or("")));
        out.push_str(&format!("created|{}\n", timefmt::format(request.created_at)));
        out.push_str(&format!("executed|{}\n", if request.executed { "1" } else { "0" }));
        out.push_str(&format!(
            "executed_at|{}\n",
            request.executed_at.map(timefmt::format).unwrap_or_default()
        ));
        let mut ips: Vec<&str> = request.voted_ips.iter().map(String::as_str).collect();
        ips.sort_unstable();
        out.push_str(&format!("votes|{}\n", ips.join(",")));
        out.push_str(BLOCK_END);
        out.push('\n');
    }
    out
}

fn blank_request() -> CommandRequest {
    CommandRequest {
        id: String::new(),
        applicant: String::new(),
        command: String::new(),
        reason: String::new(),
        image: None,
        voted_ips: HashSet::new(),
        created_at: Local::now(),
        executed_at: None,
        executed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};

    fn sample(id: &str) -> CommandRequest {
        let now = Local::now().with_nanosecond(0).unwrap();
        CommandRequest {
            id: id.to_string(),
            applicant: "Alice".into(),
            command: "/pardon Bob".into(),
            reason: "he said sorry".into(),
            image: Some(format!("{id}.png")),
            voted_ips: ["1.2.3.4", "5.6.7.8"].iter().map(|s| s.to_string()).collect(),
            created_at: now - Duration::minutes(5),
            executed_at: Some(now),
            executed: true,
        }
    }

    #[test]
    fn requests_round_trip_through_the_block_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.dat");

        let mut requests = HashMap::new();
        let a = sample("aaa-1111");
        let mut b = sample("bbb-2222");
        b.image = None;
        b.executed = false;
        b.executed_at = None;
        requests.insert(a.id.clone(), a.clone());
        requests.insert(b.id.clone(), b.clone());

        save_requests(&path, &requests).unwrap();
        let loaded = load_requests(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        let la = &loaded["aaa-1111"];
        assert_eq!(la.applicant, a.applicant);
        assert_eq!(la.command, a.command);
        assert_eq!(la.reason, a.reason);
        assert_eq!(la.image, a.image);
        assert_eq!(la.voted_ips, a.voted_ips);
        assert_eq!(la.created_at, a.created_at);
        assert_eq!(la.executed_at, a.executed_at);
        assert!(la.executed);

        let lb = &loaded["bbb-2222"];
        assert_eq!(lb.image, None);
        assert_eq!(lb.executed_at, None);
        assert!(!lb.executed);
    }

    #[test]
    fn truncated_blocks_and_junk_are_skipped() {
        let text = format!(
            "{BLOCK_START}\nid|good\napplicant|Alice\ncommand|/list\nreason|why\nimage|\ncreated|2024-01-01 10:00:00\nexecuted|0\nexecuted_at|\nvotes|\n{BLOCK_END}\n{BLOCK_START}\nid|orphaned-no-end\nstray line without a pipe\n"
        );
        let loaded = decode(&text);
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("good"));
    }

    #[test]
    fn missing_file_becomes_an_empty_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.dat");
        assert!(load_requests(&path).unwrap().is_empty());
        assert!(path.exists());
    }
}
