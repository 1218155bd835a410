//! # Admin HTTP surface.
//!
//! JSON API plus static files: the moderation dashboard under `/`, uploaded
//! confession images under `/uploads/`, and the `/api/*` routes described in
//! [`handlers`]. The server runs on actix-web workers next to the supervisor
//! tasks; request handlers only take snapshots and never hold a component
//! lock across I/O.

pub mod handlers;

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use actix_files::Files;
use actix_web::dev::Server;
use actix_web::{web, App, HttpRequest, HttpServer};
use chrono::{DateTime, Local};
use log::info;
use serde::Serialize;

use crate::config::Config;
use crate::registry::BanRegistry;
use crate::requests::RequestVoteEngine;
use crate::supervisor::Supervisor;
use crate::timefmt;

/// One web-layer notice, rendered next to the audit entries in `/api/logs`.
#[derive(Debug, Clone, Serialize)]
pub struct SystemEntry {
    #[serde(rename = "timestamp", serialize_with = "timefmt::serialize")]
    pub at: DateTime<Local>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub player: String,
    pub content: String,
}

/// Bounded ring of system notices (new requests and the like).
pub struct SystemLog {
    entries: Mutex<VecDeque<SystemEntry>>,
    capacity: usize,
}

impl SystemLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn push(&self, content: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_back(SystemEntry {
            at: Local::now(),
            kind: "system",
            player: String::new(),
            content: content.into(),
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<SystemEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }
}

/// State shared across all actix-web workers.
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<BanRegistry>,
    pub engine: Arc<RequestVoteEngine>,
    pub system_log: Arc<SystemLog>,
    pub max_upload_bytes: usize,
}

/// Registers the `/api/*` routes. Split out so tests can mount the API
/// without the static-file services.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/logs", web::get().to(handlers::get_logs))
        .route("/api/online", web::get().to(handlers::get_online))
        .route("/api/ops", web::get().to(handlers::get_ops))
        .route("/api/banned", web::get().to(handlers::get_banned))
        .route("/api/players", web::get().to(handlers::get_players))
        .route("/api/requests", web::get().to(handlers::get_requests))
        .route("/api/requests", web::post().to(handlers::create_request))
        .route("/api/requests/{id}/vote", web::post().to(handlers::vote));
}

/// Binds the admin server. The returned [`Server`] future drives it.
pub fn serve(cfg: &Config, state: AppState) -> io::Result<Server> {
    let data = web::Data::new(state);
    let web_root = cfg.web_root.clone();
    let upload_dir = cfg.upload_dir.clone();
    let max_upload = cfg.max_upload_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(web::PayloadConfig::new(max_upload))
            .configure(api_routes)
            .service(Files::new("/uploads", upload_dir.clone()))
            .service(Files::new("/", web_root.clone()).index_file("index.html"))
    })
    .bind(("0.0.0.0", cfg.http_port))?
    .run();

    info!("admin interface listening on port {}", cfg.http_port);
    Ok(server)
}

/// Client address for vote de-duplication: the first `X-Forwarded-For`
/// entry, else `X-Real-IP`, else the socket peer.
pub fn client_ip(req: &HttpRequest) -> String {
    if let Some(forwarded) = header_str(req, "X-Forwarded-For") {
        let first = forwarded.split(',').next().unwrap_or(forwarded).trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    if let Some(real) = header_str(req, "X-Real-IP") {
        let real = real.trim();
        if !real.is_empty() {
            return real.to_string();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn system_log_trims_to_capacity() {
        let log = SystemLog::new(2);
        log.push("one");
        log.push("two");
        log.push("three");
        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "two");
        assert_eq!(entries[1].content, "three");
        assert_eq!(entries[0].kind, "system");
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "1.2.3.4, 10.0.0.1"))
            .insert_header(("X-Real-IP", "9.9.9.9"))
            .to_http_request();
        assert_eq!(client_ip(&req), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let req = TestRequest::default()
            .insert_header(("X-Real-IP", "9.9.9.9"))
            .to_http_request();
        assert_eq!(client_ip(&req), "9.9.9.9");
    }

    #[test]
    fn client_ip_falls_back_to_the_peer() {
        let req = TestRequest::default()
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(client_ip(&req), "127.0.0.1");
    }
}
