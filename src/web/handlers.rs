//! `/api/*` request handlers.
//!
//! Every response is JSON. Validation failures come back as a one-field
//! `{"error": …}` with status 400/404; nothing here is fatal.

use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Local};
use futures_util::{StreamExt, TryStreamExt};
use log::info;
use serde_json::json;

use crate::requests::{RequestVoteEngine, VoteOutcome};
use crate::timefmt;
use crate::web::{client_ip, AppState};

pub async fn get_logs(data: web::Data<AppState>) -> HttpResponse {
    let mut entries: Vec<(DateTime<Local>, serde_json::Value)> = Vec::new();
    for entry in data.supervisor.audit_log() {
        entries.push((entry.at, json_value(&entry)));
    }
    for entry in data.system_log.snapshot() {
        entries.push((entry.at, json_value(&entry)));
    }
    entries.sort_by_key(|(at, _)| *at);

    let logs: Vec<serde_json::Value> = entries.into_iter().map(|(_, value)| value).collect();
    HttpResponse::Ok().json(json!({ "logs": logs }))
}

pub async fn get_online(data: web::Data<AppState>) -> HttpResponse {
    let players: Vec<serde_json::Value> = data
        .registry
        .online_players()
        .into_iter()
        .map(|player| json!({ "name": player.name, "client": player.client }))
        .collect();
    HttpResponse::Ok().json(json!({ "players": players }))
}

pub async fn get_ops(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "ops": data.supervisor.op_names() }))
}

pub async fn get_banned(data: web::Data<AppState>) -> HttpResponse {
    let players: Vec<serde_json::Value> = data
        .registry
        .banned_records()
        .into_iter()
        .map(|record| {
            json!({
                "name": record.name,
                "reason": record.reason,
                "ban_time": timefmt::format(record.banned_at),
                "unban_time": record
                    .unbans_at
                    .map(timefmt::format)
                    .unwrap_or_else(|| timefmt::SENTINEL.to_string()),
                "permanent": record.is_permanent(),
            })
        })
        .collect();
    HttpResponse::Ok().json(json!({ "players": players }))
}

pub async fn get_players(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "players": data.registry.players() }))
}

pub async fn get_requests(data: web::Data<AppState>) -> HttpResponse {
    let requests: Vec<serde_json::Value> = data
        .engine
        .list()
        .into_iter()
        .map(|request| {
            json!({
                "id": request.id,
                "applicant": request.applicant,
                "command": request.command,
                "reason": request.reason,
                "image": request.image.unwrap_or_default(),
                "votes": request.voted_ips.len(),
                "executed": request.executed,
                "created_at": timefmt::format(request.created_at),
            })
        })
        .collect();
    HttpResponse::Ok().json(json!({
        "threshold": data.engine.threshold(),
        "requests": requests,
    }))
}

/// Fields of a new command request, from either body flavour.
struct NewRequestForm {
    applicant: String,
    command: String,
    reason: String,
    image: Vec<u8>,
    image_ext: String,
}

pub async fn create_request(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> HttpResponse {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let form = if content_type.starts_with("multipart/form-data") {
        read_multipart(Multipart::new(req.headers(), payload), data.max_upload_bytes).await
    } else {
        read_urlencoded(payload, data.max_upload_bytes).await
    };
    let form = match form {
        Ok(form) => form,
        Err(response) => return response,
    };

    let applicant = form.applicant.trim().to_string();
    let command = form.command.trim().to_string();
    let reason = form.reason.trim().to_string();
    if applicant.is_empty() || command.is_empty() || reason.is_empty() {
        return bad_request("Missing required fields");
    }
    if !data.registry.is_known(&applicant) {
        return bad_request("Player not found");
    }
    if RequestVoteEngine::is_self_pardon(&applicant, &command) && form.image.is_empty() {
        return bad_request("Self-pardon requires confession image");
    }

    let id = data
        .engine
        .create(&applicant, &command, &reason, &form.image, &form.image_ext)
        .await;
    info!("new command request '{command}' (applicant {applicant})");
    data.system_log
        .push(format!("New command request: {command} (applicant: {applicant})"));
    HttpResponse::Ok().json(json!({ "id": id }))
}

pub async fn vote(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let id = path.into_inner();
    let ip = client_ip(&req);
    match data.engine.vote(&id, &ip) {
        VoteOutcome::Accepted => {
            info!("vote recorded for request {id} from {ip}");
            HttpResponse::Ok().json(json!({ "success": true, "message": "Vote recorded" }))
        }
        VoteOutcome::DuplicateVote => HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Already voted" })),
        VoteOutcome::NotFound => HttpResponse::NotFound()
            .json(json!({ "success": false, "error": "Request not found" })),
        VoteOutcome::AlreadyExecuted => HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Request already executed" })),
    }
}

async fn read_multipart(
    mut multipart: Multipart,
    cap: usize,
) -> Result<NewRequestForm, HttpResponse> {
    let mut applicant = None;
    let mut command = None;
    let mut reason = None;
    let mut image = Vec::new();
    let mut image_ext = String::new();

    while let Ok(Some(mut field)) = multipart.try_next().await {
        match field.name() {
            "applicant" => applicant = Some(read_field_text(&mut field, cap).await?),
            "command" => command = Some(read_field_text(&mut field, cap).await?),
            "reason" => reason = Some(read_field_text(&mut field, cap).await?),
            "image" => {
                let filename_ext = field
                    .content_disposition()
                    .get_filename()
                    .and_then(|name| name.rfind('.').map(|dot| name[dot..].to_string()));
                let mime = field.content_type().map(|m| m.to_string());
                image = read_field_bytes(&mut field, cap).await?;
                image_ext = filename_ext
                    .unwrap_or_else(|| ext_from_mime(mime.as_deref().unwrap_or("")).to_string());
            }
            _ => {
                // Unknown fields still have to be consumed.
                while let Ok(Some(_)) = field.try_next().await {}
            }
        }
    }

    let (Some(applicant), Some(command), Some(reason)) = (applicant, command, reason) else {
        return Err(bad_request("Missing required fields"));
    };
    Ok(NewRequestForm {
        applicant,
        command,
        reason,
        image,
        image_ext,
    })
}

async fn read_urlencoded(
    mut payload: web::Payload,
    cap: usize,
) -> Result<NewRequestForm, HttpResponse> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|_| bad_request("Malformed form data"))?;
        if body.len() + chunk.len() > cap {
            return Err(payload_too_large());
        }
        body.extend_from_slice(&chunk);
    }

    let fields: HashMap<String, String> =
        serde_urlencoded::from_bytes(&body).map_err(|_| bad_request("Malformed form data"))?;
    let (Some(applicant), Some(command), Some(reason)) = (
        fields.get("applicant"),
        fields.get("command"),
        fields.get("reason"),
    ) else {
        return Err(bad_request("Missing required fields"));
    };
    Ok(NewRequestForm {
        applicant: applicant.clone(),
        command: command.clone(),
        reason: reason.clone(),
        image: Vec::new(),
        image_ext: String::new(),
    })
}

async fn read_field_text(
    field: &mut actix_multipart::Field,
    cap: usize,
) -> Result<String, HttpResponse> {
    let bytes = read_field_bytes(field, cap).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn read_field_bytes(
    field: &mut actix_multipart::Field,
    cap: usize,
) -> Result<Vec<u8>, HttpResponse> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|_| bad_request("Malformed form data"))? {
        if bytes.len() + chunk.len() > cap {
            return Err(payload_too_large());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn ext_from_mime(mime: &str) -> &'static str {
    if mime.contains("jpeg") || mime.contains("jpg") {
        ".jpg"
    } else if mime.contains("gif") {
        ".gif"
    } else {
        ".png"
    }
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": message }))
}

fn payload_too_large() -> HttpResponse {
    HttpResponse::PayloadTooLarge().json(json!({ "error": "Upload too large" }))
}

fn json_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
