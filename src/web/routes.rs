use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        ConnectInfo, Multipart, Query, State,
    },
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::history::{self, SessionMetrics};
use crate::snippets::Catalog;
use crate::web::error::AppError;
use crate::web::pages;
use crate::web::state::{is_loopback, AppState};

pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// `GET /`
pub async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let history = history::prepare_for_display(state.store.load().history);
    if let Some(odd) = history.iter().find(|r| !r.has_valid_timestamp()) {
        debug!("History contains an unparseable timestamp: {:?}", odd.timestamp);
    }
    let summary = history::summarize(&history);

    pages::index(&history, &summary).map(Html)
}

/// `POST /save`
pub async fn save_handler(
    State(state): State<AppState>,
    body: Result<Json<SessionMetrics>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(metrics) = body?;
    let record = history::record_session(&metrics, Local::now());
    let display = record.display_timestamp.clone().unwrap_or_default();

    state.store.update(&mut |doc| {
        let previous = std::mem::take(&mut doc.history);
        doc.history = history::append_and_trim(previous, record.clone());
    })?;

    info!(
        "Saved session: {} wpm, {} errors, {} backspaces",
        metrics.wpm, metrics.errors, metrics.backspaces
    );
    Ok(Json(json!({ "status": "saved", "timestamp": display })))
}

/// `POST /clear`
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.store.update(&mut |doc| doc.history = history::clear())?;

    info!("History cleared");
    Ok(Json(json!({ "status": "cleared" })))
}

/// `GET /api/history`
pub async fn history_handler(State(state): State<AppState>) -> Json<Value> {
    let history = history::prepare_for_display(state.store.load().history);
    let summary = history::summarize(&history);

    Json(json!({ "history": history, "summary": summary }))
}

/// `GET /about`
pub async fn about_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Html<String>, AppError> {
    let settings = state.store.load();
    pages::about(settings.profile_image.as_deref(), is_loopback(&addr)).map(Html)
}

/// `POST /upload_image`
///
/// Anything other than a bad extension sends the visitor back to `/about`.
pub async fn upload_image_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let back = Redirect::to("/about").into_response();

    if !is_loopback(&addr) {
        warn!("Rejected profile image upload from {addr}");
        return Ok(back);
    }
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("profile_image") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            upload = Some((file_name, field.bytes().await?));
            break;
        }
    }

    let Some((file_name, bytes)) = upload.filter(|(name, _)| !name.is_empty()) else {
        return Ok(back);
    };

    let extension = image_extension(&file_name).ok_or_else(|| {
        AppError::Validation(format!(
            "'{file_name}' is not an allowed image type ({})",
            ALLOWED_IMAGE_EXTENSIONS.join(", ")
        ))
    })?;

    let stored_name = format!("profile.{extension}");
    write_upload(&state.uploads_dir, &stored_name, &bytes)?;

    state
        .store
        .update(&mut |doc| doc.profile_image = Some(stored_name.clone()))?;

    info!("Stored profile image as {stored_name}");
    Ok(back)
}

#[derive(Debug, Deserialize)]
pub struct TemplatesQuery {
    pub strip: Option<bool>,
}

/// `GET /api/templates`
pub async fn templates_handler(
    State(state): State<AppState>,
    Query(query): Query<TemplatesQuery>,
) -> Json<Catalog> {
    let strip = query.strip.unwrap_or(state.strip_comments);
    Json(Catalog::from(state.snippets.scan(strip)))
}

/// `POST /api/upload_template`
pub async fn upload_template_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    if !is_loopback(&addr) {
        warn!("Rejected snippet upload from {addr}");
        return Err(AppError::Forbidden);
    }
    let mut multipart = multipart?;

    let mut language: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("language") => language = Some(field.text().await?),
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                file = Some((name, field.bytes().await?));
            }
            _ => {}
        }
    }

    let language = language.filter(|l| !l.trim().is_empty());
    let file = file.filter(|(name, _)| !name.is_empty());
    let (Some(language), Some((file_name, bytes))) = (language, file) else {
        return Err(AppError::Validation(
            "language and file are required".to_string(),
        ));
    };

    let stored = state.snippets.store_upload(&language, &file_name, &bytes)?;

    Ok(Json(json!({
        "status": "uploaded",
        "language": stored.language,
        "title": stored.title,
    })))
}

/// `GET /healthz`
pub async fn health_handler() -> &'static str {
    "ok"
}

/// Lower-cased extension when it is one of [`ALLOWED_IMAGE_EXTENSIONS`].
pub fn image_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_IMAGE_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

fn write_upload(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), AppError> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(name), bytes)?;
    Ok(())
}
