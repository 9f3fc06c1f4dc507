//! Server-rendered pages.
//!
//! The HTML shells, script and stylesheet are compiled into the binary; the
//! shells carry `{{name}}` slots that are filled with escaped values here.
use axum::{
    extract::Path,
    http::header,
    response::{IntoResponse, Response},
};
use include_dir::{include_dir, Dir};

use crate::history::{HistorySummary, SessionRecord};
use crate::util::escape_html;
use crate::web::error::AppError;

static ASSETS: Dir = include_dir!("$CARGO_MANIFEST_DIR/assets");

fn asset(name: &str) -> Result<&'static str, AppError> {
    ASSETS
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| AppError::MissingAsset(name.to_string()))
}

fn fill(template: &str, slots: &[(&str, String)]) -> String {
    slots.iter().fold(template.to_string(), |page, (name, value)| {
        page.replace(&format!("{{{{{name}}}}}"), value)
    })
}

/// Whole numbers print without a trailing `.0`.
fn format_wpm(wpm: f64) -> String {
    if wpm.fract() == 0.0 {
        format!("{wpm:.0}")
    } else {
        format!("{wpm:.1}")
    }
}

fn history_rows(history: &[SessionRecord]) -> String {
    if history.is_empty() {
        return r#"<tr class="empty"><td colspan="4">No sessions yet</td></tr>"#.to_string();
    }

    history
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(r.display_timestamp.as_deref().unwrap_or(&r.timestamp)),
                format_wpm(r.wpm),
                r.errors,
                r.backspaces
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn summary_line(summary: &HistorySummary) -> String {
    if summary.sessions == 0 {
        return String::new();
    }
    format!(
        "{} sessions &middot; avg {} wpm &middot; best {} wpm &middot; &sigma; {}",
        summary.sessions,
        format_wpm(summary.average_wpm),
        format_wpm(summary.best_wpm),
        format_wpm(summary.wpm_std_dev)
    )
}

pub fn index(history: &[SessionRecord], summary: &HistorySummary) -> Result<String, AppError> {
    Ok(fill(
        asset("index.html")?,
        &[
            ("history_rows", history_rows(history)),
            ("summary", summary_line(summary)),
        ],
    ))
}

pub fn about(profile_image: Option<&str>, is_admin: bool) -> Result<String, AppError> {
    let profile = match profile_image {
        Some(name) => format!(
            r#"<img class="profile" src="/uploads/{}" alt="profile">"#,
            escape_html(name)
        ),
        None => r#"<p class="muted">No profile image yet.</p>"#.to_string(),
    };

    let admin = if is_admin {
        asset("admin.html")?.to_string()
    } else {
        String::new()
    };

    Ok(fill(
        asset("about.html")?,
        &[("profile", profile), ("admin", admin)],
    ))
}

/// `GET /assets/*file` for the bundled script and stylesheet.
pub async fn static_asset(Path(file): Path<String>) -> Response {
    let Some(found) = ASSETS.get_file(&file) else {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    };

    let content_type = match file.rsplit('.').next() {
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    };

    ([(header::CONTENT_TYPE, content_type)], found.contents()).into_response()
}
