use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal, sync::Notify};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::browser;
use crate::config::Config;

pub mod error;
pub mod pages;
pub mod routes;
pub mod state;

use routes::{
    about_handler, clear_handler, health_handler, history_handler, index_handler,
    save_handler, templates_handler, upload_image_handler, upload_template_handler,
};
use state::AppState;

/// Uploaded images and snippets may be larger than axum's 2 MB default.
const UPLOAD_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// Every route; the caller decides how peer addresses reach [`ConnectInfo`].
///
/// [`ConnectInfo`]: axum::extract::ConnectInfo
pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.uploads_dir);

    Router::new()
        .route("/", get(index_handler))
        .route("/save", post(save_handler))
        .route("/clear", post(clear_handler))
        .route("/about", get(about_handler))
        .route("/upload_image", post(upload_image_handler))
        .route("/api/templates", get(templates_handler))
        .route("/api/upload_template", post(upload_template_handler))
        .route("/api/history", get(history_handler))
        .route("/healthz", get(health_handler))
        .route("/assets/*file", get(pages::static_asset))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    info!("Initializing state...");
    let state = AppState::from_config(&config);
    info!("Settings file: {}", config.settings_path.display());
    info!("Templates root: {}", config.templates_root.display());

    let app = router(state);

    let address = config.bind_address();
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {}", config.browse_url());

    let browser_closed = Arc::new(Notify::new());
    if config.open_browser && config.browser.opens_window() {
        browser::spawn_launcher(
            config.browser,
            config.browse_url(),
            Duration::from_millis(config.launch_delay_ms),
            config.exit_with_browser,
            browser_closed.clone(),
        );
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(browser_closed))
    .await
    .context("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal(browser_closed: Arc<Notify>) {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = browser_closed.notified() => {},
    }
}
