use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::settings::{FileSettingsStore, SettingsStore};
use crate::snippets::SnippetRepository;

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SettingsStore>,
    pub snippets: SnippetRepository,
    pub uploads_dir: PathBuf,
    pub strip_comments: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        snippets: SnippetRepository,
        uploads_dir: PathBuf,
        strip_comments: bool,
    ) -> Self {
        Self {
            store,
            snippets,
            uploads_dir,
            strip_comments,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(FileSettingsStore::with_path(&config.settings_path)),
            SnippetRepository::new(&config.templates_root),
            config.uploads_dir.clone(),
            config.strip_comments,
        )
    }
}

/// Admin actions are only honoured for requests from this machine.
pub fn is_loopback(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ip) => ip.is_loopback(),
        IpAddr::V6(ip) => ip.is_loopback() || ip.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}
