use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::app_dirs::AppDirs;
use crate::browser::BrowserChoice;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub settings_path: PathBuf,
    pub templates_root: PathBuf,
    pub uploads_dir: PathBuf,
    pub strip_comments: bool,
    pub open_browser: bool,
    pub browser: BrowserChoice,
    /// Stop the server once the launched browser process exits.
    pub exit_with_browser: bool,
    pub launch_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            settings_path: AppDirs::state_file("train_settings.json"),
            templates_root: AppDirs::state_file("templates"),
            uploads_dir: AppDirs::state_file("uploads"),
            strip_comments: true,
            open_browser: true,
            browser: BrowserChoice::Auto,
            exit_with_browser: true,
            launch_delay_ms: 1200,
        }
    }
}

impl Config {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn bind_address(&self) -> String {
        host_port(&self.host, self.port)
    }

    /// What to point the browser at; a wildcard bind is still reached via loopback.
    pub fn browse_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
            host => host,
        };
        format!("http://{}", host_port(host, self.port))
    }
}

fn host_port(host: &str, port: u16) -> String {
    match host.parse::<Ipv6Addr>() {
        Ok(ip) => format!("[{ip}]:{port}"),
        Err(_) => format!("{host}:{port}"),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("codetyper_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => warn!("Ignoring invalid config {}: {e}", self.path.display()),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        let data = serde_json::to_vec_pretty(cfg)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&self.path, data).map_err(io_error)?;

        info!("Wrote config to {}", self.path.display());
        Ok(())
    }
}
