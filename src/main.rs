use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codetyper::browser::BrowserChoice;
use codetyper::config::{Config, ConfigStore, FileConfigStore};
use codetyper::settings::FileSettingsStore;
use codetyper::web;

/// local code typing practice with session history
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A local typing trainer for source code. Serves a practice page over HTTP, keeps your last sessions with WPM, errors and backspaces, and lets you add your own snippets."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    /// config file to read instead of the per-user default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// address to bind
    #[clap(long)]
    host: Option<String>,

    /// port to listen on
    #[clap(short = 'p', long)]
    port: Option<u16>,

    /// settings file holding history and the profile image name
    #[clap(long, global = true)]
    settings: Option<PathBuf>,

    /// directory with one sub-directory of snippets per language
    #[clap(long)]
    templates: Option<PathBuf>,

    /// directory profile images are written to
    #[clap(long)]
    uploads: Option<PathBuf>,

    /// serve snippets with their comments intact
    #[clap(long)]
    no_strip: bool,

    /// which browser to open the practice page in
    #[clap(short = 'b', long, value_enum)]
    browser: Option<BrowserChoice>,

    /// do not open a browser at all
    #[clap(long)]
    no_browser: bool,

    /// keep serving after the launched browser window closes
    #[clap(long)]
    keep_running: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// wipe the stored session history and profile image
    Reset,
    /// save the effective settings (config file plus flags) as the config file
    WriteConfig,
}

impl Cli {
    /// Command line flags take precedence over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = &self.settings {
            config.settings_path = path.clone();
        }
        if let Some(path) = &self.templates {
            config.templates_root = path.clone();
        }
        if let Some(path) = &self.uploads {
            config.uploads_dir = path.clone();
        }
        if let Some(browser) = self.browser {
            config.browser = browser;
        }
        if self.no_strip {
            config.strip_comments = false;
        }
        if self.no_browser {
            config.open_browser = false;
        }
        if self.keep_running {
            config.exit_with_browser = false;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("codetyper=info,tower_http=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a bare `--` forwarded by wrapper scripts is not an argument
    let cli = Cli::parse_from(std::env::args_os().filter(|a| a != "--"));

    init_tracing();

    let store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let mut config = store.load();
    cli.apply(&mut config);

    match cli.command {
        Some(Command::Reset) => {
            let settings = FileSettingsStore::with_path(&config.settings_path);
            settings
                .reset()
                .with_context(|| format!("failed to reset {}", settings.path().display()))?;
            info!("History reset");
            println!("Cleared history in {}", settings.path().display());
            Ok(())
        }
        Some(Command::WriteConfig) => {
            store
                .save(&config)
                .with_context(|| format!("failed to write {}", store.path().display()))?;
            println!("Wrote config to {}", store.path().display());
            Ok(())
        }
        None => web::start_server(config).await,
    }
}
