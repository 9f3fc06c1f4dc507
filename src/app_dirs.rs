use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// Where history, uploads and snippets live by default.
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("codetyper"),
            )
        } else {
            ProjectDirs::from("", "", "codetyper").map(|proj_dirs| proj_dirs.data_local_dir().into())
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "codetyper").map(|pd| pd.config_dir().join("config.json"))
    }

    /// [`AppDirs::state_dir`] joined with `name`, or `name` relative to the cwd.
    pub fn state_file(name: &str) -> PathBuf {
        Self::state_dir()
            .map(|dir| dir.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
