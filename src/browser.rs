use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BrowserChoice {
    /// firefox, then edge, then the system default
    #[default]
    Auto,
    Firefox,
    Edge,
    /// whatever the OS opens URLs with; never watched
    #[serde(rename = "default", alias = "system")]
    #[strum(serialize = "default")]
    #[value(name = "default", alias = "system")]
    SystemDefault,
    /// do not open anything
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    #[value(name = "none")]
    NoBrowser,
}

impl BrowserChoice {
    pub fn opens_window(self) -> bool {
        self != BrowserChoice::NoBrowser
    }
}

/// A browser executable plus the flag that makes it open a new window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: PathBuf,
    pub args: &'static [&'static str],
}

const FIREFOX_INSTALLS: &[&str] = &[
    r"C:\Program Files\Mozilla Firefox\firefox.exe",
    r"C:\Program Files (x86)\Mozilla Firefox\firefox.exe",
];

const EDGE_INSTALLS: &[&str] = &[
    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

pub fn resolve(choice: BrowserChoice) -> Option<Launch> {
    match choice {
        BrowserChoice::Firefox => {
            find_executable(FIREFOX_INSTALLS, &["firefox"]).map(|program| Launch {
                program,
                args: &["-new-window"],
            })
        }
        BrowserChoice::Edge => {
            find_executable(EDGE_INSTALLS, &["msedge", "microsoft-edge"]).map(|program| Launch {
                program,
                args: &["--new-window"],
            })
        }
        BrowserChoice::Auto => {
            resolve(BrowserChoice::Firefox).or_else(|| resolve(BrowserChoice::Edge))
        }
        BrowserChoice::SystemDefault | BrowserChoice::NoBrowser => None,
    }
}

fn find_executable(installs: &[&str], names: &[&str]) -> Option<PathBuf> {
    installs
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .or_else(|| names.iter().find_map(|name| find_on_path(name)))
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        [name.to_string(), format!("{name}.exe")]
            .into_iter()
            .map(|candidate| dir.join(candidate))
            .find(|candidate| candidate.is_file())
    })
}

/// Opens `url` after `delay`.
///
/// A resolved browser is spawned directly and, when `watch` is set, its exit
/// fires `shutdown`. Otherwise the system handler is used and nothing is watched.
pub fn spawn_launcher(
    choice: BrowserChoice,
    url: String,
    delay: Duration,
    watch: bool,
    shutdown: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !choice.opens_window() {
            return;
        }
        tokio::time::sleep(delay).await;

        let Some(launch) = resolve(choice) else {
            open_system(&url);
            return;
        };

        let child = Command::new(&launch.program)
            .args(launch.args)
            .arg(&url)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Could not start {}: {e}", launch.program.display());
                open_system(&url);
                return;
            }
        };

        info!("Opened {url} in {}", launch.program.display());
        if !watch {
            return;
        }

        match child.wait().await {
            Ok(status) => info!("Browser exited ({status}), shutting down"),
            Err(e) => warn!("Lost track of the browser process: {e}"),
        }
        shutdown.notify_one();
    })
}

fn open_system(url: &str) {
    match webbrowser::open(url) {
        Ok(()) => info!("Opened {url} in the default browser"),
        Err(e) => warn!("Could not open a browser, visit {url} manually: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_default_and_none_never_resolve() {
        assert_eq!(resolve(BrowserChoice::SystemDefault), None);
        assert_eq!(resolve(BrowserChoice::NoBrowser), None);
        assert!(!BrowserChoice::NoBrowser.opens_window());
        assert!(BrowserChoice::SystemDefault.opens_window());
    }

    #[test]
    fn missing_binaries_are_not_found() {
        assert_eq!(
            find_executable(&["/definitely/not/here.exe"], &["no-such-browser-xyz"]),
            None
        );
    }

    #[test]
    fn install_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("firefox.exe");
        std::fs::write(&exe, b"").unwrap();
        let install = exe.to_string_lossy().into_owned();

        assert_eq!(find_executable(&[install.as_str()], &[]), Some(exe));
    }

    #[test]
    fn choice_names() {
        assert_eq!(BrowserChoice::Firefox.to_string(), "firefox");
        assert_eq!(BrowserChoice::SystemDefault.to_string(), "default");
        assert_eq!(BrowserChoice::NoBrowser.to_string(), "none");

        for (name, choice) in [
            ("auto", BrowserChoice::Auto),
            ("firefox", BrowserChoice::Firefox),
            ("edge", BrowserChoice::Edge),
            ("default", BrowserChoice::SystemDefault),
            ("system", BrowserChoice::SystemDefault),
            ("none", BrowserChoice::NoBrowser),
        ] {
            assert_eq!(
                serde_json::from_str::<BrowserChoice>(&format!("\"{name}\"")).unwrap(),
                choice
            );
            assert_eq!(BrowserChoice::from_str(name, false).unwrap(), choice);
        }
        assert_eq!(
            serde_json::to_string(&BrowserChoice::NoBrowser).unwrap(),
            "\"none\""
        );
    }
}
