//! Persistent configuration for the chanpush CLI.
//!
//! Config file lives at `~/.config/chanpush/cli.toml`.
//! Session state (last channel followed) at `~/.config/chanpush/session.toml`.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Default server origin.
pub const DEFAULT_SERVER: &str = "http://localhost:8000";

/// User configuration (persisted in cli.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Server HTTP origin. Default: http://localhost:8000
    pub server: Option<String>,
    /// Channel to follow when `listen` is run without `--channel`.
    pub channel: Option<String>,
    /// Icon reference attached to push notifications.
    pub icon: Option<String>,
    /// Ring the terminal bell on notifications.
    pub bell: Option<bool>,
    /// Also run the background push listener under `listen`.
    pub push: Option<bool>,
}

/// Session state saved on quit, restored on start.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Session {
    /// Last channel followed.
    pub channel: Option<String>,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chanpush")
}

fn config_path() -> PathBuf {
    config_dir().join("cli.toml")
}

fn session_path() -> PathBuf {
    config_dir().join("session.toml")
}

fn load_toml<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str(&s) {
                Ok(c) => return c,
                Err(e) => tracing::warn!(path = %path.display(), "bad {what} file: {e}"),
            },
            Err(e) => tracing::warn!(path = %path.display(), "can't read {what} file: {e}"),
        }
    }
    T::default()
}

fn save_toml<T: Serialize>(value: &T, path: &Path, what: &str) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    match toml::to_string_pretty(value) {
        Ok(s) => {
            if let Err(e) = std::fs::write(path, s) {
                tracing::warn!(path = %path.display(), "can't save {what}: {e}");
            }
        }
        Err(e) => tracing::warn!("can't serialize {what}: {e}"),
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        load_toml(path, "config")
    }
}

impl Session {
    pub fn load() -> Self {
        Self::load_from(&session_path())
    }

    pub fn load_from(path: &Path) -> Self {
        load_toml(path, "session")
    }

    pub fn save(&self) {
        self.save_to(&session_path());
    }

    pub fn save_to(&self, path: &Path) {
        save_toml(self, path, "session");
    }
}

/// Effective settings after merging every source.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub server: String,
    pub channel: Option<String>,
    pub icon: Option<String>,
    pub bell: bool,
    pub push: bool,
}

impl Resolved {
    /// Merge: CLI overrides > config file > session state > defaults.
    pub fn merge(cli: &super::Cli, config: &Config, session: &Session) -> Self {
        let server = cli
            .server
            .clone()
            .or_else(|| config.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let channel = cli
            .command
            .channel()
            .map(str::to_string)
            .or_else(|| config.channel.clone())
            .or_else(|| session.channel.clone());
        Self {
            server,
            channel,
            icon: config.icon.clone(),
            bell: config.bell.unwrap_or(true),
            push: !cli.no_push && config.push.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_beats_config_beats_session() {
        let cli = crate::Cli::parse_from([
            "chanpush",
            "--server",
            "http://cli:1",
            "listen",
            "--channel",
            "tech",
        ]);
        let config = Config {
            server: Some("http://file:2".into()),
            channel: Some("news".into()),
            ..Default::default()
        };
        let session = Session {
            channel: Some("sports".into()),
        };
        let resolved = Resolved::merge(&cli, &config, &session);
        assert_eq!(resolved.server, "http://cli:1");
        assert_eq!(resolved.channel.as_deref(), Some("tech"));

        let cli = crate::Cli::parse_from(["chanpush", "listen"]);
        let resolved = Resolved::merge(&cli, &config, &session);
        assert_eq!(resolved.server, "http://file:2");
        assert_eq!(resolved.channel.as_deref(), Some("news"));

        let resolved = Resolved::merge(&cli, &Config::default(), &session);
        assert_eq!(resolved.server, DEFAULT_SERVER);
        assert_eq!(resolved.channel.as_deref(), Some("sports"));
        assert!(resolved.bell);
        assert!(resolved.push);
    }

    #[test]
    fn no_push_flag_disables_listener() {
        let cli = crate::Cli::parse_from(["chanpush", "--no-push", "listen"]);
        let resolved = Resolved::merge(&cli, &Config::default(), &Session::default());
        assert!(!resolved.push);
    }

    #[test]
    fn bad_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(&path, "server = [").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        assert_eq!(Config::load_from(&dir.path().join("missing.toml")), Config::default());
    }

    #[test]
    fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.toml");
        let session = Session {
            channel: Some("general".into()),
        };
        session.save_to(&path);
        assert_eq!(Session::load_from(&path), session);
    }

    #[test]
    fn unwritable_session_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let path = blocker.join("session.toml");
        Session {
            channel: Some("general".into()),
        }
        .save_to(&path);
        assert_eq!(Session::load_from(&path), Session::default());
    }
}
