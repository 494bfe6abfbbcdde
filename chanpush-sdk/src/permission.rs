//! Notification permission: the process-wide state and where it lives.
//!
//! Both notification paths read the permission through a [`PermissionStore`]
//! on every decision. Neither keeps a copy, so the foreground loop and the
//! push listener never need to coordinate.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user has not been asked, or dismissed the prompt.
    #[default]
    Default,
    Granted,
    Denied,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        })
    }
}

/// The authoritative permission value.
pub trait PermissionStore: Send + Sync {
    fn current(&self) -> PermissionState;
    fn set(&self, state: PermissionState) -> Result<()>;
}

/// Asks the user for notification permission.
///
/// `prompt` only shows the question. The answer comes back later through
/// [`crate::notify::NotificationDispatcher::resolve_permission`].
pub trait PermissionPrompt: Send {
    fn prompt(&mut self);
}

/// Process-local store, for tests and embedders without a settings file.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    state: RwLock<PermissionState>,
}

impl MemoryPermissionStore {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn current(&self) -> PermissionState {
        *self.state.read()
    }

    fn set(&self, state: PermissionState) -> Result<()> {
        *self.state.write() = state;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PermissionFile {
    permission: PermissionState,
}

/// Permission persisted as `{"permission": "..."}` and re-read on every
/// access, so separate processes share one value.
#[derive(Debug, Clone)]
pub struct FilePermissionStore {
    path: PathBuf,
}

impl FilePermissionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/chanpush/permission.json`.
    pub fn default_location() -> Self {
        let dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join("chanpush").join("permission.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<PermissionState> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let file: PermissionFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(file.permission)
    }
}

impl PermissionStore for FilePermissionStore {
    fn current(&self) -> PermissionState {
        if !self.path.exists() {
            return PermissionState::Default;
        }
        match self.read() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("unreadable permission file, treating as default: {e:#}");
                PermissionState::Default
            }
        }
    }

    fn set(&self, state: PermissionState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let body = serde_json::to_string_pretty(&PermissionFile { permission: state })?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("writing {}", self.path.display()))?;
        tracing::info!(%state, path = %self.path.display(), "notification permission saved");
        Ok(())
    }
}
