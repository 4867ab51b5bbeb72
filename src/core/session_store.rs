// Persisted login state: the bearer token attached to scoring requests

use crate::core::config::ConfigResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StoredSession {
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents; a missing file is an empty session
    pub fn read(&self) -> ConfigResult<StoredSession> {
        if !self.path.exists() {
            return Ok(StoredSession::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Token for the next request. Read fresh each time; unreadable state
    /// means no credential rather than a failed submission.
    pub fn access_token(&self) -> Option<String> {
        match self.read() {
            Ok(session) => session.access_token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Ignoring unreadable session store {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.read().ok().and_then(|s| s.user_id)
    }

    pub fn set_token(&self, token: &str, user_id: Option<&str>) -> ConfigResult<()> {
        let mut session = self.read().unwrap_or_default();
        session.access_token = Some(token.to_string());
        if let Some(user_id) = user_id {
            session.user_id = Some(user_id.to_string());
        }
        session.updated_at = Some(Utc::now());
        self.write(&session)
    }

    pub fn clear(&self) -> ConfigResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write(&self, session: &StoredSession) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }
}
