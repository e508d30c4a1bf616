use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use cordnode_shared::api::UserDto;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::AppError;
use crate::mining::{MiningSnapshot, UnsentEarnings};

pub fn default_cache_path() -> Option<PathBuf> {
    Some(crate::config::project_dirs()?.data_dir().join("session.yaml"))
}

/// Last known ledger figures, kept on disk so status survives restarts and
/// offline periods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCache {
    pub user_id: Option<String>,
    pub session_id: Option<i32>,
    pub session_earnings: f64,
    pub current_balance: f64,
    pub total_earned: f64,
    pub weekly_earnings: f64,
    pub monthly_earnings: f64,
    pub referral_earnings: f64,
    /// Earnings the server never confirmed, resent when the session resumes.
    pub unsent: Option<UnsentEarnings>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionCache {
    /// A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(AppError::Io(e)),
        };
        serde_yaml::from_str(&data)
            .map_err(|e| AppError::Config(format!("parse {} failed: {e}", path.display())))
    }

    /// Writes through a temp file in the same directory, then renames.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let data = serde_yaml::to_string(self)
            .map_err(|e| AppError::Config(format!("serialize cache failed: {e}")))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.persist(path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }

    /// Merges server figures, keeping the larger of local and server for
    /// every balance field. A different user replaces the cache entirely.
    pub fn reconcile(&mut self, server: &UserDto) {
        if self.user_id.as_deref() != Some(server.id.as_str()) {
            *self = Self {
                user_id: Some(server.id.clone()),
                ..Self::default()
            };
        }
        self.current_balance = self.current_balance.max(server.current_balance);
        self.total_earned = self.total_earned.max(server.total_earned);
        self.weekly_earnings = self.weekly_earnings.max(server.weekly_earnings);
        self.monthly_earnings = self.monthly_earnings.max(server.monthly_earnings);
        self.referral_earnings = self.referral_earnings.max(server.referral_earnings);
        self.updated_at = Some(Utc::now());
    }

    pub fn record(&mut self, snap: &MiningSnapshot) {
        self.session_id = snap.session_id;
        self.session_earnings = snap.display_total;
        self.unsent = snap.unsent.clone();
        if let Some(b) = snap.balance {
            self.current_balance = self.current_balance.max(b);
        }
        self.updated_at = Some(Utc::now());
    }

    /// Keeps what a detached node could not deliver.
    pub fn keep_unsent(&mut self, unsent: UnsentEarnings) {
        self.session_id = Some(unsent.session_id);
        self.unsent = Some(unsent);
        self.updated_at = Some(Utc::now());
    }

    /// Unsent earnings recorded for `user_id`, if any.
    pub fn unsent_for(&self, user_id: &str) -> Option<UnsentEarnings> {
        self.unsent.clone().filter(|u| u.user_id == user_id)
    }
}
