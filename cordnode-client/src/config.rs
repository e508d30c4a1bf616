use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::AppError;

pub const ENV_CONFIG: &str = "CORDNODE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub user_id: String,
    #[serde(default)]
    pub mining: MiningTiming,
    /// Where the local session cache lives. Defaults to the platform data dir.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

/// Cadences of the node's background work, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningTiming {
    pub accrual_secs: u64,
    pub flush_secs: u64,
    pub anti_cheat_secs: u64,
    pub anti_cheat_min_gap_secs: u64,
    pub sync_secs: u64,
}

impl Default for MiningTiming {
    fn default() -> Self {
        Self {
            accrual_secs: 1,
            flush_secs: 10,
            anti_cheat_secs: 30 * 60,
            anti_cheat_min_gap_secs: 5 * 60,
            sync_secs: 60,
        }
    }
}

impl MiningTiming {
    pub fn accrual(&self) -> Duration {
        Duration::from_secs(self.accrual_secs.max(1))
    }
    pub fn flush(&self) -> Duration {
        Duration::from_secs(self.flush_secs.max(1))
    }
    pub fn anti_cheat(&self) -> Duration {
        Duration::from_secs(self.anti_cheat_secs.max(1))
    }
    pub fn anti_cheat_min_gap(&self) -> Duration {
        Duration::from_secs(self.anti_cheat_min_gap_secs)
    }
    pub fn sync(&self) -> Duration {
        Duration::from_secs(self.sync_secs.max(1))
    }
}

impl ClientConfig {
    pub fn find_and_load(cli_value: Option<PathBuf>) -> Result<(PathBuf, Self), AppError> {
        let path = resolve_config_path(cli_value)?;
        let cfg = load_config(&path)?;
        Ok((path, cfg))
    }

    pub fn base_url(&self) -> String {
        normalize_server_url(&self.server_url)
    }

    pub fn resolved_cache_path(&self) -> Result<PathBuf, AppError> {
        match &self.cache_path {
            Some(p) => Ok(p.clone()),
            None => crate::cache::default_cache_path()
                .ok_or_else(|| AppError::Config("could not determine data dir".into())),
        }
    }
}

pub fn resolve_config_path(cli_value: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(p) = cli_value {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(p));
    }
    default_config_path().ok_or_else(|| AppError::Config("could not determine config dir".into()))
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "cordnode", "cordnode")
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(project_dirs()?.config_dir().join("client.yaml"))
}

pub fn load_config(path: &Path) -> Result<ClientConfig, AppError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("read {} failed: {e}", path.display())))?;
    let cfg: ClientConfig = serde_yaml::from_str(&data)
        .map_err(|e| AppError::Config(format!("parse {} failed: {e}", path.display())))?;
    if cfg.user_id.trim().is_empty() {
        return Err(AppError::Config(format!(
            "{}: user_id is empty; run `cordnode-client login` first",
            path.display()
        )));
    }
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &ClientConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let data = serde_yaml::to_string(cfg)
        .map_err(|e| AppError::Config(format!("serialize config failed: {e}")))?;
    std::fs::write(path, data)
        .map_err(|e| AppError::Config(format!("write {} failed: {e}", path.display())))
}

pub fn normalize_server_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", trimmed.trim_end_matches('/'))
    }
}
