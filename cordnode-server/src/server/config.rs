use cordnode_shared::domain::Task;
use cordnode_shared::policy;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

use crate::ledger::LedgerRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub mining: MiningConfig,
    #[serde(default)]
    pub anti_cheat: AntiCheatConfig,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    /// Share of every task reward (and, if enabled, mining credit) paid to
    /// the earner's referrer.
    pub commission_rate: f64,
    /// Share of the welcome bonus paid once to the referrer at signup.
    pub signup_commission_rate: f64,
    pub commission_on_mining: bool,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        let rules = LedgerRules::default();
        Self {
            commission_rate: rules.commission_rate,
            signup_commission_rate: rules.signup_commission_rate,
            commission_on_mining: rules.commission_on_mining,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Extra seconds of accrual tolerated per flush for clock skew and
    /// network delay.
    pub grace_secs: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            grace_secs: LedgerRules::default().mining_grace_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    pub window_hours: i64,
    pub efficiency_floor: f64,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            window_hours: LedgerRules::default().anti_cheat_window_hours,
            efficiency_floor: policy::DEFAULT_EFFICIENCY_FLOOR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let rate_ok = |r: f64| r.is_finite() && (0.0..=1.0).contains(&r);
        if !rate_ok(self.referral.commission_rate) || !rate_ok(self.referral.signup_commission_rate)
        {
            return Err(ConfigError::Invalid(
                "referral rates must be within 0..=1".into(),
            ));
        }
        if !rate_ok(self.anti_cheat.efficiency_floor) {
            return Err(ConfigError::Invalid(
                "anti_cheat.efficiency_floor must be within 0..=1".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for t in &self.tasks {
            if !seen.insert(t.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate task id: {}", t.id)));
            }
            if !(t.reward.is_finite() && t.reward >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "task {} has an invalid reward",
                    t.id
                )));
            }
        }
        Ok(())
    }

    pub fn ledger_rules(&self) -> LedgerRules {
        LedgerRules {
            commission_rate: self.referral.commission_rate,
            signup_commission_rate: self.referral.signup_commission_rate,
            commission_on_mining: self.referral.commission_on_mining,
            mining_grace_secs: self.mining.grace_secs,
            efficiency_floor: self.anti_cheat.efficiency_floor,
            anti_cheat_window_hours: self.anti_cheat.window_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cordnode_shared::domain::{ProgressSource, TaskType};

    const SAMPLE: &str = r#"
listen_port: 5252
referral:
  commission_rate: 0.05
tasks:
  - id: daily-check-in
    title: Daily check-in
    reward: 5
    task_type: daily
    progress_source: daily_check_in
  - id: join-discord
    title: Join the Discord
    description: Hop into the server
    reward: 10
    task_type: social
    social_url: https://discord.gg/cordnode
"#;

    #[test]
    fn parses_with_defaults() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.listen_port, Some(5252));
        assert_eq!(cfg.tasks.len(), 2);
        assert_eq!(cfg.tasks[0].task_type, TaskType::Daily);
        assert_eq!(cfg.tasks[0].progress_source, ProgressSource::DailyCheckIn);
        assert_eq!(cfg.tasks[1].progress_source, ProgressSource::Manual);
        assert_eq!(cfg.tasks[1].max_progress, 1);

        let rules = cfg.ledger_rules();
        assert_eq!(rules.commission_rate, 0.05);
        assert_eq!(rules.signup_commission_rate, 0.10);
        assert!(!rules.commission_on_mining);
        assert_eq!(rules.mining_grace_secs, 30);
        assert_eq!(rules.efficiency_floor, 0.25);
    }

    #[test]
    fn rejects_bad_rates_and_duplicate_tasks() {
        let bad_rate = "referral:\n  commission_rate: 1.5\n";
        assert!(matches!(
            AppConfig::from_yaml(bad_rate),
            Err(ConfigError::Invalid(_))
        ));
        let dup = r#"
tasks:
  - {id: a, title: A, reward: 1, task_type: daily}
  - {id: a, title: B, reward: 2, task_type: weekly}
"#;
        assert!(matches!(
            AppConfig::from_yaml(dup),
            Err(ConfigError::Invalid(_))
        ));
    }
}
