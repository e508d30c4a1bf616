use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl FromStr for UserId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(UserId(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Daily,
    Weekly,
    Social,
    Achievement,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Daily => "daily",
            TaskType::Weekly => "weekly",
            TaskType::Social => "social",
            TaskType::Achievement => "achievement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl FromStr for TaskType {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(TaskType::Daily),
            "weekly" => Ok(TaskType::Weekly),
            "social" => Ok(TaskType::Social),
            "achievement" => Ok(TaskType::Achievement),
            other => Err(ParseEnumError {
                kind: "task type",
                value: other.to_string(),
            }),
        }
    }
}

/// Where a task's live progress comes from when it is evaluated for a claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    /// Completed by the user's own action (e.g. following a social link).
    #[default]
    Manual,
    /// Seconds spent mining; daily and weekly tasks count only their period.
    MiningUptime,
    /// Current weekly earnings, in whole CORD.
    WeeklyEarnings,
    /// Number of users referred.
    Referrals,
    /// Discord account age in whole years.
    AccountAge,
    /// Number of completed social tasks.
    SocialCompleted,
    /// Recurring daily check-in, gated on calendar day rollover.
    DailyCheckIn,
}

impl ProgressSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressSource::Manual => "manual",
            ProgressSource::MiningUptime => "mining_uptime",
            ProgressSource::WeeklyEarnings => "weekly_earnings",
            ProgressSource::Referrals => "referrals",
            ProgressSource::AccountAge => "account_age",
            ProgressSource::SocialCompleted => "social_completed",
            ProgressSource::DailyCheckIn => "daily_check_in",
        }
    }
}

impl FromStr for ProgressSource {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ProgressSource::Manual),
            "mining_uptime" => Ok(ProgressSource::MiningUptime),
            "weekly_earnings" => Ok(ProgressSource::WeeklyEarnings),
            "referrals" => Ok(ProgressSource::Referrals),
            "account_age" => Ok(ProgressSource::AccountAge),
            "social_completed" => Ok(ProgressSource::SocialCompleted),
            "daily_check_in" => Ok(ProgressSource::DailyCheckIn),
            other => Err(ParseEnumError {
                kind: "progress source",
                value: other.to_string(),
            }),
        }
    }
}

fn one() -> i32 {
    1
}

/// Global task template as declared in the server config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub reward: f64,
    pub task_type: TaskType,
    #[serde(default = "one")]
    pub max_progress: i32,
    #[serde(default)]
    pub progress_source: ProgressSource,
    #[serde(default)]
    pub social_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileVisibility {
    #[default]
    Public,
    Friends,
    Private,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningIntensity {
    Low,
    #[default]
    Balanced,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub mining_updates: bool,
    pub task_reminders: bool,
    pub referral_activity: bool,
    pub email_digest: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            mining_updates: true,
            task_reminders: true,
            referral_activity: true,
            email_digest: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacySettings {
    pub show_on_leaderboard: bool,
    pub profile_visibility: ProfileVisibility,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            show_on_leaderboard: true,
            profile_visibility: ProfileVisibility::Public,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningSettings {
    pub auto_start: bool,
    pub intensity: MiningIntensity,
    pub flush_on_background: bool,
}

impl Default for MiningSettings {
    fn default() -> Self {
        Self {
            auto_start: false,
            intensity: MiningIntensity::Balanced,
            flush_on_background: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub theme: Theme,
    pub compact_mode: bool,
    pub show_hash_rate: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            compact_mode: false,
            show_hash_rate: true,
        }
    }
}

/// Per-user preferences. Missing groups or keys fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub notifications: NotificationSettings,
    pub privacy: PrivacySettings,
    pub mining: MiningSettings,
    pub display: DisplaySettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_defaults_apply_when_omitted() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "id": "follow-x",
            "title": "Follow us",
            "reward": 5.0,
            "task_type": "social",
            "social_url": "https://x.com/cordnode"
        }))
        .unwrap();
        assert_eq!(task.max_progress, 1);
        assert_eq!(task.progress_source, ProgressSource::Manual);
        assert!(task.expires_at.is_none());
    }

    #[test]
    fn progress_source_string_form_is_stable() {
        for src in [
            ProgressSource::Manual,
            ProgressSource::MiningUptime,
            ProgressSource::WeeklyEarnings,
            ProgressSource::Referrals,
            ProgressSource::AccountAge,
            ProgressSource::SocialCompleted,
            ProgressSource::DailyCheckIn,
        ] {
            assert_eq!(src.as_str().parse::<ProgressSource>().unwrap(), src);
        }
        assert!("weekly".parse::<ProgressSource>().is_err());
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let s: UserSettings = serde_json::from_value(serde_json::json!({
            "privacy": { "show_on_leaderboard": false },
            "display": { "theme": "light" }
        }))
        .unwrap();
        assert!(!s.privacy.show_on_leaderboard);
        assert_eq!(s.privacy.profile_visibility, ProfileVisibility::Public);
        assert_eq!(s.display.theme, Theme::Light);
        assert!(s.notifications.mining_updates);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let res: Result<UserSettings, _> = serde_json::from_value(serde_json::json!({
            "display": { "theme": "neon" }
        }));
        assert!(res.is_err());
    }
}
