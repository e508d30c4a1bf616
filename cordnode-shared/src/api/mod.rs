use serde::{Deserialize, Serialize};

use crate::domain::{TaskType, UserSettings};
pub use crate::policy::AntiCheatStatus;

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_PREFIX: &str = "/api";

// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDto {
    pub error: String,
    /// Machine-readable reason, e.g. `already_completed`.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfoDto {
    pub version: String,
}

// Users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub discord_id: String,
    pub username: String,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    pub account_age_years: f64,
    pub multiplier: f64,
    pub current_balance: f64,
    pub total_earned: f64,
    pub weekly_earnings: f64,
    pub monthly_earnings: f64,
    pub referral_earnings: f64,
    pub is_node_active: bool,
    pub node_start_time_ms: Option<i64>,
    pub tasks_completed_count: i32,
    pub referral_code: String,
    pub referred_by_user_id: Option<String>,
    pub total_referrals: i32,
    pub daily_check_in_claimed: bool,
    pub last_login_time_ms: i64,
    pub has_badge_of_honor: bool,
}

/// Create-or-login after the Discord OAuth exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserReq {
    pub discord_id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Overrides the creation time decoded from the Discord snowflake.
    #[serde(default)]
    pub account_created_at_ms: Option<i64>,
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserResp {
    pub user: UserDto,
    pub created: bool,
    pub referral: Option<ReferralResultDto>,
    /// Reason the supplied referral code was not applied, if any.
    pub referral_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserReq {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusDto {
    pub user_id: String,
    pub is_node_active: bool,
    pub node_start_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntryDto {
    pub rank: u32,
    pub user_id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub total_earned: f64,
    pub multiplier: f64,
    pub has_badge_of_honor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsDto {
    pub total_users: i64,
    pub active_nodes: i64,
    pub total_earned: f64,
    pub total_sessions: i64,
    pub total_tasks_completed: i64,
}

// Tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward: f64,
    pub task_type: TaskType,
    pub max_progress: i32,
    pub social_url: Option<String>,
    pub expires_at: Option<String>, // RFC3339 UTC
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTaskDto {
    #[serde(flatten)]
    pub task: TaskDto,
    pub progress: i32,
    pub completed: bool,
    /// Whether a claim would currently be accepted.
    pub claimable: bool,
    pub claimed_at: Option<String>, // RFC3339 UTC
    pub reward_claimed: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteTaskReq {
    /// Client-side estimate; the server computes the credited amount.
    #[serde(default)]
    pub reward_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskResp {
    pub success: bool,
    pub new_balance: Option<f64>,
    pub reward: Option<f64>,
    pub error: Option<String>,
}

// Mining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningSessionDto {
    pub id: i32,
    pub user_id: String,
    pub start_time: String,       // RFC3339 UTC
    pub end_time: Option<String>, // RFC3339 UTC
    pub earnings: f64,
    pub hash_rate: f64,
    pub efficiency: f64,
    pub last_flush_seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMiningResp {
    pub session: MiningSessionDto,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEarningsReq {
    pub earnings_to_add: f64,
    /// Monotonic per session; a replayed sequence number is acknowledged
    /// without crediting again.
    pub flush_seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEarningsResp {
    pub session_id: i32,
    pub credited: f64,
    pub session_earnings: f64,
    pub current_balance: f64,
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndSessionReq {
    pub final_earnings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndSessionResp {
    pub session: MiningSessionDto,
    pub credited: f64,
    pub current_balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSessionReq {
    #[serde(default)]
    pub hash_rate: Option<f64>,
    #[serde(default)]
    pub efficiency: Option<f64>,
}

// Referrals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemReferralReq {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralResultDto {
    pub referrer_id: String,
    pub welcome_bonus: f64,
    pub referrer_bonus: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralEntryDto {
    pub referred_user_id: String,
    pub username: String,
    pub code: String,
    pub total_earnings: f64,
    pub created_at: String, // RFC3339 UTC
}

// Settings are exchanged as the domain type itself
pub type SettingsDto = UserSettings;

// Badge of honor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgePurchaseReq {
    pub user_id: String,
    pub wallet_address: String,
    pub transaction_hash: String,
    pub amount_sol: f64,
    pub amount_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgePurchaseResp {
    pub id: i32,
    pub user_id: String,
    pub transaction_hash: String,
    pub has_badge_of_honor: bool,
}
