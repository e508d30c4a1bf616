use crate::storage::schema::{
    badge_purchases, ip_links, mining_sessions, referral_data, tasks, user_settings, user_tasks,
    users,
};
use chrono::NaiveDateTime;
use cordnode_shared::domain::{ProgressSource, TaskType};
use diesel::prelude::*;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
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
    pub node_started_at: Option<NaiveDateTime>,
    pub tasks_completed_count: i32,
    pub referral_code: String,
    pub referred_by_user_id: Option<String>,
    pub total_referrals: i32,
    pub daily_check_in_claimed: bool,
    pub last_login_at: NaiveDateTime,
    pub has_badge_of_honor: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub discord_id: &'a str,
    pub username: &'a str,
    pub discriminator: Option<&'a str>,
    pub avatar: Option<&'a str>,
    pub account_age_years: f64,
    pub multiplier: f64,
    pub referral_code: &'a str,
    pub last_login_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward: f64,
    pub task_type: String,
    pub max_progress: i32,
    pub progress_source: String,
    pub social_url: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
}

impl Task {
    /// Unknown strings (a row written by a newer build) degrade to the most
    /// conservative reading instead of failing the whole listing.
    pub fn kind(&self) -> TaskType {
        self.task_type.parse().unwrap_or(TaskType::Achievement)
    }

    pub fn source(&self) -> ProgressSource {
        self.progress_source.parse().unwrap_or_default()
    }
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub reward: f64,
    pub task_type: &'a str,
    pub max_progress: i32,
    pub progress_source: &'a str,
    pub social_url: Option<&'a str>,
    pub expires_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = user_tasks)]
#[diesel(belongs_to(User, foreign_key = user_id))]
#[diesel(belongs_to(Task, foreign_key = task_id))]
pub struct UserTask {
    pub id: i32,
    pub user_id: String,
    pub task_id: String,
    pub completed: bool,
    pub progress: i32,
    pub claimed_at: Option<NaiveDateTime>,
    pub reward: f64,
}

#[derive(Insertable)]
#[diesel(table_name = user_tasks)]
pub struct NewUserTask<'a> {
    pub user_id: &'a str,
    pub task_id: &'a str,
    pub completed: bool,
    pub progress: i32,
    pub claimed_at: Option<NaiveDateTime>,
    pub reward: f64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = mining_sessions)]
#[diesel(belongs_to(User, foreign_key = user_id))]
pub struct MiningSession {
    pub id: i32,
    pub user_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub earnings: f64,
    pub hash_rate: f64,
    pub efficiency: f64,
    pub last_flush_at: NaiveDateTime,
    pub last_flush_seq: i64,
}

#[derive(Insertable)]
#[diesel(table_name = mining_sessions)]
pub struct NewMiningSession<'a> {
    pub user_id: &'a str,
    pub start_time: NaiveDateTime,
    pub efficiency: f64,
    pub last_flush_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = referral_data)]
pub struct ReferralData {
    pub id: i32,
    pub referrer_id: String,
    pub referred_id: String,
    pub code: String,
    pub total_earnings: f64,
    pub total_referrals: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = referral_data)]
pub struct NewReferralData<'a> {
    pub referrer_id: &'a str,
    pub referred_id: &'a str,
    pub code: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = user_settings)]
#[diesel(primary_key(user_id))]
pub struct UserSettingsRow {
    pub user_id: String,
    pub settings_json: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = user_settings)]
pub struct NewUserSettings<'a> {
    pub user_id: &'a str,
    pub settings_json: &'a str,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = badge_purchases)]
#[diesel(belongs_to(User, foreign_key = user_id))]
pub struct BadgePurchase {
    pub id: i32,
    pub user_id: String,
    pub wallet_address: String,
    pub transaction_hash: String,
    pub amount_sol: f64,
    pub amount_usd: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = badge_purchases)]
pub struct NewBadgePurchase<'a> {
    pub user_id: &'a str,
    pub wallet_address: &'a str,
    pub transaction_hash: &'a str,
    pub amount_sol: f64,
    pub amount_usd: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ip_links)]
pub struct NewIpLink<'a> {
    pub ip: &'a str,
    pub user_id: &'a str,
    pub last_seen: NaiveDateTime,
}
