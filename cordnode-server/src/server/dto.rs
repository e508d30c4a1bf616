use cordnode_shared::api;

use crate::ledger::{to_epoch_ms, to_rfc3339};
use crate::storage::models::{MiningSession, ReferralData, Task, User};
use crate::storage::{FlushReceipt, UserTaskView};

pub fn user(u: User) -> api::UserDto {
    api::UserDto {
        id: u.id,
        discord_id: u.discord_id,
        username: u.username,
        discriminator: u.discriminator,
        avatar: u.avatar,
        account_age_years: u.account_age_years,
        multiplier: u.multiplier,
        current_balance: u.current_balance,
        total_earned: u.total_earned,
        weekly_earnings: u.weekly_earnings,
        monthly_earnings: u.monthly_earnings,
        referral_earnings: u.referral_earnings,
        is_node_active: u.is_node_active,
        node_start_time_ms: u.node_started_at.map(to_epoch_ms),
        tasks_completed_count: u.tasks_completed_count,
        referral_code: u.referral_code,
        referred_by_user_id: u.referred_by_user_id,
        total_referrals: u.total_referrals,
        daily_check_in_claimed: u.daily_check_in_claimed,
        last_login_time_ms: to_epoch_ms(u.last_login_at),
        has_badge_of_honor: u.has_badge_of_honor,
    }
}

pub fn node_status(u: &User) -> api::NodeStatusDto {
    api::NodeStatusDto {
        user_id: u.id.clone(),
        is_node_active: u.is_node_active,
        node_start_time_ms: u.node_started_at.map(to_epoch_ms),
    }
}

pub fn leaderboard_entry(rank: u32, u: User) -> api::LeaderboardEntryDto {
    api::LeaderboardEntryDto {
        rank,
        user_id: u.id,
        username: u.username,
        avatar: u.avatar,
        total_earned: u.total_earned,
        multiplier: u.multiplier,
        has_badge_of_honor: u.has_badge_of_honor,
    }
}

pub fn task(t: Task) -> api::TaskDto {
    api::TaskDto {
        task_type: t.kind(),
        id: t.id,
        title: t.title,
        description: t.description,
        reward: t.reward,
        max_progress: t.max_progress,
        social_url: t.social_url,
        expires_at: t.expires_at.map(to_rfc3339),
    }
}

pub fn user_task(v: UserTaskView) -> api::UserTaskDto {
    api::UserTaskDto {
        task: task(v.task),
        progress: v.progress,
        completed: v.completed,
        claimable: v.claimable,
        claimed_at: v.claimed_at.map(to_rfc3339),
        reward_claimed: v.reward_claimed,
    }
}

pub fn session(s: MiningSession) -> api::MiningSessionDto {
    api::MiningSessionDto {
        id: s.id,
        user_id: s.user_id,
        start_time: to_rfc3339(s.start_time),
        end_time: s.end_time.map(to_rfc3339),
        earnings: s.earnings,
        hash_rate: s.hash_rate,
        efficiency: s.efficiency,
        last_flush_seq: s.last_flush_seq,
    }
}

pub fn save_receipt(r: FlushReceipt, duplicate: bool) -> api::SaveEarningsResp {
    api::SaveEarningsResp {
        session_id: r.session.id,
        credited: r.credited,
        session_earnings: r.session.earnings,
        current_balance: r.current_balance,
        duplicate,
    }
}

pub fn referral_entry(r: ReferralData, username: String) -> api::ReferralEntryDto {
    api::ReferralEntryDto {
        referred_user_id: r.referred_id,
        username,
        code: r.code,
        total_earnings: r.total_earnings,
        created_at: to_rfc3339(r.created_at),
    }
}
