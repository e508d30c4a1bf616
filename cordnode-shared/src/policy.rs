//! Reward arithmetic shared by the server ledger and the mining client.
//!
//! Everything here is pure: no clocks, no I/O. Callers pass timestamps in.

use serde::{Deserialize, Serialize};

/// Nominal mining throughput before multiplier and anti-cheat efficiency.
pub const BASE_RATE_PER_MINUTE: f64 = 0.5;

/// `(exclusive upper bound in years, multiplier)`; ages past the last bound
/// get [`MAX_MULTIPLIER`].
const MULTIPLIER_TIERS: [(f64, f64); 8] = [
    (1.0, 1.0),
    (2.0, 1.2),
    (3.0, 1.5),
    (4.0, 2.0),
    (5.0, 2.5),
    (6.0, 3.5),
    (7.0, 5.0),
    (8.0, 7.0),
];

pub const MAX_MULTIPLIER: f64 = 10.0;

/// Reward multiplier for a Discord account of the given age.
pub fn multiplier(account_age_years: f64) -> f64 {
    if account_age_years.is_nan() || account_age_years < 0.0 {
        return 1.0;
    }
    MULTIPLIER_TIERS
        .iter()
        .find(|(upper, _)| account_age_years < *upper)
        .map(|(_, m)| *m)
        .unwrap_or(MAX_MULTIPLIER)
}

/// Per-second accrual for a running node.
pub fn accrual_per_second(multiplier: f64, efficiency: f64) -> f64 {
    BASE_RATE_PER_MINUTE * multiplier.max(0.0) * clamp_efficiency(efficiency, 0.0) / 60.0
}

pub const DEFAULT_EFFICIENCY_FLOOR: f64 = 0.25;
pub const MAX_PENALTY_LEVEL: u8 = 3;
const PENALTY_EFFICIENCY: [f64; 3] = [1.0, 0.75, 0.5];

/// Anti-cheat verdict for one user, derived from how many other accounts were
/// seen on the same IP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntiCheatStatus {
    pub other_accounts: u32,
    pub penalty_level: u8,
    pub efficiency_multiplier: f64,
}

impl AntiCheatStatus {
    pub fn clean() -> Self {
        Self {
            other_accounts: 0,
            penalty_level: 0,
            efficiency_multiplier: 1.0,
        }
    }

    pub fn from_other_accounts(other_accounts: u32, floor: f64) -> Self {
        let penalty_level = penalty_level(other_accounts);
        Self {
            other_accounts,
            penalty_level,
            efficiency_multiplier: efficiency_for(penalty_level, floor),
        }
    }
}

impl Default for AntiCheatStatus {
    fn default() -> Self {
        Self::clean()
    }
}

pub fn penalty_level(other_accounts: u32) -> u8 {
    other_accounts.min(MAX_PENALTY_LEVEL as u32) as u8
}

/// Efficiency for a penalty level: never above 1.0, never below `floor`.
pub fn efficiency_for(penalty_level: u8, floor: f64) -> f64 {
    let raw = PENALTY_EFFICIENCY
        .get(penalty_level as usize)
        .copied()
        .unwrap_or(0.0);
    clamp_efficiency(raw, floor)
}

fn clamp_efficiency(value: f64, floor: f64) -> f64 {
    let floor = if floor.is_finite() {
        floor.clamp(0.0, 1.0)
    } else {
        DEFAULT_EFFICIENCY_FLOOR
    };
    if value.is_nan() {
        return floor;
    }
    value.clamp(floor, 1.0)
}

pub const WELCOME_BASE: f64 = 10.0;
pub const WELCOME_PER_YEAR: f64 = 10.0;
/// Launch promotion: welcome bonuses are doubled.
pub const WELCOME_PROMO_FACTOR: f64 = 2.0;

/// One-time bonus a referred user receives on redeeming a referral code.
pub fn welcome_bonus(account_age_years: f64, multiplier: f64) -> f64 {
    let age = if account_age_years.is_finite() {
        account_age_years.max(0.0)
    } else {
        0.0
    };
    (WELCOME_BASE + WELCOME_PER_YEAR * age) * multiplier * WELCOME_PROMO_FACTOR
}

/// Discord snowflakes count milliseconds from 2015-01-01T00:00:00Z.
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
const MS_PER_YEAR: f64 = 365.25 * 86_400_000.0;

/// Account creation time (epoch ms) encoded in a Discord user id.
pub fn snowflake_created_at_ms(discord_id: &str) -> Option<i64> {
    let raw: u64 = discord_id.trim().parse().ok()?;
    Some((raw >> 22) as i64 + DISCORD_EPOCH_MS)
}

pub fn account_age_years(created_at_ms: i64, now_ms: i64) -> f64 {
    (now_ms.saturating_sub(created_at_ms) as f64 / MS_PER_YEAR).max(0.0)
}
