//! Accounting rules applied by the storage layer inside its transactions.

use chrono::{DateTime, NaiveDateTime, Utc};
use cordnode_shared::policy;

/// Rates and limits the ledger applies. Built from the `referral`, `mining`
/// and `anti_cheat` sections of the server config.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRules {
    /// Share of every counted earning paid to the earner's referrer.
    pub commission_rate: f64,
    /// Share of a new user's welcome bonus paid once to the referrer.
    pub signup_commission_rate: f64,
    /// Whether mining flushes pay ongoing referral commission.
    pub commission_on_mining: bool,
    /// Slack added to a session's elapsed time when clamping its total.
    pub mining_grace_secs: u64,
    pub efficiency_floor: f64,
    /// How long an IP sighting counts towards the shared-IP penalty.
    pub anti_cheat_window_hours: i64,
}

impl Default for LedgerRules {
    fn default() -> Self {
        Self {
            commission_rate: 0.10,
            signup_commission_rate: 0.10,
            commission_on_mining: false,
            mining_grace_secs: 30,
            efficiency_floor: policy::DEFAULT_EFFICIENCY_FLOOR,
            anti_cheat_window_hours: 24,
        }
    }
}

/// Most a session may hold after running from `since` until `now`.
pub fn mining_allowance(
    multiplier: f64,
    efficiency: f64,
    since: NaiveDateTime,
    now: NaiveDateTime,
    grace_secs: u64,
) -> f64 {
    let elapsed_secs = (now - since).num_milliseconds().max(0) as f64 / 1000.0;
    policy::accrual_per_second(multiplier, efficiency) * (elapsed_secs + grace_secs as f64)
}

/// True when `now` falls on a later UTC calendar day than `last`.
pub fn is_new_day(last: NaiveDateTime, now: NaiveDateTime) -> bool {
    now.date() > last.date()
}

pub fn check_in_eligible(claimed: bool, last_login_at: NaiveDateTime, now: NaiveDateTime) -> bool {
    !claimed || is_new_day(last_login_at, now)
}

pub fn to_epoch_ms(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn to_rfc3339(ts: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc).to_rfc3339()
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
