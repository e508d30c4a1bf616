use chrono::{Duration, NaiveDateTime};
use cordnode_shared::policy::AntiCheatStatus;
use diesel::prelude::*;
use tracing::{info, warn};

use super::models::NewIpLink;
use super::{StorageError, Store, find_user, schema};
use crate::ledger::LedgerRules;

impl Store {
    /// Records that `user_id` was seen on `ip` and returns the resulting
    /// verdict. `None` for an unknown user.
    pub async fn record_ip_and_status(
        &self,
        user_id: &str,
        ip: &str,
        now: NaiveDateTime,
    ) -> Result<Option<AntiCheatStatus>, StorageError> {
        use schema::ip_links::dsl as il;
        let user_id = user_id.to_string();
        let ip = ip.trim().to_string();
        let rules = self.rules.clone();
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Option<AntiCheatStatus>, StorageError> {
                if find_user(conn, &user_id)?.is_none() {
                    return Ok(None);
                }
                if !ip.is_empty() {
                    diesel::insert_into(il::ip_links)
                        .values(&NewIpLink {
                            ip: &ip,
                            user_id: &user_id,
                            last_seen: now,
                        })
                        .on_conflict((il::ip, il::user_id))
                        .do_update()
                        .set(il::last_seen.eq(now))
                        .execute(conn)?;
                }
                let status = anti_cheat_status(conn, &user_id, now, &rules)?;
                if status.penalty_level > 0 {
                    warn!(
                        user_id = %user_id,
                        other_accounts = status.other_accounts,
                        penalty_level = status.penalty_level,
                        "shared ip detected"
                    );
                } else {
                    info!(user_id = %user_id, "anti-cheat check clean");
                }
                Ok(Some(status))
            })
        })
        .await
    }
}

/// Counts distinct other users seen, within the window, on any IP this user
/// was seen on within the window.
pub(crate) fn anti_cheat_status(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: NaiveDateTime,
    rules: &LedgerRules,
) -> QueryResult<AntiCheatStatus> {
    use diesel::dsl::count_distinct;
    use schema::ip_links::dsl as il;
    let since = now - Duration::hours(rules.anti_cheat_window_hours.max(0));
    let my_ips: Vec<String> = il::ip_links
        .filter(il::user_id.eq(user_id))
        .filter(il::last_seen.ge(since))
        .select(il::ip)
        .load(conn)?;
    if my_ips.is_empty() {
        return Ok(AntiCheatStatus::clean());
    }
    let others: i64 = il::ip_links
        .filter(il::ip.eq_any(my_ips))
        .filter(il::user_id.ne(user_id))
        .filter(il::last_seen.ge(since))
        .select(count_distinct(il::user_id))
        .first(conn)?;
    let others = u32::try_from(others).unwrap_or(u32::MAX);
    Ok(AntiCheatStatus::from_other_accounts(
        others,
        rules.efficiency_floor,
    ))
}
