use chrono::NaiveDateTime;
use cordnode_shared::api::{CreateUserReq, UpdateUserReq};
use cordnode_shared::domain::UserSettings;
use cordnode_shared::policy;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::{debug, info};

use super::models::{NewUser, User, UserSettingsRow};
use super::{StorageError, Store, find_user, schema};
use crate::ledger;

const REFERRAL_CODE_PREFIX: &str = "CORD";
const REFERRAL_CODE_LEN: usize = 8;

pub struct LoginResult {
    pub user: User,
    pub created: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub total_users: i64,
    pub active_nodes: i64,
    pub total_earned: f64,
    pub total_sessions: i64,
    pub total_tasks_completed: i64,
}

impl Store {
    /// Called after a successful Discord OAuth exchange. Creates the account on
    /// first sight, otherwise refreshes the profile and applies the daily
    /// login rollover.
    pub async fn login_or_create(
        &self,
        req: &CreateUserReq,
        now: NaiveDateTime,
    ) -> Result<LoginResult, StorageError> {
        let discord_id = req.discord_id.trim().to_string();
        let username = req.username.trim().to_string();
        if discord_id.is_empty() || username.is_empty() {
            return Err(StorageError::InvalidInput(
                "discord_id and username are required".into(),
            ));
        }
        let discriminator = req.discriminator.clone();
        let avatar = req.avatar.clone();
        let created_ms = req
            .account_created_at_ms
            .or_else(|| policy::snowflake_created_at_ms(&discord_id))
            .unwrap_or_else(|| ledger::to_epoch_ms(now));

        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<LoginResult, StorageError> {
                use schema::users::dsl as u;
                let existing: Option<User> = u::users
                    .filter(u::discord_id.eq(&discord_id))
                    .select(User::as_select())
                    .first(conn)
                    .optional()?;

                if let Some(user) = existing {
                    let rollover = ledger::is_new_day(user.last_login_at, now);
                    diesel::update(u::users.filter(u::id.eq(&user.id)))
                        .set((
                            u::username.eq(&username),
                            u::discriminator.eq(discriminator.as_deref()),
                            u::avatar.eq(avatar.as_deref()),
                            u::last_login_at.eq(now),
                        ))
                        .execute(conn)
                        .map_err(|e| map_unique(e, "username already taken"))?;
                    if rollover {
                        diesel::update(u::users.filter(u::id.eq(&user.id)))
                            .set(u::daily_check_in_claimed.eq(false))
                            .execute(conn)?;
                        debug!(user_id = %user.id, "login: new day, check-in re-armed");
                    }
                    let user = find_user(conn, &user.id)?.ok_or(DieselError::NotFound)?;
                    return Ok(LoginResult {
                        user,
                        created: false,
                    });
                }

                let age = policy::account_age_years(created_ms, ledger::to_epoch_ms(now));
                let id = uuid::Uuid::new_v4().to_string();
                let code = unused_referral_code(conn)?;
                let new_user = NewUser {
                    id: &id,
                    discord_id: &discord_id,
                    username: &username,
                    discriminator: discriminator.as_deref(),
                    avatar: avatar.as_deref(),
                    account_age_years: age,
                    multiplier: policy::multiplier(age),
                    referral_code: &code,
                    last_login_at: now,
                    created_at: now,
                };
                diesel::insert_into(u::users)
                    .values(&new_user)
                    .execute(conn)
                    .map_err(|e| map_unique(e, "username already taken"))?;
                info!(
                    user_id = %id,
                    age_years = age,
                    multiplier = new_user.multiplier,
                    "user created"
                );
                let user = find_user(conn, &id)?.ok_or(DieselError::NotFound)?;
                Ok(LoginResult {
                    user,
                    created: true,
                })
            })
        })
        .await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, StorageError> {
        let id = id.to_string();
        self.blocking(move |conn| Ok(find_user(conn, &id)?)).await
    }

    pub async fn get_user_by_username(&self, name: &str) -> Result<Option<User>, StorageError> {
        use schema::users::dsl as u;
        let name = name.to_string();
        self.blocking(move |conn| {
            Ok(u::users
                .filter(u::username.eq(&name))
                .select(User::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    /// Profile fields only; ledger columns move through earning events.
    pub async fn update_profile(
        &self,
        id: &str,
        req: &UpdateUserReq,
    ) -> Result<Option<User>, StorageError> {
        use schema::users::dsl as u;
        let id = id.to_string();
        let req = req.clone();
        if let Some(name) = &req.username
            && name.trim().is_empty()
        {
            return Err(StorageError::InvalidInput("username cannot be empty".into()));
        }
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Option<User>, StorageError> {
                if find_user(conn, &id)?.is_none() {
                    return Ok(None);
                }
                if let Some(name) = &req.username {
                    diesel::update(u::users.find(&id))
                        .set(u::username.eq(name.trim()))
                        .execute(conn)
                        .map_err(|e| map_unique(e, "username already taken"))?;
                }
                if let Some(d) = &req.discriminator {
                    diesel::update(u::users.find(&id))
                        .set(u::discriminator.eq(Some(d.as_str())))
                        .execute(conn)?;
                }
                if let Some(a) = &req.avatar {
                    diesel::update(u::users.find(&id))
                        .set(u::avatar.eq(Some(a.as_str())))
                        .execute(conn)?;
                }
                Ok(find_user(conn, &id)?)
            })
        })
        .await
    }

    /// Flag-only node toggle. Deactivating also closes any open mining
    /// session without crediting it further.
    pub async fn set_node_active(
        &self,
        id: &str,
        active: bool,
        now: NaiveDateTime,
    ) -> Result<Option<User>, StorageError> {
        use schema::mining_sessions::dsl as ms;
        use schema::users::dsl as u;
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Option<User>, StorageError> {
                let Some(user) = find_user(conn, &id)? else {
                    return Ok(None);
                };
                if active {
                    if !user.is_node_active {
                        diesel::update(u::users.find(&id))
                            .set((u::is_node_active.eq(true), u::node_started_at.eq(Some(now))))
                            .execute(conn)?;
                    }
                } else {
                    diesel::update(u::users.find(&id))
                        .set((
                            u::is_node_active.eq(false),
                            u::node_started_at.eq(None::<NaiveDateTime>),
                        ))
                        .execute(conn)?;
                    let closed = diesel::update(
                        ms::mining_sessions
                            .filter(ms::user_id.eq(&id))
                            .filter(ms::end_time.is_null()),
                    )
                    .set(ms::end_time.eq(Some(now)))
                    .execute(conn)?;
                    if closed > 0 {
                        info!(user_id = %id, "node deactivated; open session closed");
                    }
                }
                Ok(find_user(conn, &id)?)
            })
        })
        .await
    }

    /// Top earners, skipping users who opted out of the leaderboard.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<User>, StorageError> {
        use schema::user_settings::dsl as us;
        use schema::users::dsl as u;
        let limit = limit.clamp(1, 100) as i64;
        self.blocking(move |conn| {
            let rows: Vec<UserSettingsRow> = us::user_settings
                .select(UserSettingsRow::as_select())
                .load(conn)?;
            let hidden: Vec<String> = rows
                .into_iter()
                .filter(|r| {
                    serde_json::from_str::<UserSettings>(&r.settings_json)
                        .map(|s| !s.privacy.show_on_leaderboard)
                        .unwrap_or(false)
                })
                .map(|r| r.user_id)
                .collect();
            Ok(u::users
                .filter(u::id.ne_all(hidden))
                .order((u::total_earned.desc(), u::created_at.asc()))
                .limit(limit)
                .select(User::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn network_stats(&self) -> Result<NetworkStats, StorageError> {
        use diesel::dsl::{count_star, sum};
        use schema::{mining_sessions, user_tasks, users};
        self.blocking(move |conn| {
            let total_users: i64 = users::table.select(count_star()).first(conn)?;
            let active_nodes: i64 = users::table
                .filter(users::is_node_active.eq(true))
                .select(count_star())
                .first(conn)?;
            let total_earned: Option<f64> = users::table
                .select(sum(users::total_earned))
                .first(conn)?;
            let total_sessions: i64 = mining_sessions::table.select(count_star()).first(conn)?;
            let total_tasks_completed: i64 = user_tasks::table
                .filter(user_tasks::completed.eq(true))
                .select(count_star())
                .first(conn)?;
            Ok(NetworkStats {
                total_users,
                active_nodes,
                total_earned: total_earned.unwrap_or(0.0),
                total_sessions,
                total_tasks_completed,
            })
        })
        .await
    }
}

fn unused_referral_code(conn: &mut SqliteConnection) -> Result<String, StorageError> {
    use schema::users::dsl as u;
    for _ in 0..8 {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        let code = format!(
            "{}{}",
            REFERRAL_CODE_PREFIX,
            raw[..REFERRAL_CODE_LEN].to_uppercase()
        );
        let taken: i64 = u::users
            .filter(u::referral_code.eq(&code))
            .count()
            .get_result(conn)?;
        if taken == 0 {
            return Ok(code);
        }
    }
    Err(StorageError::Conflict(
        "could not allocate a unique referral code".into(),
    ))
}

fn map_unique(e: DieselError, msg: &str) -> StorageError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StorageError::Conflict(msg.to_string())
        }
        other => StorageError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{self, ts};
    use super::*;
    use cordnode_shared::domain::UserSettings;

    fn req(discord_id: &str, username: &str) -> CreateUserReq {
        CreateUserReq {
            discord_id: discord_id.into(),
            username: username.into(),
            discriminator: Some("0001".into()),
            avatar: None,
            account_created_at_ms: None,
            referral_code: None,
        }
    }

    #[tokio::test]
    async fn creation_derives_age_from_snowflake() {
        let store = test_support::store().await;
        // created 2016-04-30, so at least 9 years old in mid 2025
        let res = store
            .login_or_create(&req("175928847299117063", "old-timer"), ts(1, 12, 0, 0))
            .await
            .unwrap();
        assert!(res.created);
        assert!(res.user.account_age_years > 9.0);
        assert_eq!(res.user.multiplier, 10.0);
        assert!(res.user.referral_code.starts_with("CORD"));
        assert_eq!(res.user.referral_code.len(), 12);
        assert_eq!(res.user.current_balance, 0.0);
    }

    #[tokio::test]
    async fn second_login_returns_same_account() {
        let store = test_support::store().await;
        let first = store
            .login_or_create(&req("111", "alice"), ts(1, 8, 0, 0))
            .await
            .unwrap();
        let again = store
            .login_or_create(&req("111", "alice-renamed"), ts(1, 9, 0, 0))
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(first.user.id, again.user.id);
        assert_eq!(first.user.referral_code, again.user.referral_code);
        assert_eq!(again.user.username, "alice-renamed");
    }

    #[tokio::test]
    async fn login_on_new_day_rearms_check_in() {
        let store = test_support::store().await;
        let id = store
            .login_or_create(&req("222", "bob"), ts(1, 8, 0, 0))
            .await
            .unwrap()
            .user
            .id;
        store
            .complete_task(&id, "daily-check-in", ts(1, 9, 0, 0))
            .await
            .unwrap();
        let same_day = store
            .login_or_create(&req("222", "bob"), ts(1, 20, 0, 0))
            .await
            .unwrap();
        assert!(same_day.user.daily_check_in_claimed);
        let next_day = store
            .login_or_create(&req("222", "bob"), ts(2, 7, 0, 0))
            .await
            .unwrap();
        assert!(!next_day.user.daily_check_in_claimed);
    }

    #[tokio::test]
    async fn username_collision_is_a_conflict() {
        let store = test_support::store().await;
        store
            .login_or_create(&req("1", "carol"), ts(1, 8, 0, 0))
            .await
            .unwrap();
        let err = store
            .login_or_create(&req("2", "carol"), ts(1, 8, 0, 0))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivate_closes_open_session() {
        let store = test_support::store().await;
        let now = ts(1, 8, 0, 0);
        let id = test_support::user_aged(&store, "dave", 1.0, now).await;
        store.start_mining_session(&id, now).await.unwrap();
        let user = store
            .set_node_active(&id, false, ts(1, 8, 5, 0))
            .await
            .unwrap()
            .unwrap();
        assert!(!user.is_node_active);
        assert!(user.node_started_at.is_none());
        assert!(store.current_session(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn leaderboard_orders_and_respects_privacy() {
        let store = test_support::store().await;
        let now = ts(1, 8, 0, 0);
        let a = test_support::user_aged(&store, "a", 0.5, now).await;
        let b = test_support::user_aged(&store, "b", 0.5, now).await;
        let c = test_support::user_aged(&store, "c", 0.5, now).await;
        store.complete_task(&b, "join-discord", now).await.unwrap();
        store.complete_task(&c, "join-discord", now).await.unwrap();
        store.complete_task(&c, "follow-x", now).await.unwrap();

        let board = store.leaderboard(10).await.unwrap();
        let ids: Vec<&str> = board.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec![c.as_str(), b.as_str(), a.as_str()]);

        let mut hidden = UserSettings::default();
        hidden.privacy.show_on_leaderboard = false;
        store.put_settings(&c, &hidden).await.unwrap();
        let board = store.leaderboard(2).await.unwrap();
        let ids: Vec<&str> = board.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec![b.as_str(), a.as_str()]);
    }

    #[tokio::test]
    async fn stats_aggregate_the_network() {
        let store = test_support::store().await;
        let now = ts(1, 8, 0, 0);
        let a = test_support::user_aged(&store, "a", 0.5, now).await;
        test_support::user_aged(&store, "b", 0.5, now).await;
        store.start_mining_session(&a, now).await.unwrap();
        store.complete_task(&a, "join-discord", now).await.unwrap();
        let stats = store.network_stats().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_nodes, 1);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_tasks_completed, 1);
        assert_eq!(stats.total_earned, 10.0);
    }
}
