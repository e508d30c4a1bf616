pub mod models;
pub mod schema;

mod anticheat;
mod badges;
mod mining;
mod referrals;
mod settings;
mod tasks;
mod users;

pub use badges::BadgeOutcome;
pub use mining::{EndOutcome, FlushReceipt, SaveOutcome, StartOutcome};
pub use referrals::{CommissionOutcome, ReferralBonus, ReferralOutcome};
pub use tasks::{TaskOutcome, UserTaskView};
pub use users::{LoginResult, NetworkStats};

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::NewTask;

use crate::ledger::LedgerRules;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored JSON document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A unique value (username, discord id) already belongs to someone else.
    #[error("conflict: {0}")]
    Conflict(String),
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
    rules: LedgerRules,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store {
            pool,
            rules: LedgerRules::default(),
        })
    }

    pub fn with_rules(mut self, rules: LedgerRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &LedgerRules {
        &self.rules
    }

    /// Runs `f` on a pooled connection off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    /// Upserts the task templates declared in config.
    pub async fn seed_tasks(
        &self,
        cfg_tasks: &[cordnode_shared::domain::Task],
    ) -> Result<(), StorageError> {
        use schema::tasks;

        let tasks_owned = cfg_tasks.to_owned();
        self.blocking(move |conn| {
            for t in &tasks_owned {
                let new_task = NewTask {
                    id: &t.id,
                    title: &t.title,
                    description: &t.description,
                    reward: t.reward,
                    task_type: t.task_type.as_str(),
                    max_progress: t.max_progress.max(1),
                    progress_source: t.progress_source.as_str(),
                    social_url: t.social_url.as_deref(),
                    expires_at: t.expires_at.map(|dt| dt.naive_utc()),
                };
                diesel::insert_into(tasks::table)
                    .values(&new_task)
                    .on_conflict(tasks::id)
                    .do_update()
                    .set((
                        tasks::title.eq(new_task.title),
                        tasks::description.eq(new_task.description),
                        tasks::reward.eq(new_task.reward),
                        tasks::task_type.eq(new_task.task_type),
                        tasks::max_progress.eq(new_task.max_progress),
                        tasks::progress_source.eq(new_task.progress_source),
                        tasks::social_url.eq(new_task.social_url),
                        tasks::expires_at.eq(new_task.expires_at),
                    ))
                    .execute(conn)?;
            }
            Ok(())
        })
        .await
    }
}

/// Which ledger columns an earning event increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Credit {
    /// Balance, lifetime, weekly and monthly totals.
    Mining,
    /// Balance and lifetime total (task rewards, welcome bonus).
    Reward,
    /// Balance, lifetime total and referral earnings.
    Commission,
}

/// Adds `amount` to a user's ledger with in-SQL increments, so concurrent
/// writers never clobber each other's deltas.
pub(crate) fn credit_user(
    conn: &mut SqliteConnection,
    user: &str,
    amount: f64,
    kind: Credit,
) -> QueryResult<usize> {
    use schema::users::dsl as u;
    if amount == 0.0 {
        return Ok(0);
    }
    let target = u::users.filter(u::id.eq(user));
    match kind {
        Credit::Mining => diesel::update(target)
            .set((
                u::current_balance.eq(u::current_balance + amount),
                u::total_earned.eq(u::total_earned + amount),
                u::weekly_earnings.eq(u::weekly_earnings + amount),
                u::monthly_earnings.eq(u::monthly_earnings + amount),
            ))
            .execute(conn),
        Credit::Reward => diesel::update(target)
            .set((
                u::current_balance.eq(u::current_balance + amount),
                u::total_earned.eq(u::total_earned + amount),
            ))
            .execute(conn),
        Credit::Commission => diesel::update(target)
            .set((
                u::current_balance.eq(u::current_balance + amount),
                u::total_earned.eq(u::total_earned + amount),
                u::referral_earnings.eq(u::referral_earnings + amount),
            ))
            .execute(conn),
    }
}

pub(crate) fn find_user(
    conn: &mut SqliteConnection,
    user: &str,
) -> QueryResult<Option<models::User>> {
    use schema::users::dsl as u;
    u::users
        .filter(u::id.eq(user))
        .select(models::User::as_select())
        .first(conn)
        .optional()
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use cordnode_shared::api::CreateUserReq;
    use cordnode_shared::domain::{ProgressSource, Task, TaskType};

    pub struct TestStore {
        pub store: Store,
        _dir: tempfile::TempDir,
    }

    impl TestStore {
        pub fn with_rules(self, rules: LedgerRules) -> Self {
            TestStore {
                store: self.store.with_rules(rules),
                _dir: self._dir,
            }
        }
    }

    impl std::ops::Deref for TestStore {
        type Target = Store;
        fn deref(&self) -> &Store {
            &self.store
        }
    }

    pub async fn store() -> TestStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = Store::connect_sqlite(path.to_str().unwrap()).await.unwrap();
        store.seed_tasks(&sample_tasks()).await.unwrap();
        TestStore { store, _dir: dir }
    }

    pub fn ts(day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
    }

    /// Epoch ms exactly `years` (365.25-day years) before `now`.
    pub fn created_years_before(years: f64, now: NaiveDateTime) -> i64 {
        crate::ledger::to_epoch_ms(now) - (years * 365.25 * 86_400_000.0) as i64
    }

    pub async fn user_aged(store: &Store, name: &str, years: f64, now: NaiveDateTime) -> String {
        let req = CreateUserReq {
            discord_id: format!("discord-{name}"),
            username: name.to_string(),
            discriminator: None,
            avatar: None,
            account_created_at_ms: Some(created_years_before(years, now)),
            referral_code: None,
        };
        store.login_or_create(&req, now).await.unwrap().user.id
    }

    fn task(id: &str, reward: f64, kind: TaskType, max: i32, src: ProgressSource) -> Task {
        Task {
            id: id.into(),
            title: id.into(),
            description: String::new(),
            reward,
            task_type: kind,
            max_progress: max,
            progress_source: src,
            social_url: None,
            expires_at: None,
        }
    }

    pub fn sample_tasks() -> Vec<Task> {
        vec![
            task(
                "daily-check-in",
                5.0,
                TaskType::Daily,
                1,
                ProgressSource::DailyCheckIn,
            ),
            task(
                "join-discord",
                10.0,
                TaskType::Social,
                1,
                ProgressSource::Manual,
            ),
            task(
                "follow-x",
                10.0,
                TaskType::Social,
                1,
                ProgressSource::Manual,
            ),
            task(
                "all-socials",
                50.0,
                TaskType::Achievement,
                2,
                ProgressSource::SocialCompleted,
            ),
            task(
                "mine-a-minute",
                3.0,
                TaskType::Daily,
                60,
                ProgressSource::MiningUptime,
            ),
            task(
                "refer-two",
                40.0,
                TaskType::Achievement,
                2,
                ProgressSource::Referrals,
            ),
            task(
                "veteran",
                25.0,
                TaskType::Achievement,
                5,
                ProgressSource::AccountAge,
            ),
            task(
                "weekly-ten",
                15.0,
                TaskType::Weekly,
                10,
                ProgressSource::WeeklyEarnings,
            ),
        ]
    }
}
