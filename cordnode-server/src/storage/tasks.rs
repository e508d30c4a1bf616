use chrono::{Duration, NaiveDateTime};
use cordnode_shared::domain::{ProgressSource, TaskType};
use diesel::prelude::*;
use tracing::{debug, info};

use super::models::{MiningSession, NewUserTask, Task, User, UserTask};
use super::{Credit, StorageError, Store, credit_user, find_user, referrals, schema};
use crate::ledger;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { reward: f64, new_balance: f64 },
    AlreadyCompleted,
    NotEligible { progress: i32, max_progress: i32 },
    CheckInAlreadyClaimed,
    Expired,
    UnknownUser,
    UnknownTask,
}

/// A task template merged with one user's live progress and claim state.
#[derive(Debug, Clone)]
pub struct UserTaskView {
    pub task: Task,
    pub progress: i32,
    pub completed: bool,
    pub claimable: bool,
    pub claimed_at: Option<NaiveDateTime>,
    pub reward_claimed: Option<f64>,
}

impl Store {
    pub async fn list_tasks(&self) -> Result<Vec<Task>, StorageError> {
        use schema::tasks::dsl as t;
        self.blocking(move |conn| {
            Ok(t::tasks
                .order((t::task_type.asc(), t::id.asc()))
                .select(Task::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Claims a task reward. Eligibility, crediting, progress bookkeeping and
    /// the referrer's commission happen in one transaction.
    pub async fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
        now: NaiveDateTime,
    ) -> Result<TaskOutcome, StorageError> {
        use schema::tasks::dsl as t;
        use schema::users::dsl as u;
        let user_id = user_id.to_string();
        let task_id = task_id.to_string();
        let commission_rate = self.rules.commission_rate;
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<TaskOutcome, StorageError> {
                let Some(user) = find_user(conn, &user_id)? else {
                    return Ok(TaskOutcome::UnknownUser);
                };
                let Some(task) = t::tasks
                    .find(&task_id)
                    .select(Task::as_select())
                    .first(conn)
                    .optional()?
                else {
                    return Ok(TaskOutcome::UnknownTask);
                };
                let row = user_task_row(conn, &user_id, &task_id)?;
                let source = task.source();
                let is_check_in = source == ProgressSource::DailyCheckIn;

                if !is_check_in && row.as_ref().is_some_and(|r| r.completed) {
                    return Ok(TaskOutcome::AlreadyCompleted);
                }
                if task.expires_at.is_some_and(|exp| exp <= now) {
                    return Ok(TaskOutcome::Expired);
                }
                if is_check_in
                    && !ledger::check_in_eligible(
                        user.daily_check_in_claimed,
                        user.last_login_at,
                        now,
                    )
                {
                    return Ok(TaskOutcome::CheckInAlreadyClaimed);
                }
                let max_progress = task.max_progress.max(1);
                if needs_progress(source, max_progress) {
                    let progress = live_progress(conn, &user, &task, row.as_ref(), now)?;
                    if progress < max_progress {
                        return Ok(TaskOutcome::NotEligible {
                            progress,
                            max_progress,
                        });
                    }
                }

                let reward = task.reward * user.multiplier;
                credit_user(conn, &user_id, reward, Credit::Reward)?;
                diesel::update(u::users.find(&user_id))
                    .set(u::tasks_completed_count.eq(u::tasks_completed_count + 1))
                    .execute(conn)?;
                if is_check_in {
                    diesel::update(u::users.find(&user_id))
                        .set((u::daily_check_in_claimed.eq(true), u::last_login_at.eq(now)))
                        .execute(conn)?;
                }
                upsert_user_task(
                    conn,
                    &NewUserTask {
                        user_id: &user_id,
                        task_id: &task_id,
                        completed: true,
                        progress: max_progress,
                        claimed_at: Some(now),
                        reward,
                    },
                )?;
                if task.kind() == TaskType::Social {
                    refresh_social_achievements(conn, &user_id)?;
                }
                referrals::distribute_commission(conn, &user_id, reward, commission_rate)?;

                let new_balance = find_user(conn, &user_id)?
                    .map(|u| u.current_balance)
                    .unwrap_or_default();
                info!(
                    user_id = %user_id,
                    task_id = %task_id,
                    reward,
                    new_balance,
                    "task completed"
                );
                Ok(TaskOutcome::Completed {
                    reward,
                    new_balance,
                })
            })
        })
        .await
    }

    /// Every task template with this user's progress. `None` for an unknown
    /// user.
    pub async fn list_user_tasks(
        &self,
        user_id: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Vec<UserTaskView>>, StorageError> {
        use schema::tasks::dsl as t;
        use schema::user_tasks::dsl as ut;
        let user_id = user_id.to_string();
        self.blocking(move |conn| {
            let Some(user) = find_user(conn, &user_id)? else {
                return Ok(None);
            };
            let tasks: Vec<Task> = t::tasks
                .order((t::task_type.asc(), t::id.asc()))
                .select(Task::as_select())
                .load(conn)?;
            let rows: Vec<UserTask> = ut::user_tasks
                .filter(ut::user_id.eq(&user_id))
                .select(UserTask::as_select())
                .load(conn)?;

            let mut views = Vec::with_capacity(tasks.len());
            for task in tasks {
                let row = rows.iter().find(|r| r.task_id == task.id);
                let max_progress = task.max_progress.max(1);
                let progress = live_progress(conn, &user, &task, row, now)?.min(max_progress);
                let expired = task.expires_at.is_some_and(|exp| exp <= now);
                let (completed, claimable) = match task.source() {
                    ProgressSource::DailyCheckIn => {
                        let eligible = ledger::check_in_eligible(
                            user.daily_check_in_claimed,
                            user.last_login_at,
                            now,
                        );
                        (!eligible, eligible && !expired)
                    }
                    source => {
                        let done = row.is_some_and(|r| r.completed);
                        let ready = !needs_progress(source, max_progress) || progress >= max_progress;
                        (done, !done && !expired && ready)
                    }
                };
                views.push(UserTaskView {
                    progress,
                    completed,
                    claimable,
                    claimed_at: row.and_then(|r| r.claimed_at),
                    reward_claimed: row.filter(|r| r.completed).map(|r| r.reward),
                    task,
                });
            }
            Ok(Some(views))
        })
        .await
    }
}

/// Whether a claim must be backed by live progress. Single-step manual tasks
/// are honour-system claims.
fn needs_progress(source: ProgressSource, max_progress: i32) -> bool {
    match source {
        ProgressSource::DailyCheckIn => false,
        ProgressSource::Manual => max_progress > 1,
        _ => true,
    }
}

fn user_task_row(
    conn: &mut SqliteConnection,
    user_id: &str,
    task_id: &str,
) -> QueryResult<Option<UserTask>> {
    use schema::user_tasks::dsl as ut;
    ut::user_tasks
        .filter(ut::user_id.eq(user_id))
        .filter(ut::task_id.eq(task_id))
        .select(UserTask::as_select())
        .first(conn)
        .optional()
}

fn upsert_user_task(conn: &mut SqliteConnection, row: &NewUserTask<'_>) -> QueryResult<usize> {
    use schema::user_tasks::dsl as ut;
    diesel::insert_into(ut::user_tasks)
        .values(row)
        .on_conflict((ut::user_id, ut::task_id))
        .do_update()
        .set((
            ut::completed.eq(row.completed),
            ut::progress.eq(row.progress),
            ut::claimed_at.eq(row.claimed_at),
            ut::reward.eq(row.reward),
        ))
        .execute(conn)
}

/// Live progress towards a task for one user.
fn live_progress(
    conn: &mut SqliteConnection,
    user: &User,
    task: &Task,
    row: Option<&UserTask>,
    now: NaiveDateTime,
) -> QueryResult<i32> {
    let progress = match task.source() {
        ProgressSource::Manual => row.map(|r| r.progress).unwrap_or(0),
        ProgressSource::DailyCheckIn => {
            let eligible =
                ledger::check_in_eligible(user.daily_check_in_claimed, user.last_login_at, now);
            i32::from(!eligible)
        }
        ProgressSource::MiningUptime => {
            let window_start = match task.kind() {
                TaskType::Daily => Some(now.date().and_time(chrono::NaiveTime::MIN)),
                TaskType::Weekly => Some(now - Duration::days(7)),
                _ => None,
            };
            clamp_i32(mining_uptime_secs(conn, &user.id, window_start, now)?)
        }
        ProgressSource::WeeklyEarnings => clamp_i32(user.weekly_earnings.floor() as i64),
        ProgressSource::Referrals => user.total_referrals,
        ProgressSource::AccountAge => clamp_i32(user.account_age_years.floor() as i64),
        ProgressSource::SocialCompleted => clamp_i32(completed_social_count(conn, &user.id)?),
    };
    Ok(progress.max(0))
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(0, i32::MAX as i64) as i32
}

/// Seconds of mining since `window_start`, counting an open session up to
/// `now`.
fn mining_uptime_secs(
    conn: &mut SqliteConnection,
    user_id: &str,
    window_start: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> QueryResult<i64> {
    use schema::mining_sessions::dsl as ms;
    let mut query = ms::mining_sessions
        .filter(ms::user_id.eq(user_id))
        .select(MiningSession::as_select())
        .into_boxed();
    if let Some(start) = window_start {
        query = query.filter(ms::end_time.is_null().or(ms::end_time.ge(start)));
    }
    let sessions: Vec<MiningSession> = query.load(conn)?;
    let total = sessions
        .iter()
        .map(|s| {
            let from = window_start.map_or(s.start_time, |w| s.start_time.max(w));
            let to = s.end_time.unwrap_or(now).min(now);
            (to - from).num_seconds().max(0)
        })
        .sum();
    Ok(total)
}

fn completed_social_count(conn: &mut SqliteConnection, user_id: &str) -> QueryResult<i64> {
    use schema::tasks::dsl as t;
    use schema::user_tasks::dsl as ut;
    ut::user_tasks
        .inner_join(t::tasks)
        .filter(ut::user_id.eq(user_id))
        .filter(ut::completed.eq(true))
        .filter(t::task_type.eq(TaskType::Social.as_str()))
        .count()
        .get_result(conn)
}

/// Stores the social-completion count on every unclaimed achievement that
/// tracks it.
fn refresh_social_achievements(conn: &mut SqliteConnection, user_id: &str) -> QueryResult<()> {
    use schema::tasks::dsl as t;
    let count = clamp_i32(completed_social_count(conn, user_id)?);
    let trackers: Vec<String> = t::tasks
        .filter(t::progress_source.eq(ProgressSource::SocialCompleted.as_str()))
        .select(t::id)
        .load(conn)?;
    for task_id in trackers {
        if user_task_row(conn, user_id, &task_id)?.is_some_and(|r| r.completed) {
            continue;
        }
        upsert_user_task(
            conn,
            &NewUserTask {
                user_id,
                task_id: &task_id,
                completed: false,
                progress: count,
                claimed_at: None,
                reward: 0.0,
            },
        )?;
        debug!(user_id = %user_id, task_id = %task_id, progress = count, "social progress");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{self, ts};
    use super::super::{SaveOutcome, StartOutcome};
    use super::*;
    use chrono::Utc;
    use cordnode_shared::domain;

    fn completed(out: TaskOutcome) -> (f64, f64) {
        match out {
            TaskOutcome::Completed {
                reward,
                new_balance,
            } => (reward, new_balance),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reward_scales_with_multiplier_and_is_claimed_once() {
        let store = test_support::store().await;
        let now = ts(12, 9, 0, 0);
        let id = test_support::user_aged(&store, "social", 3.5, now).await;
        let (reward, balance) = completed(store.complete_task(&id, "join-discord", now).await.unwrap());
        assert_eq!(reward, 20.0);
        assert_eq!(balance, 20.0);

        let again = store.complete_task(&id, "join-discord", now).await.unwrap();
        assert_eq!(again, TaskOutcome::AlreadyCompleted);
        let user = store.get_user(&id).await.unwrap().unwrap();
        assert_eq!(user.current_balance, 20.0);
        assert_eq!(user.total_earned, 20.0);
        assert_eq!(user.tasks_completed_count, 1);
    }

    #[tokio::test]
    async fn daily_check_in_once_per_day() {
        let store = test_support::store().await;
        let day_n = ts(12, 9, 0, 0);
        let id = test_support::user_aged(&store, "daily", 0.5, day_n).await;
        completed(
            store
                .complete_task(&id, "daily-check-in", day_n)
                .await
                .unwrap(),
        );
        let user = store.get_user(&id).await.unwrap().unwrap();
        assert!(user.daily_check_in_claimed);
        assert_eq!(user.last_login_at, day_n);

        let later_same_day = ts(12, 23, 59, 0);
        assert_eq!(
            store
                .complete_task(&id, "daily-check-in", later_same_day)
                .await
                .unwrap(),
            TaskOutcome::CheckInAlreadyClaimed
        );

        let (_, balance) = completed(
            store
                .complete_task(&id, "daily-check-in", ts(13, 0, 0, 1))
                .await
                .unwrap(),
        );
        assert_eq!(balance, 10.0);
        let user = store.get_user(&id).await.unwrap().unwrap();
        assert_eq!(user.tasks_completed_count, 2);
    }

    #[tokio::test]
    async fn progress_gates_referral_achievement() {
        let store = test_support::store().await;
        let now = ts(12, 9, 0, 0);
        let host = test_support::user_aged(&store, "host", 0.5, now).await;
        assert_eq!(
            store.complete_task(&host, "refer-two", now).await.unwrap(),
            TaskOutcome::NotEligible {
                progress: 0,
                max_progress: 2
            }
        );
        let code = store.get_user(&host).await.unwrap().unwrap().referral_code;
        for name in ["f1", "f2"] {
            let f = test_support::user_aged(&store, name, 0.5, now).await;
            store.process_new_user_referral(&f, &code, now).await.unwrap();
        }
        let (reward, _) = completed(store.complete_task(&host, "refer-two", now).await.unwrap());
        assert_eq!(reward, 40.0);
    }

    #[tokio::test]
    async fn account_age_achievement() {
        let store = test_support::store().await;
        let now = ts(12, 9, 0, 0);
        let young = test_support::user_aged(&store, "young", 1.5, now).await;
        let old = test_support::user_aged(&store, "old", 6.0, now).await;
        assert_eq!(
            store.complete_task(&young, "veteran", now).await.unwrap(),
            TaskOutcome::NotEligible {
                progress: 1,
                max_progress: 5
            }
        );
        let (reward, _) = completed(store.complete_task(&old, "veteran", now).await.unwrap());
        assert_eq!(reward, 25.0 * 5.0);
    }

    #[tokio::test]
    async fn social_tasks_feed_the_achievement() {
        let store = test_support::store().await;
        let now = ts(12, 9, 0, 0);
        let id = test_support::user_aged(&store, "fan", 0.5, now).await;
        store.complete_task(&id, "join-discord", now).await.unwrap();
        let views = store.list_user_tasks(&id, now).await.unwrap().unwrap();
        let all = views.iter().find(|v| v.task.id == "all-socials").unwrap();
        assert_eq!(all.progress, 1);
        assert!(!all.claimable);

        store.complete_task(&id, "follow-x", now).await.unwrap();
        let (reward, balance) = completed(store.complete_task(&id, "all-socials", now).await.unwrap());
        assert_eq!(reward, 50.0);
        assert_eq!(balance, 70.0);
    }

    #[tokio::test]
    async fn mining_uptime_counts_open_session() {
        let store = test_support::store().await;
        let t0 = ts(12, 9, 0, 0);
        let id = test_support::user_aged(&store, "uptime", 0.5, t0).await;
        let StartOutcome::Started(session) = store.start_mining_session(&id, t0).await.unwrap()
        else {
            panic!("session not started");
        };
        assert!(matches!(
            store
                .complete_task(&id, "mine-a-minute", ts(12, 9, 0, 30))
                .await
                .unwrap(),
            TaskOutcome::NotEligible { progress: 30, .. }
        ));
        let out = store
            .save_mining_progress(&id, session.id, 0.0, 1, ts(12, 9, 1, 0))
            .await
            .unwrap();
        assert!(matches!(out, SaveOutcome::Saved(_)));
        completed(
            store
                .complete_task(&id, "mine-a-minute", ts(12, 9, 1, 30))
                .await
                .unwrap(),
        );
    }

    #[tokio::test]
    async fn expired_and_unknown() {
        let store = test_support::store().await;
        let now = ts(12, 9, 0, 0);
        let mut promo = test_support::sample_tasks()
            .into_iter()
            .find(|t| t.id == "join-discord")
            .unwrap();
        promo.id = "spring-promo".into();
        promo.expires_at = Some(chrono::DateTime::<Utc>::from_naive_utc_and_offset(
            ts(11, 0, 0, 0),
            Utc,
        ));
        store.seed_tasks(&[promo]).await.unwrap();
        let id = test_support::user_aged(&store, "late", 0.5, now).await;

        assert_eq!(
            store.complete_task(&id, "spring-promo", now).await.unwrap(),
            TaskOutcome::Expired
        );
        assert_eq!(
            store.complete_task(&id, "no-such-task", now).await.unwrap(),
            TaskOutcome::UnknownTask
        );
        assert_eq!(
            store.complete_task("ghost", "join-discord", now).await.unwrap(),
            TaskOutcome::UnknownUser
        );
        assert!(store.list_user_tasks("ghost", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_reward_pays_referrer_commission() {
        let store = test_support::store().await;
        let now = ts(12, 9, 0, 0);
        let host = test_support::user_aged(&store, "h", 0.5, now).await;
        let guest = test_support::user_aged(&store, "g", 0.5, now).await;
        let code = store.get_user(&host).await.unwrap().unwrap().referral_code;
        store
            .process_new_user_referral(&guest, &code, now)
            .await
            .unwrap();
        let before = store.get_user(&host).await.unwrap().unwrap();
        store.complete_task(&guest, "join-discord", now).await.unwrap();
        let after = store.get_user(&host).await.unwrap().unwrap();
        assert!((after.referral_earnings - before.referral_earnings - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn listing_reports_claim_state() {
        let store = test_support::store().await;
        let now = ts(12, 9, 0, 0);
        let id = test_support::user_aged(&store, "lister", 0.5, now).await;
        store.complete_task(&id, "daily-check-in", now).await.unwrap();
        let views = store.list_user_tasks(&id, now).await.unwrap().unwrap();
        assert_eq!(views.len(), test_support::sample_tasks().len());

        let check_in = views.iter().find(|v| v.task.id == "daily-check-in").unwrap();
        assert!(check_in.completed);
        assert!(!check_in.claimable);
        assert_eq!(check_in.reward_claimed, Some(5.0));

        let discord = views.iter().find(|v| v.task.id == "join-discord").unwrap();
        assert!(!discord.completed);
        assert!(discord.claimable);

        let next_day = store.list_user_tasks(&id, ts(13, 1, 0, 0)).await.unwrap().unwrap();
        let check_in = next_day.iter().find(|v| v.task.id == "daily-check-in").unwrap();
        assert!(check_in.claimable);
        assert_eq!(
            check_in.task.kind(),
            domain::TaskType::Daily
        );
    }
}
