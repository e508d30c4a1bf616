use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::{debug, info, warn};

use super::models::{MiningSession, NewMiningSession};
use super::{Credit, StorageError, Store, anticheat, credit_user, find_user, referrals, schema};
use crate::ledger::{self, LedgerRules};

#[derive(Debug)]
pub enum StartOutcome {
    Started(MiningSession),
    /// The user already has an open session; it is returned unchanged.
    AlreadyActive(MiningSession),
    UnknownUser,
}

/// Result of a credited (or replayed) flush.
#[derive(Debug, Clone)]
pub struct FlushReceipt {
    pub session: MiningSession,
    pub credited: f64,
    pub current_balance: f64,
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved(FlushReceipt),
    /// The flush sequence number was already applied; nothing was credited.
    Duplicate(FlushReceipt),
    UnknownSession,
    SessionClosed,
    InvalidAmount,
}

#[derive(Debug)]
pub enum EndOutcome {
    Ended(FlushReceipt),
    UnknownSession,
    AlreadyEnded(MiningSession),
    InvalidAmount,
}

impl Store {
    pub async fn start_mining_session(
        &self,
        user_id: &str,
        now: NaiveDateTime,
    ) -> Result<StartOutcome, StorageError> {
        use schema::mining_sessions::dsl as ms;
        use schema::users::dsl as u;
        let user_id = user_id.to_string();
        let rules = self.rules.clone();
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<StartOutcome, StorageError> {
                if find_user(conn, &user_id)?.is_none() {
                    return Ok(StartOutcome::UnknownUser);
                }
                if let Some(open) = open_session(conn, &user_id)? {
                    return Ok(StartOutcome::AlreadyActive(open));
                }
                let status = anticheat::anti_cheat_status(conn, &user_id, now, &rules)?;
                let session: MiningSession = diesel::insert_into(ms::mining_sessions)
                    .values(&NewMiningSession {
                        user_id: &user_id,
                        start_time: now,
                        efficiency: status.efficiency_multiplier,
                        last_flush_at: now,
                    })
                    .returning(MiningSession::as_returning())
                    .get_result(conn)?;
                diesel::update(u::users.find(&user_id))
                    .set((u::is_node_active.eq(true), u::node_started_at.eq(Some(now))))
                    .execute(conn)?;
                info!(
                    user_id = %user_id,
                    session_id = session.id,
                    efficiency = session.efficiency,
                    "mining session started"
                );
                Ok(StartOutcome::Started(session))
            })
        })
        .await
    }

    /// Credits one flush batch. `flush_seq` must grow per session; a seq at or
    /// below the last applied one is acknowledged without crediting.
    pub async fn save_mining_progress(
        &self,
        user_id: &str,
        session_id: i32,
        earnings_to_add: f64,
        flush_seq: i64,
        now: NaiveDateTime,
    ) -> Result<SaveOutcome, StorageError> {
        use schema::mining_sessions::dsl as ms;
        if !earnings_to_add.is_finite() || earnings_to_add < 0.0 {
            return Ok(SaveOutcome::InvalidAmount);
        }
        let user_id = user_id.to_string();
        let rules = self.rules.clone();
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<SaveOutcome, StorageError> {
                let Some(session) = ms::mining_sessions
                    .find(session_id)
                    .filter(ms::user_id.eq(&user_id))
                    .select(MiningSession::as_select())
                    .first(conn)
                    .optional()?
                else {
                    return Ok(SaveOutcome::UnknownSession);
                };
                if session.end_time.is_some() {
                    return Ok(SaveOutcome::SessionClosed);
                }
                if flush_seq <= session.last_flush_seq {
                    debug!(
                        user_id = %user_id,
                        session_id,
                        flush_seq,
                        last = session.last_flush_seq,
                        "replayed flush acknowledged"
                    );
                    let balance = find_user(conn, &user_id)?
                        .map(|u| u.current_balance)
                        .unwrap_or_default();
                    return Ok(SaveOutcome::Duplicate(FlushReceipt {
                        session,
                        credited: 0.0,
                        current_balance: balance,
                    }));
                }
                let credited = clamp_to_allowance(conn, &session, earnings_to_add, now, &rules)?;
                let receipt = apply_credit(conn, &session, credited, now, Some(flush_seq), &rules)?;
                Ok(SaveOutcome::Saved(receipt))
            })
        })
        .await
    }

    /// Closes a session, crediting only what `final_earnings` adds over what
    /// the flushes already recorded.
    pub async fn end_mining_session(
        &self,
        session_id: i32,
        final_earnings: f64,
        now: NaiveDateTime,
    ) -> Result<EndOutcome, StorageError> {
        use schema::mining_sessions::dsl as ms;
        use schema::users::dsl as u;
        if !final_earnings.is_finite() || final_earnings < 0.0 {
            return Ok(EndOutcome::InvalidAmount);
        }
        let rules = self.rules.clone();
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<EndOutcome, StorageError> {
                let Some(session) = ms::mining_sessions
                    .find(session_id)
                    .select(MiningSession::as_select())
                    .first(conn)
                    .optional()?
                else {
                    return Ok(EndOutcome::UnknownSession);
                };
                if session.end_time.is_some() {
                    return Ok(EndOutcome::AlreadyEnded(session));
                }
                let remaining = (final_earnings - session.earnings).max(0.0);
                let credited = clamp_to_allowance(conn, &session, remaining, now, &rules)?;
                diesel::update(ms::mining_sessions.find(session.id))
                    .set(ms::end_time.eq(Some(now)))
                    .execute(conn)?;
                diesel::update(u::users.find(&session.user_id))
                    .set((
                        u::is_node_active.eq(false),
                        u::node_started_at.eq(None::<NaiveDateTime>),
                    ))
                    .execute(conn)?;
                let receipt = apply_credit(conn, &session, credited, now, None, &rules)?;
                info!(
                    user_id = %session.user_id,
                    session_id = session.id,
                    credited,
                    total = receipt.session.earnings,
                    "mining session ended"
                );
                Ok(EndOutcome::Ended(receipt))
            })
        })
        .await
    }

    /// Display metrics reported by the node. Does not touch the ledger.
    pub async fn update_session_metrics(
        &self,
        session_id: i32,
        hash_rate: Option<f64>,
        efficiency: Option<f64>,
    ) -> Result<Option<MiningSession>, StorageError> {
        use schema::mining_sessions::dsl as ms;
        for v in [hash_rate, efficiency].into_iter().flatten() {
            if !v.is_finite() || v < 0.0 {
                return Err(StorageError::InvalidInput(
                    "metrics must be finite and non-negative".into(),
                ));
            }
        }
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Option<MiningSession>, StorageError> {
                if let Some(h) = hash_rate {
                    diesel::update(ms::mining_sessions.find(session_id))
                        .set(ms::hash_rate.eq(h))
                        .execute(conn)?;
                }
                if let Some(e) = efficiency {
                    diesel::update(ms::mining_sessions.find(session_id))
                        .set(ms::efficiency.eq(e.min(1.0)))
                        .execute(conn)?;
                }
                Ok(ms::mining_sessions
                    .find(session_id)
                    .select(MiningSession::as_select())
                    .first(conn)
                    .optional()?)
            })
        })
        .await
    }

    pub async fn current_session(&self, user_id: &str) -> Result<Option<MiningSession>, StorageError> {
        let user_id = user_id.to_string();
        self.blocking(move |conn| Ok(open_session(conn, &user_id)?))
            .await
    }

    pub async fn session_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MiningSession>, StorageError> {
        use schema::mining_sessions::dsl as ms;
        let user_id = user_id.to_string();
        let limit = limit.clamp(1, 200) as i64;
        self.blocking(move |conn| {
            Ok(ms::mining_sessions
                .filter(ms::user_id.eq(&user_id))
                .order((ms::start_time.desc(), ms::id.desc()))
                .limit(limit)
                .select(MiningSession::as_select())
                .load(conn)?)
        })
        .await
    }
}

fn open_session(conn: &mut SqliteConnection, user_id: &str) -> QueryResult<Option<MiningSession>> {
    use schema::mining_sessions::dsl as ms;
    ms::mining_sessions
        .filter(ms::user_id.eq(user_id))
        .filter(ms::end_time.is_null())
        .select(MiningSession::as_select())
        .first(conn)
        .optional()
}

/// Caps `requested` so the session total never exceeds what the node could
/// have earned since the session started, at the owner's multiplier and
/// current anti-cheat efficiency. A backlog held back by an outage still fits.
fn clamp_to_allowance(
    conn: &mut SqliteConnection,
    session: &MiningSession,
    requested: f64,
    now: NaiveDateTime,
    rules: &LedgerRules,
) -> Result<f64, StorageError> {
    if requested <= 0.0 {
        return Ok(0.0);
    }
    let Some(user) = find_user(conn, &session.user_id)? else {
        return Ok(0.0);
    };
    let status = anticheat::anti_cheat_status(conn, &session.user_id, now, rules)?;
    let allowance = ledger::mining_allowance(
        user.multiplier,
        status.efficiency_multiplier,
        session.start_time,
        now,
        rules.mining_grace_secs,
    );
    let headroom = (allowance - session.earnings).max(0.0);
    if requested > headroom {
        warn!(
            user_id = %session.user_id,
            session_id = session.id,
            requested,
            headroom,
            recorded = session.earnings,
            "mining flush clamped"
        );
        return Ok(headroom);
    }
    Ok(requested)
}

fn apply_credit(
    conn: &mut SqliteConnection,
    session: &MiningSession,
    credited: f64,
    now: NaiveDateTime,
    flush_seq: Option<i64>,
    rules: &LedgerRules,
) -> Result<FlushReceipt, StorageError> {
    use schema::mining_sessions::dsl as ms;
    diesel::update(ms::mining_sessions.find(session.id))
        .set((
            ms::earnings.eq(ms::earnings + credited),
            ms::last_flush_at.eq(now),
        ))
        .execute(conn)?;
    if let Some(seq) = flush_seq {
        diesel::update(ms::mining_sessions.find(session.id))
            .set(ms::last_flush_seq.eq(seq))
            .execute(conn)?;
    }
    credit_user(conn, &session.user_id, credited, Credit::Mining)?;
    if rules.commission_on_mining && credited > 0.0 {
        referrals::distribute_commission(conn, &session.user_id, credited, rules.commission_rate)?;
    }
    let updated = ms::mining_sessions
        .find(session.id)
        .select(MiningSession::as_select())
        .first(conn)?;
    let current_balance = find_user(conn, &session.user_id)?
        .map(|u| u.current_balance)
        .unwrap_or_default();
    debug!(
        user_id = %session.user_id,
        session_id = session.id,
        credited,
        balance = current_balance,
        "mining credit applied"
    );
    Ok(FlushReceipt {
        session: updated,
        credited,
        current_balance,
    })
}
