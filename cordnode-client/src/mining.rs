//! Client side of a mining session.
//!
//! The node accrues earnings locally once per accrual tick and ships them to
//! the ledger on the flush tick. A flush freezes the accumulator into a single
//! numbered batch; that batch is resent with the same sequence number until
//! the server acknowledges it, so each batch is credited exactly once. Accrual
//! that happens while a batch is in flight keeps accumulating separately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cordnode_shared::api::{self, rest::RestError};
use cordnode_shared::policy;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::AppError;
use crate::anticheat::AntiCheatTracker;
use crate::config::MiningTiming;
use crate::notify::{NoticeKind, NotificationCenter};
use crate::remote::LedgerApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

/// A numbered flush. Resent with the same `seq` until acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub seq: i64,
    pub amount: f64,
}

/// Earnings the server has not confirmed yet, in a form that outlives the
/// process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsentEarnings {
    pub user_id: String,
    pub session_id: i32,
    pub in_flight: Option<Batch>,
    pub pending: f64,
}

#[derive(Debug)]
struct Accounts {
    state: MiningState,
    session_id: Option<i32>,
    multiplier: f64,
    /// Accrued since the last batch was cut.
    pending: f64,
    in_flight: Option<Batch>,
    /// Session earnings as last confirmed by the server.
    acknowledged: f64,
    display_total: f64,
    last_seq: i64,
    balance: Option<f64>,
}

impl Default for Accounts {
    fn default() -> Self {
        Self {
            state: MiningState::Stopped,
            session_id: None,
            multiplier: 1.0,
            pending: 0.0,
            in_flight: None,
            acknowledged: 0.0,
            display_total: 0.0,
            last_seq: 0,
            balance: None,
        }
    }
}

impl Accounts {
    fn unconfirmed(&self) -> f64 {
        self.pending + self.in_flight.map(|b| b.amount).unwrap_or(0.0)
    }

    fn clear_session(&mut self) {
        self.state = MiningState::Stopped;
        self.session_id = None;
        self.pending = 0.0;
        self.in_flight = None;
    }

    fn unsent(&self, user_id: &str) -> Option<UnsentEarnings> {
        let session_id = self.session_id?;
        if self.unconfirmed() <= 0.0 {
            return None;
        }
        Some(UnsentEarnings {
            user_id: user_id.to_string(),
            session_id,
            in_flight: self.in_flight,
            pending: self.pending,
        })
    }

    /// Takes over what an earlier run left unsent for this session. A batch
    /// the server already applied (its reply was lost) is dropped.
    fn restore(&mut self, carried: UnsentEarnings) {
        if let Some(b) = carried.in_flight
            && b.seq > self.last_seq
        {
            self.in_flight = Some(b);
            self.last_seq = b.seq;
        }
        self.pending += carried.pending.max(0.0);
        self.display_total = self.acknowledged + self.unconfirmed();
    }
}

/// Point-in-time view of the node.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningSnapshot {
    pub state: MiningState,
    pub session_id: Option<i32>,
    pub multiplier: f64,
    pub efficiency: f64,
    pub acknowledged: f64,
    pub unconfirmed: f64,
    pub display_total: f64,
    pub balance: Option<f64>,
    pub unsent: Option<UnsentEarnings>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushOutcome {
    /// Nothing to send, or no open session.
    Idle,
    Acknowledged { credited: f64, duplicate: bool },
}

struct Timers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

struct Shared {
    api: Arc<dyn LedgerApi>,
    user_id: String,
    timing: MiningTiming,
    tracker: AntiCheatTracker,
    notices: NotificationCenter,
    accounts: Mutex<Accounts>,
    carried: Mutex<Option<UnsentEarnings>>,
    flush_gate: Mutex<()>,
    lifecycle: Mutex<()>,
    timers: Mutex<Option<Timers>>,
}

#[derive(Clone)]
pub struct MiningNode {
    shared: Arc<Shared>,
}

fn session_gone(e: &RestError) -> bool {
    matches!(e, RestError::Status { status: 404, .. })
        || e.reason().as_deref() == Some("session_closed")
}

impl MiningNode {
    pub fn new(
        api: Arc<dyn LedgerApi>,
        user_id: impl Into<String>,
        timing: MiningTiming,
        notices: NotificationCenter,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                user_id: user_id.into(),
                timing,
                tracker: AntiCheatTracker::new(timing.anti_cheat_min_gap()),
                notices,
                accounts: Mutex::new(Accounts::default()),
                carried: Mutex::new(None),
                flush_gate: Mutex::new(()),
                lifecycle: Mutex::new(()),
                timers: Mutex::new(None),
            }),
        }
    }

    pub fn tracker(&self) -> &AntiCheatTracker {
        &self.shared.tracker
    }

    pub async fn state(&self) -> MiningState {
        self.shared.accounts.lock().await.state
    }

    pub async fn snapshot(&self) -> MiningSnapshot {
        let efficiency = self.shared.tracker.efficiency().await;
        let a = self.shared.accounts.lock().await;
        MiningSnapshot {
            state: a.state,
            session_id: a.session_id,
            multiplier: a.multiplier,
            efficiency,
            acknowledged: a.acknowledged,
            unconfirmed: a.unconfirmed(),
            display_total: a.display_total,
            balance: a.balance,
            unsent: a.unsent(&self.shared.user_id),
        }
    }

    /// Queues earnings an earlier run could not deliver. They are resent only
    /// if the next `start` resumes that same session.
    pub async fn carry_over(&self, unsent: UnsentEarnings) {
        *self.shared.carried.lock().await = Some(unsent);
    }

    /// Opens a session on the server (or resumes the one already open) and
    /// starts the accrual, flush and anti-cheat timers.
    pub async fn start(&self) -> Result<api::MiningSessionDto, AppError> {
        let s = &self.shared;
        let _life = s.lifecycle.lock().await;
        {
            let mut a = s.accounts.lock().await;
            if a.state != MiningState::Stopped {
                return Err(AppError::State(format!(
                    "cannot start mining while {:?}",
                    a.state
                )));
            }
            a.state = MiningState::Starting;
        }

        let (session, multiplier, resumed) = match self.open_session().await {
            Ok(v) => v,
            Err(e) => {
                s.accounts.lock().await.state = MiningState::Stopped;
                return Err(e);
            }
        };
        self.check_anti_cheat().await;

        let carried = match s.carried.lock().await.take() {
            Some(c) if resumed && c.user_id == s.user_id && c.session_id == session.id => Some(c),
            Some(c) => {
                warn!(
                    session_id = c.session_id,
                    pending = c.pending,
                    "unsent earnings belong to a session that is no longer open; discarding"
                );
                None
            }
            None => None,
        };
        {
            let mut a = s.accounts.lock().await;
            let balance = a.balance;
            *a = Accounts {
                state: MiningState::Active,
                session_id: Some(session.id),
                multiplier,
                acknowledged: session.earnings,
                display_total: session.earnings,
                last_seq: session.last_flush_seq,
                balance,
                ..Accounts::default()
            };
            if let Some(c) = carried {
                a.restore(c);
                info!(
                    session_id = session.id,
                    unconfirmed = a.unconfirmed(),
                    "resending earnings left by the previous run"
                );
            }
        }
        *s.timers.lock().await = Some(self.arm_timers());

        info!(
            user_id = %s.user_id,
            session_id = session.id,
            multiplier,
            resumed,
            "mining started"
        );
        let title = if resumed {
            "Mining resumed"
        } else {
            "Mining started"
        };
        s.notices
            .push(
                NoticeKind::Success,
                title,
                format!("Node is running at {multiplier}x."),
            )
            .await;
        Ok(session)
    }

    async fn open_session(&self) -> Result<(api::MiningSessionDto, f64, bool), AppError> {
        let s = &self.shared;
        match s.api.start_session(&s.user_id).await {
            Ok(r) => Ok((r.session, r.multiplier, false)),
            Err(e) if e.reason().as_deref() == Some("already_active") => {
                debug!(user_id = %s.user_id, "session already open; resuming it");
                let session = s
                    .api
                    .current_session(&s.user_id)
                    .await
                    .map_err(|e| AppError::Http(format!("fetch open session failed: {e}")))?
                    .ok_or_else(|| {
                        AppError::Http("server reported an open session but returned none".into())
                    })?;
                let user = s
                    .api
                    .user(&s.user_id)
                    .await
                    .map_err(|e| AppError::Http(format!("fetch user failed: {e}")))?;
                Ok((session, user.multiplier, true))
            }
            Err(e) => Err(AppError::Http(format!("start mining failed: {e}"))),
        }
    }

    /// Stops the timers, flushes what is left and closes the session with
    /// the full local total so the server can reconcile any unacknowledged
    /// batch. A transient failure leaves the node mining.
    pub async fn stop(&self) -> Result<api::EndSessionResp, AppError> {
        let s = &self.shared;
        let _life = s.lifecycle.lock().await;
        let session_id = {
            let mut a = s.accounts.lock().await;
            let (MiningState::Active, Some(id)) = (a.state, a.session_id) else {
                return Err(AppError::State(format!(
                    "cannot stop mining while {:?}",
                    a.state
                )));
            };
            a.state = MiningState::Stopping;
            id
        };
        self.disarm_timers().await;

        if let Err(e) = self.flush_batch().await {
            debug!(error=%e, session_id, "final flush failed; reconciling through end");
        }
        let final_earnings = {
            let a = s.accounts.lock().await;
            a.acknowledged + a.unconfirmed()
        };

        match s
            .api
            .end(session_id, &api::EndSessionReq { final_earnings })
            .await
        {
            Ok(resp) => {
                {
                    let mut a = s.accounts.lock().await;
                    a.clear_session();
                    a.acknowledged = resp.session.earnings;
                    a.display_total = resp.session.earnings;
                    a.balance = Some(resp.current_balance);
                }
                info!(
                    user_id = %s.user_id,
                    session_id,
                    final_earnings,
                    credited = resp.credited,
                    "mining stopped"
                );
                s.notices
                    .push(
                        NoticeKind::Success,
                        "Mining stopped",
                        format!("Session earned {:.4} CORD.", resp.session.earnings),
                    )
                    .await;
                Ok(resp)
            }
            Err(e) if e.is_transient() => {
                s.accounts.lock().await.state = MiningState::Active;
                *s.timers.lock().await = Some(self.arm_timers());
                warn!(error=%e, session_id, "ending session failed; node keeps mining");
                Err(AppError::Http(format!("end mining failed: {e}")))
            }
            Err(e) => {
                s.accounts.lock().await.clear_session();
                warn!(error=%e, session_id, "server refused to end session");
                s.notices
                    .push(
                        NoticeKind::Warning,
                        "Session closed",
                        "The server had already closed this session.",
                    )
                    .await;
                Err(AppError::Http(format!("end mining failed: {e}")))
            }
        }
    }

    /// Halts the timers without ending the session, for a process that exits
    /// while the server is unreachable. Returns what is still unconfirmed so
    /// the next run can resend it.
    pub async fn detach(&self) -> Option<UnsentEarnings> {
        let s = &self.shared;
        let _life = s.lifecycle.lock().await;
        self.disarm_timers().await;
        let _gate = s.flush_gate.lock().await;
        let mut a = s.accounts.lock().await;
        let unsent = a.unsent(&s.user_id);
        a.clear_session();
        unsent
    }

    /// Flushes outside the regular cadence, e.g. before the process exits.
    pub async fn flush_now(&self) -> Result<FlushOutcome, AppError> {
        if self.state().await != MiningState::Active {
            return Ok(FlushOutcome::Idle);
        }
        self.flush_batch()
            .await
            .map_err(|e| AppError::Http(format!("flush failed: {e}")))
    }

    async fn flush_batch(&self) -> Result<FlushOutcome, RestError> {
        let s = &self.shared;
        let _gate = s.flush_gate.lock().await;
        let (session_id, batch) = {
            let mut a = s.accounts.lock().await;
            let Some(session_id) = a.session_id else {
                return Ok(FlushOutcome::Idle);
            };
            let batch = match a.in_flight {
                Some(b) => b,
                None if a.pending > 0.0 => {
                    a.last_seq += 1;
                    let b = Batch {
                        seq: a.last_seq,
                        amount: std::mem::take(&mut a.pending),
                    };
                    a.in_flight = Some(b);
                    b
                }
                None => return Ok(FlushOutcome::Idle),
            };
            (session_id, batch)
        };

        let req = api::SaveEarningsReq {
            earnings_to_add: batch.amount,
            flush_seq: batch.seq,
        };
        match s.api.save(&s.user_id, session_id, &req).await {
            Ok(resp) => {
                {
                    let mut a = s.accounts.lock().await;
                    a.in_flight = None;
                    a.acknowledged = resp.session_earnings;
                    a.balance = Some(resp.current_balance);
                }
                debug!(
                    session_id,
                    seq = batch.seq,
                    amount = batch.amount,
                    credited = resp.credited,
                    duplicate = resp.duplicate,
                    "flush acknowledged"
                );
                if resp.duplicate {
                    s.notices
                        .push(
                            NoticeKind::Info,
                            "Earnings already recorded",
                            format!("Batch #{} was credited earlier.", batch.seq),
                        )
                        .await;
                    self.refresh_balance().await;
                } else if resp.credited + 1e-9 < batch.amount {
                    warn!(
                        session_id,
                        requested = batch.amount,
                        credited = resp.credited,
                        "server credited less than flushed"
                    );
                }
                Ok(FlushOutcome::Acknowledged {
                    credited: resp.credited,
                    duplicate: resp.duplicate,
                })
            }
            Err(e) if e.is_transient() => {
                warn!(error=%e, session_id, seq = batch.seq, "flush failed; batch kept for retry");
                Err(e)
            }
            Err(e) => {
                s.accounts.lock().await.in_flight = None;
                warn!(error=%e, session_id, seq = batch.seq, amount = batch.amount, "flush rejected; dropping batch");
                s.notices
                    .push(
                        NoticeKind::Warning,
                        "Earnings not saved",
                        format!(
                            "The server rejected {:.4} CORD ({}).",
                            batch.amount,
                            e.reason().unwrap_or_else(|| e.to_string())
                        ),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn refresh_balance(&self) {
        let s = &self.shared;
        match s.api.user(&s.user_id).await {
            Ok(u) => s.accounts.lock().await.balance = Some(u.current_balance),
            Err(e) => debug!(error=%e, "balance refresh failed"),
        }
    }

    async fn check_anti_cheat(&self) {
        let s = &self.shared;
        let before = s.tracker.status().await;
        if let Ok(Some(now)) = s.tracker.refresh(s.api.as_ref(), &s.user_id).await
            && now.penalty_level > before.penalty_level
        {
            s.notices
                .push(
                    NoticeKind::Warning,
                    "Mining efficiency reduced",
                    format!(
                        "{} other account(s) share your network; efficiency is {:.0}%.",
                        now.other_accounts,
                        now.efficiency_multiplier * 100.0
                    ),
                )
                .await;
        }
    }

    async fn accrue(&self, period: Duration) {
        let efficiency = self.shared.tracker.efficiency().await;
        let mut a = self.shared.accounts.lock().await;
        if a.state != MiningState::Active {
            return;
        }
        let amount = policy::accrual_per_second(a.multiplier, efficiency) * period.as_secs_f64();
        a.pending += amount;
        a.display_total += amount;
    }

    /// The server closed the session behind our back; stop without ending it.
    async fn session_lost(&self) {
        self.shared.accounts.lock().await.clear_session();
        if let Some(t) = self.shared.timers.lock().await.take() {
            t.cancel.cancel();
        }
        warn!(user_id = %self.shared.user_id, "session closed by server; node stopped");
        self.shared
            .notices
            .push(
                NoticeKind::Warning,
                "Mining stopped",
                "The server closed this session.",
            )
            .await;
    }

    fn arm_timers(&self) -> Timers {
        let cancel = CancellationToken::new();
        let timing = self.shared.timing;
        let accrual = timing.accrual();
        let handles = vec![
            self.spawn_every(accrual, cancel.clone(), move |node| async move {
                node.accrue(accrual).await
            }),
            self.spawn_every(timing.flush(), cancel.clone(), |node| async move {
                if let Err(e) = node.flush_batch().await
                    && session_gone(&e)
                {
                    node.session_lost().await;
                }
            }),
            self.spawn_every(timing.anti_cheat(), cancel.clone(), |node| async move {
                node.check_anti_cheat().await
            }),
        ];
        Timers { cancel, handles }
    }

    fn spawn_every<F, Fut>(&self, period: Duration, cancel: CancellationToken, mut f: F) -> JoinHandle<()>
    where
        F: FnMut(MiningNode) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let node = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => f(node.clone()).await,
                }
            }
        })
    }

    async fn disarm_timers(&self) {
        let timers = self.shared.timers.lock().await.take();
        let Some(t) = timers else {
            return;
        };
        t.cancel.cancel();
        for h in t.handles {
            if let Err(e) = h.await {
                warn!(error=%e, "mining timer task ended abnormally");
            }
        }
    }
}
