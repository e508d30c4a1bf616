//! In-memory ledger used by the client unit tests.

use async_trait::async_trait;
use cordnode_shared::api::{self, AntiCheatStatus, rest::RestError};
use tokio::sync::Mutex;

use crate::remote::LedgerApi;

const USER_ID: &str = "user-1";

#[derive(Debug, Clone)]
struct FakeSession {
    id: i32,
    earnings: f64,
    last_seq: i64,
}

#[derive(Debug, Default)]
struct FakeState {
    multiplier: f64,
    balance: f64,
    next_session_id: i32,
    open: Option<FakeSession>,
    credited_total: f64,
    save_attempts: Vec<api::SaveEarningsReq>,
    end_attempts: Vec<f64>,
    fail_saves: u32,
    lose_acks: u32,
    fail_ends: u32,
    anti_cheat: AntiCheatStatus,
    anti_cheat_fails: bool,
    anti_cheat_calls: u32,
}

pub(crate) struct FakeLedger {
    state: Mutex<FakeState>,
}

fn rejected(status: u16, reason: &str) -> RestError {
    RestError::Status {
        status,
        body: serde_json::json!({"error": reason, "reason": reason}).to_string(),
    }
}

fn down() -> RestError {
    RestError::Http("connection refused".into())
}

fn dto(user_id: &str, s: &FakeSession, ended: bool) -> api::MiningSessionDto {
    api::MiningSessionDto {
        id: s.id,
        user_id: user_id.to_string(),
        start_time: "2025-06-01T00:00:00Z".into(),
        end_time: ended.then(|| "2025-06-01T01:00:00Z".to_string()),
        earnings: s.earnings,
        hash_rate: 0.0,
        efficiency: 1.0,
        last_flush_seq: s.last_seq,
    }
}

impl FakeLedger {
    pub(crate) fn new(multiplier: f64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                multiplier,
                next_session_id: 1,
                ..FakeState::default()
            }),
        }
    }

    pub(crate) fn user_id(&self) -> String {
        USER_ID.to_string()
    }

    pub(crate) async fn set_anti_cheat(&self, status: AntiCheatStatus) {
        self.state.lock().await.anti_cheat = status;
    }
    pub(crate) async fn fail_anti_cheat(&self, fail: bool) {
        self.state.lock().await.anti_cheat_fails = fail;
    }
    pub(crate) async fn anti_cheat_calls(&self) -> u32 {
        self.state.lock().await.anti_cheat_calls
    }
    /// The next `n` saves fail before reaching the ledger.
    pub(crate) async fn fail_next_saves(&self, n: u32) {
        self.state.lock().await.fail_saves = n;
    }
    /// The next `n` saves are applied but the reply is lost.
    pub(crate) async fn lose_next_acks(&self, n: u32) {
        self.state.lock().await.lose_acks = n;
    }
    pub(crate) async fn fail_next_ends(&self, n: u32) {
        self.state.lock().await.fail_ends = n;
    }
    pub(crate) async fn open_existing(&self, earnings: f64, last_seq: i64) -> i32 {
        let mut s = self.state.lock().await;
        let id = s.next_session_id;
        s.next_session_id += 1;
        s.open = Some(FakeSession {
            id,
            earnings,
            last_seq,
        });
        id
    }
    pub(crate) async fn close_remotely(&self) {
        self.state.lock().await.open = None;
    }
    pub(crate) async fn save_seqs(&self) -> Vec<i64> {
        let s = self.state.lock().await;
        s.save_attempts.iter().map(|r| r.flush_seq).collect()
    }
    pub(crate) async fn end_attempts(&self) -> Vec<f64> {
        self.state.lock().await.end_attempts.clone()
    }
    pub(crate) async fn credited_total(&self) -> f64 {
        self.state.lock().await.credited_total
    }
}

#[async_trait]
impl LedgerApi for FakeLedger {
    async fn user(&self, user_id: &str) -> Result<api::UserDto, RestError> {
        let s = self.state.lock().await;
        Ok(api::UserDto {
            id: user_id.to_string(),
            discord_id: "1".into(),
            username: "miner".into(),
            discriminator: None,
            avatar: None,
            account_age_years: 0.0,
            multiplier: s.multiplier,
            current_balance: s.balance,
            total_earned: s.balance,
            weekly_earnings: s.balance,
            monthly_earnings: s.balance,
            referral_earnings: 0.0,
            is_node_active: s.open.is_some(),
            node_start_time_ms: None,
            tasks_completed_count: 0,
            referral_code: "CORDTEST".into(),
            referred_by_user_id: None,
            total_referrals: 0,
            daily_check_in_claimed: false,
            last_login_time_ms: 0,
            has_badge_of_honor: false,
        })
    }

    async fn start_session(&self, user_id: &str) -> Result<api::StartMiningResp, RestError> {
        let mut s = self.state.lock().await;
        if s.open.is_some() {
            return Err(rejected(409, "already_active"));
        }
        let session = FakeSession {
            id: s.next_session_id,
            earnings: 0.0,
            last_seq: 0,
        };
        s.next_session_id += 1;
        s.open = Some(session.clone());
        Ok(api::StartMiningResp {
            session: dto(user_id, &session, false),
            multiplier: s.multiplier,
        })
    }

    async fn current_session(
        &self,
        user_id: &str,
    ) -> Result<Option<api::MiningSessionDto>, RestError> {
        let s = self.state.lock().await;
        Ok(s.open.as_ref().map(|o| dto(user_id, o, false)))
    }

    async fn save(
        &self,
        _user_id: &str,
        session_id: i32,
        req: &api::SaveEarningsReq,
    ) -> Result<api::SaveEarningsResp, RestError> {
        let mut s = self.state.lock().await;
        s.save_attempts.push(req.clone());
        if s.fail_saves > 0 {
            s.fail_saves -= 1;
            return Err(down());
        }
        let Some(mut open) = s.open.clone().filter(|o| o.id == session_id) else {
            return Err(rejected(400, "session_closed"));
        };
        let duplicate = req.flush_seq <= open.last_seq;
        let credited = if duplicate { 0.0 } else { req.earnings_to_add };
        if !duplicate {
            open.earnings += credited;
            open.last_seq = req.flush_seq;
            s.balance += credited;
            s.credited_total += credited;
            s.open = Some(open.clone());
        }
        if s.lose_acks > 0 {
            s.lose_acks -= 1;
            return Err(down());
        }
        Ok(api::SaveEarningsResp {
            session_id,
            credited,
            session_earnings: open.earnings,
            current_balance: s.balance,
            duplicate,
        })
    }

    async fn end(
        &self,
        session_id: i32,
        req: &api::EndSessionReq,
    ) -> Result<api::EndSessionResp, RestError> {
        let mut s = self.state.lock().await;
        s.end_attempts.push(req.final_earnings);
        if s.fail_ends > 0 {
            s.fail_ends -= 1;
            return Err(down());
        }
        let Some(mut open) = s.open.clone().filter(|o| o.id == session_id) else {
            return Err(rejected(400, "session_closed"));
        };
        s.open = None;
        let credited = (req.final_earnings - open.earnings).max(0.0);
        open.earnings += credited;
        s.balance += credited;
        s.credited_total += credited;
        Ok(api::EndSessionResp {
            session: dto(USER_ID, &open, true),
            credited,
            current_balance: s.balance,
        })
    }

    async fn anti_cheat(&self, _user_id: &str) -> Result<AntiCheatStatus, RestError> {
        let mut s = self.state.lock().await;
        s.anti_cheat_calls += 1;
        if s.anti_cheat_fails {
            return Err(down());
        }
        Ok(s.anti_cheat)
    }
}
