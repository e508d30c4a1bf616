use async_trait::async_trait;
use cordnode_shared::api::{self, rest::RestError};

/// Ledger calls the mining node depends on.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn user(&self, user_id: &str) -> Result<api::UserDto, RestError>;
    async fn start_session(&self, user_id: &str) -> Result<api::StartMiningResp, RestError>;
    async fn current_session(
        &self,
        user_id: &str,
    ) -> Result<Option<api::MiningSessionDto>, RestError>;
    async fn save(
        &self,
        user_id: &str,
        session_id: i32,
        req: &api::SaveEarningsReq,
    ) -> Result<api::SaveEarningsResp, RestError>;
    async fn end(
        &self,
        session_id: i32,
        req: &api::EndSessionReq,
    ) -> Result<api::EndSessionResp, RestError>;
    async fn anti_cheat(&self, user_id: &str) -> Result<api::AntiCheatStatus, RestError>;
}

/// HTTP implementation over the shared REST helpers.
pub struct RestLedger {
    base: String,
}

impl RestLedger {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl LedgerApi for RestLedger {
    async fn user(&self, user_id: &str) -> Result<api::UserDto, RestError> {
        api::rest::get_user(&self.base, user_id).await
    }

    async fn start_session(&self, user_id: &str) -> Result<api::StartMiningResp, RestError> {
        api::rest::start_mining(&self.base, user_id).await
    }

    async fn current_session(
        &self,
        user_id: &str,
    ) -> Result<Option<api::MiningSessionDto>, RestError> {
        api::rest::current_mining(&self.base, user_id).await
    }

    async fn save(
        &self,
        user_id: &str,
        session_id: i32,
        req: &api::SaveEarningsReq,
    ) -> Result<api::SaveEarningsResp, RestError> {
        api::rest::save_mining(&self.base, user_id, session_id, req).await
    }

    async fn end(
        &self,
        session_id: i32,
        req: &api::EndSessionReq,
    ) -> Result<api::EndSessionResp, RestError> {
        api::rest::end_mining(&self.base, session_id, req).await
    }

    async fn anti_cheat(&self, user_id: &str) -> Result<api::AntiCheatStatus, RestError> {
        api::rest::anti_cheat_check(&self.base, user_id).await
    }
}
