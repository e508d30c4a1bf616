//! Minimal REST client helpers for consumers (clients).

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    /// Machine-readable rejection reason carried in an error body, if any.
    pub fn reason(&self) -> Option<String> {
        match self {
            RestError::Status { body, .. } => serde_json::from_str::<ErrorDto>(body)
                .ok()
                .and_then(|e| e.reason),
            _ => None,
        }
    }

    /// Transport failures and 5xx answers are worth retrying; 4xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            RestError::Http(_) => true,
            RestError::Status { status, .. } => *status >= 500,
            RestError::Serde(_) => false,
        }
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(15))
        .build()
        .expect("failed to build HTTP client")
});

fn mk_client() -> Result<reqwest::Client, RestError> {
    Ok(HTTP_CLIENT.clone())
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn get_json<T: for<'de> serde::Deserialize<'de>>(url: String) -> Result<T, RestError> {
    let client = mk_client()?;
    let res = client
        .get(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn send_json<B: serde::Serialize, T: for<'de> serde::Deserialize<'de>>(
    method: reqwest::Method,
    url: String,
    body: &B,
) -> Result<T, RestError> {
    let client = mk_client()?;
    let res = client
        .request(method, url)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn server_version(base: &str) -> Result<VersionInfoDto, RestError> {
    get_json(ep::version(base)).await
}

pub async fn get_user(base: &str, user_id: &str) -> Result<UserDto, RestError> {
    get_json(ep::user(base, user_id)).await
}

pub async fn login_user(base: &str, req: &CreateUserReq) -> Result<CreateUserResp, RestError> {
    send_json(reqwest::Method::POST, ep::users(base), req).await
}

pub async fn leaderboard(base: &str, limit: u32) -> Result<Vec<LeaderboardEntryDto>, RestError> {
    get_json(ep::leaderboard(base, limit)).await
}

pub async fn user_tasks(base: &str, user_id: &str) -> Result<Vec<UserTaskDto>, RestError> {
    get_json(ep::user_tasks(base, user_id)).await
}

pub async fn complete_task(
    base: &str,
    user_id: &str,
    task_id: &str,
    req: &CompleteTaskReq,
) -> Result<CompleteTaskResp, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::complete_task(base, user_id, task_id),
        req,
    )
    .await
}

pub async fn start_mining(base: &str, user_id: &str) -> Result<StartMiningResp, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::mining_start(base, user_id),
        &serde_json::json!({}),
    )
    .await
}

pub async fn current_mining(
    base: &str,
    user_id: &str,
) -> Result<Option<MiningSessionDto>, RestError> {
    get_json(ep::mining_current(base, user_id)).await
}

pub async fn save_mining(
    base: &str,
    user_id: &str,
    session_id: i32,
    req: &SaveEarningsReq,
) -> Result<SaveEarningsResp, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::mining_save(base, user_id, session_id),
        req,
    )
    .await
}

pub async fn end_mining(
    base: &str,
    session_id: i32,
    req: &EndSessionReq,
) -> Result<EndSessionResp, RestError> {
    send_json(reqwest::Method::POST, ep::mining_end(base, session_id), req).await
}

pub async fn update_mining_metrics(
    base: &str,
    session_id: i32,
    req: &UpdateSessionReq,
) -> Result<MiningSessionDto, RestError> {
    send_json(reqwest::Method::PUT, ep::mining_session(base, session_id), req).await
}

pub async fn redeem_referral(
    base: &str,
    user_id: &str,
    req: &RedeemReferralReq,
) -> Result<ReferralResultDto, RestError> {
    send_json(reqwest::Method::POST, ep::referral(base, user_id), req).await
}

pub async fn anti_cheat_check(base: &str, user_id: &str) -> Result<AntiCheatStatus, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::anti_cheat(base, user_id),
        &serde_json::json!({}),
    )
    .await
}

pub async fn get_settings(base: &str, user_id: &str) -> Result<SettingsDto, RestError> {
    get_json(ep::settings(base, user_id)).await
}

pub async fn put_settings(
    base: &str,
    user_id: &str,
    settings: &SettingsDto,
) -> Result<SettingsDto, RestError> {
    send_json(reqwest::Method::PUT, ep::settings(base, user_id), settings).await
}
