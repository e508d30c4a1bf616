use axum::{
    Json,
    extract::{Path, Query, State},
    http::{Extensions, HeaderMap},
};
use cordnode_shared::api;
use serde::Deserialize;

use super::{AppError, AppState, dto, referrals};
use crate::ledger;
use crate::storage::{BadgeOutcome, ReferralOutcome};

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Create-or-login after the Discord OAuth exchange. A referral code is only
/// honoured on the call that creates the account. The caller's address is
/// recorded for the shared-IP check on every login.
pub async fn api_login_or_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(body): Json<api::CreateUserReq>,
) -> Result<Json<api::CreateUserResp>, AppError> {
    let now = ledger::now();
    let res = state.store.login_or_create(&body, now).await?;
    let mut user = res.user;
    let mut referral = None;
    let mut referral_error = None;

    let code = body
        .referral_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if res.created
        && let Some(code) = code
    {
        match state
            .store
            .process_new_user_referral(&user.id, code, now)
            .await?
        {
            ReferralOutcome::Applied(bonus) => {
                referral = Some(referrals::bonus_dto(bonus));
                if let Some(fresh) = state.store.get_user(&user.id).await? {
                    user = fresh;
                }
            }
            other => {
                tracing::info!(user_id = %user.id, ?other, "signup referral not applied");
                referral_error = referrals::rejection_reason(&other).map(str::to_string);
            }
        }
    }

    match referrals::client_ip(&headers, &extensions) {
        Some(ip) => {
            if let Some(status) = state.store.record_ip_and_status(&user.id, &ip, now).await? {
                tracing::debug!(
                    user_id = %user.id,
                    penalty_level = status.penalty_level,
                    "login address recorded"
                );
            }
        }
        None => tracing::debug!(user_id = %user.id, "login without a client address"),
    }

    Ok(Json(api::CreateUserResp {
        user: dto::user(user),
        created: res.created,
        referral,
        referral_error,
    }))
}

pub async fn api_get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::UserDto>, AppError> {
    let user = state
        .store
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))?;
    Ok(Json(dto::user(user)))
}

pub async fn api_get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<api::UserDto>, AppError> {
    let user = state
        .store
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {username}")))?;
    Ok(Json(dto::user(user)))
}

pub async fn api_update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<api::UpdateUserReq>,
) -> Result<Json<api::UserDto>, AppError> {
    let user = state
        .store
        .update_profile(&id, &body)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))?;
    Ok(Json(dto::user(user)))
}

pub async fn api_activate_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::NodeStatusDto>, AppError> {
    set_node(&state, &id, true).await
}

pub async fn api_deactivate_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::NodeStatusDto>, AppError> {
    set_node(&state, &id, false).await
}

async fn set_node(
    state: &AppState,
    id: &str,
    active: bool,
) -> Result<Json<api::NodeStatusDto>, AppError> {
    let user = state
        .store
        .set_node_active(id, active, ledger::now())
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))?;
    Ok(Json(dto::node_status(&user)))
}

pub async fn api_get_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::SettingsDto>, AppError> {
    let settings = state
        .store
        .get_settings(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))?;
    Ok(Json(settings))
}

pub async fn api_put_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<api::SettingsDto>,
) -> Result<Json<api::SettingsDto>, AppError> {
    let settings = state
        .store
        .put_settings(&id, &body)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
pub struct LimitOpts {
    limit: Option<usize>,
}

pub async fn api_leaderboard(
    State(state): State<AppState>,
    Query(opts): Query<LimitOpts>,
) -> Result<Json<Vec<api::LeaderboardEntryDto>>, AppError> {
    let limit = opts
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    let rows = state.store.leaderboard(limit).await?;
    let items = rows
        .into_iter()
        .enumerate()
        .map(|(i, u)| dto::leaderboard_entry(i as u32 + 1, u))
        .collect();
    Ok(Json(items))
}

pub async fn api_stats(State(state): State<AppState>) -> Result<Json<api::StatsDto>, AppError> {
    let s = state.store.network_stats().await?;
    Ok(Json(api::StatsDto {
        total_users: s.total_users,
        active_nodes: s.active_nodes,
        total_earned: s.total_earned,
        total_sessions: s.total_sessions,
        total_tasks_completed: s.total_tasks_completed,
    }))
}

pub async fn api_badge_purchase(
    State(state): State<AppState>,
    Json(body): Json<api::BadgePurchaseReq>,
) -> Result<Json<api::BadgePurchaseResp>, AppError> {
    match state
        .store
        .record_badge_purchase(&body, ledger::now())
        .await?
    {
        BadgeOutcome::Recorded(p) => Ok(Json(api::BadgePurchaseResp {
            id: p.id,
            user_id: p.user_id,
            transaction_hash: p.transaction_hash,
            has_badge_of_honor: true,
        })),
        BadgeOutcome::DuplicateTransaction => Err(AppError::conflict(
            "duplicate_transaction",
            "transaction already recorded",
        )),
        BadgeOutcome::UnknownUser => Err(AppError::not_found(format!(
            "user not found: {}",
            body.user_id
        ))),
    }
}
