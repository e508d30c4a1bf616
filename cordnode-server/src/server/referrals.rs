use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Path, Request, State},
    http::{Extensions, HeaderMap},
};
use cordnode_shared::api;

use super::{AppError, AppState, dto};
use crate::ledger;
use crate::storage::{ReferralBonus, ReferralOutcome};

pub(super) fn bonus_dto(b: ReferralBonus) -> api::ReferralResultDto {
    api::ReferralResultDto {
        referrer_id: b.referrer_id,
        welcome_bonus: b.welcome_bonus,
        referrer_bonus: b.referrer_bonus,
    }
}

/// Machine-readable reason for a referral that was not applied.
pub(super) fn rejection_reason(outcome: &ReferralOutcome) -> Option<&'static str> {
    match outcome {
        ReferralOutcome::Applied(_) => None,
        ReferralOutcome::AlreadyReferred => Some("already_referred"),
        ReferralOutcome::InvalidCode => Some("invalid_code"),
        ReferralOutcome::SelfReferral => Some("self_referral"),
        ReferralOutcome::UnknownUser => Some("not_found"),
    }
}

pub async fn api_redeem(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<api::RedeemReferralReq>,
) -> Result<Json<api::ReferralResultDto>, AppError> {
    let outcome = state
        .store
        .process_new_user_referral(&id, &body.code, ledger::now())
        .await?;
    match outcome {
        ReferralOutcome::Applied(bonus) => Ok(Json(bonus_dto(bonus))),
        ReferralOutcome::UnknownUser => Err(AppError::not_found(format!("user not found: {id}"))),
        ReferralOutcome::AlreadyReferred => Err(AppError::rejected(
            "already_referred",
            "a referral code was already applied",
        )),
        ReferralOutcome::InvalidCode => {
            Err(AppError::rejected("invalid_code", "unknown referral code"))
        }
        ReferralOutcome::SelfReferral => Err(AppError::rejected(
            "self_referral",
            "cannot redeem your own referral code",
        )),
    }
}

pub async fn api_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<api::ReferralEntryDto>>, AppError> {
    if state.store.get_user(&id).await?.is_none() {
        return Err(AppError::not_found(format!("user not found: {id}")));
    }
    let rows = state.store.list_referrals(&id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(r, name)| dto::referral_entry(r, name))
            .collect(),
    ))
}

/// Records the caller's address and returns the shared-IP verdict.
pub async fn api_anti_cheat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> Result<Json<api::AntiCheatStatus>, AppError> {
    let ip = client_ip(req.headers(), req.extensions()).ok_or_else(|| AppError::bad_request("client address unknown"))?;
    let status = state
        .store
        .record_ip_and_status(&id, &ip, ledger::now())
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))?;
    Ok(Json(status))
}

/// First hop of `X-Forwarded-For`, falling back to the peer address.
pub(super) fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    forwarded.or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut req = Request::builder()
            .header("x-forwarded-for", "203.0.113.5, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));
        assert_eq!(client_ip(req.headers(), req.extensions()).as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(req.headers(), req.extensions()), None);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 9000))));
        assert_eq!(client_ip(req.headers(), req.extensions()).as_deref(), Some("192.0.2.4"));
    }
}
