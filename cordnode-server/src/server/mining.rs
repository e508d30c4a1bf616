use axum::{
    Json,
    extract::{Path, Query, State},
};
use cordnode_shared::api;
use serde::Deserialize;

use super::{AppError, AppState, dto};
use crate::ledger;
use crate::storage::{EndOutcome, SaveOutcome, StartOutcome};

const DEFAULT_HISTORY_LIMIT: usize = 20;

pub async fn api_start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::StartMiningResp>, AppError> {
    match state
        .store
        .start_mining_session(&id, ledger::now())
        .await?
    {
        StartOutcome::Started(session) => {
            let multiplier = state
                .store
                .get_user(&id)
                .await?
                .map(|u| u.multiplier)
                .unwrap_or(1.0);
            Ok(Json(api::StartMiningResp {
                session: dto::session(session),
                multiplier,
            }))
        }
        StartOutcome::AlreadyActive(open) => Err(AppError::conflict(
            "already_active",
            format!("session {} is already open", open.id),
        )),
        StartOutcome::UnknownUser => Err(AppError::not_found(format!("user not found: {id}"))),
    }
}

pub async fn api_current(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<api::MiningSessionDto>>, AppError> {
    if state.store.get_user(&id).await?.is_none() {
        return Err(AppError::not_found(format!("user not found: {id}")));
    }
    let open = state.store.current_session(&id).await?;
    Ok(Json(open.map(dto::session)))
}

#[derive(Deserialize)]
pub struct HistoryOpts {
    limit: Option<usize>,
}

pub async fn api_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(opts): Query<HistoryOpts>,
) -> Result<Json<Vec<api::MiningSessionDto>>, AppError> {
    let rows = state
        .store
        .session_history(&id, opts.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;
    Ok(Json(rows.into_iter().map(dto::session).collect()))
}

#[derive(Deserialize)]
pub struct UserSessionPath {
    id: String,
    session_id: i32,
}

pub async fn api_save(
    State(state): State<AppState>,
    Path(p): Path<UserSessionPath>,
    Json(body): Json<api::SaveEarningsReq>,
) -> Result<Json<api::SaveEarningsResp>, AppError> {
    let outcome = state
        .store
        .save_mining_progress(
            &p.id,
            p.session_id,
            body.earnings_to_add,
            body.flush_seq,
            ledger::now(),
        )
        .await?;
    match outcome {
        SaveOutcome::Saved(r) => Ok(Json(dto::save_receipt(r, false))),
        SaveOutcome::Duplicate(r) => Ok(Json(dto::save_receipt(r, true))),
        SaveOutcome::UnknownSession => Err(AppError::not_found(format!(
            "session not found: {}",
            p.session_id
        ))),
        SaveOutcome::SessionClosed => {
            Err(AppError::rejected("session_closed", "session already ended"))
        }
        SaveOutcome::InvalidAmount => Err(AppError::rejected(
            "invalid_amount",
            "earnings_to_add must be finite and non-negative",
        )),
    }
}

pub async fn api_end(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    Json(body): Json<api::EndSessionReq>,
) -> Result<Json<api::EndSessionResp>, AppError> {
    match state
        .store
        .end_mining_session(session_id, body.final_earnings, ledger::now())
        .await?
    {
        EndOutcome::Ended(r) => Ok(Json(api::EndSessionResp {
            credited: r.credited,
            current_balance: r.current_balance,
            session: dto::session(r.session),
        })),
        EndOutcome::UnknownSession => Err(AppError::not_found(format!(
            "session not found: {session_id}"
        ))),
        EndOutcome::AlreadyEnded(_) => {
            Err(AppError::rejected("session_closed", "session already ended"))
        }
        EndOutcome::InvalidAmount => Err(AppError::rejected(
            "invalid_amount",
            "final_earnings must be finite and non-negative",
        )),
    }
}

pub async fn api_update(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    Json(body): Json<api::UpdateSessionReq>,
) -> Result<Json<api::MiningSessionDto>, AppError> {
    let session = state
        .store
        .update_session_metrics(session_id, body.hash_rate, body.efficiency)
        .await?
        .ok_or_else(|| AppError::not_found(format!("session not found: {session_id}")))?;
    Ok(Json(dto::session(session)))
}
