use axum::{
    Json,
    extract::{Path, State},
};
use cordnode_shared::api;
use serde::Deserialize;

use super::{AppError, AppState, dto};
use crate::ledger;
use crate::storage::TaskOutcome;

pub async fn api_list_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::TaskDto>>, AppError> {
    let rows = state.store.list_tasks().await?;
    Ok(Json(rows.into_iter().map(dto::task).collect()))
}

pub async fn api_list_user_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<api::UserTaskDto>>, AppError> {
    let views = state
        .store
        .list_user_tasks(&id, ledger::now())
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))?;
    Ok(Json(views.into_iter().map(dto::user_task).collect()))
}

#[derive(Deserialize)]
pub struct UserTaskPath {
    id: String,
    task_id: String,
}

pub async fn api_complete_task(
    State(state): State<AppState>,
    Path(p): Path<UserTaskPath>,
    body: Option<Json<api::CompleteTaskReq>>,
) -> Result<Json<api::CompleteTaskResp>, AppError> {
    let claimed = body.and_then(|Json(b)| b.reward_amount);
    let outcome = state
        .store
        .complete_task(&p.id, &p.task_id, ledger::now())
        .await?;
    match outcome {
        TaskOutcome::Completed {
            reward,
            new_balance,
        } => {
            if let Some(c) = claimed
                && (c - reward).abs() > 1e-9
            {
                tracing::debug!(
                    user_id = %p.id,
                    task_id = %p.task_id,
                    claimed = c,
                    reward,
                    "client reward estimate differs"
                );
            }
            Ok(Json(api::CompleteTaskResp {
                success: true,
                new_balance: Some(new_balance),
                reward: Some(reward),
                error: None,
            }))
        }
        TaskOutcome::AlreadyCompleted => Err(AppError::rejected(
            "already_completed",
            "task already completed",
        )),
        TaskOutcome::CheckInAlreadyClaimed => Err(AppError::rejected(
            "check_in_claimed",
            "daily check-in already claimed today",
        )),
        TaskOutcome::NotEligible {
            progress,
            max_progress,
        } => Err(AppError::rejected(
            "not_eligible",
            format!("progress {progress}/{max_progress}"),
        )),
        TaskOutcome::Expired => Err(AppError::rejected("expired", "task has expired")),
        TaskOutcome::UnknownUser => Err(AppError::not_found(format!("user not found: {}", p.id))),
        TaskOutcome::UnknownTask => Err(AppError::not_found(format!(
            "task not found: {}",
            p.task_id
        ))),
    }
}
