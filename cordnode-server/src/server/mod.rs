mod config;
mod dto;
mod mining;
mod referrals;
mod tasks;
mod users;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    http::{Method, StatusCode, header},
    routing::{get, post},
};
pub use config::{AntiCheatConfig, AppConfig, ConfigError, MiningConfig, ReferralConfig};
use cordnode_shared::api;
use cordnode_shared::path::{session_id_from_path, user_id_from_path};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info_span;
use uuid::Uuid;

use crate::storage::StorageError;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Self {
        Self {
            config,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(String);

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/version", get(api_version))
        .route("/api/users", post(users::api_login_or_create))
        .route(
            "/api/users/{id}",
            get(users::api_get_user).put(users::api_update_user),
        )
        .route(
            "/api/users/username/{username}",
            get(users::api_get_user_by_username),
        )
        .route("/api/users/{id}/activate-node", post(users::api_activate_node))
        .route(
            "/api/users/{id}/deactivate-node",
            post(users::api_deactivate_node),
        )
        .route(
            "/api/users/{id}/settings",
            get(users::api_get_settings).put(users::api_put_settings),
        )
        .route("/api/leaderboard", get(users::api_leaderboard))
        .route("/api/stats", get(users::api_stats))
        .route("/api/badge-purchases", post(users::api_badge_purchase))
        .route("/api/tasks", get(tasks::api_list_tasks))
        .route("/api/users/{id}/tasks", get(tasks::api_list_user_tasks))
        .route(
            "/api/users/{id}/tasks/{task_id}/complete",
            post(tasks::api_complete_task),
        )
        .route("/api/users/{id}/mining/start", post(mining::api_start))
        .route("/api/users/{id}/mining/current", get(mining::api_current))
        .route("/api/users/{id}/mining/history", get(mining::api_history))
        .route(
            "/api/users/{id}/mining/{session_id}/save",
            post(mining::api_save),
        )
        .route("/api/mining/{session_id}", axum::routing::put(mining::api_update))
        .route("/api/mining/{session_id}/end", post(mining::api_end))
        .route("/api/users/{id}/referral", post(referrals::api_redeem))
        .route("/api/users/{id}/referrals", get(referrals::api_list))
        .route("/api/users/{id}/anti-cheat", post(referrals::api_anti_cheat))
        .with_state(state.clone());

    // Ledger events inside a request inherit the user and session it targets
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let path = req.uri().path();
        let request_id = req.extensions().get::<ReqId>().map_or("-", |r| r.0.as_str());
        let user_id = user_id_from_path(path);
        info_span!(
            "request",
            method = %req.method(),
            path = %path,
            request_id = %request_id,
            user_id = user_id.as_deref(),
            session_id = session_id_from_path(path),
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .merge(api)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(stamp_request));

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn api_version() -> Json<api::VersionInfoDto> {
    Json(api::VersionInfoDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Tags the request with the caller's `x-request-id` (or a fresh one), echoes
/// it on the response and marks the response uncacheable.
async fn stamp_request(mut req: Request, next: Next) -> AxumResponse {
    let rid = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        headers.insert(REQUEST_ID, hv);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp
}

#[derive(Debug)]
pub enum AppError {
    /// Validation failure or business rejection; `reason` is machine-readable.
    BadRequest {
        message: String,
        reason: &'static str,
    },
    NotFound(String),
    Conflict {
        message: String,
        reason: &'static str,
    },
    Internal(String),
}

impl AppError {
    fn rejected<T: Into<String>>(reason: &'static str, msg: T) -> Self {
        Self::BadRequest {
            message: msg.into(),
            reason,
        }
    }
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::rejected("invalid_request", msg)
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn conflict<T: Into<String>>(reason: &'static str, msg: T) -> Self {
        Self::Conflict {
            message: msg.into(),
            reason,
        }
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidInput(m) => AppError::bad_request(m),
            StorageError::Conflict(m) => AppError::conflict("conflict", m),
            other => AppError::internal(other),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, reason, detail) = match self {
            AppError::BadRequest { message, reason } => {
                (StatusCode::BAD_REQUEST, message, reason, None)
            }
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict { message, reason } => (StatusCode::CONFLICT, message, reason, None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, reason, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, reason, message = %msg, "request rejected");
        }
        let body = Json(api::ErrorDto {
            error: msg,
            reason: Some(reason.to_string()),
        });
        (status, body).into_response()
    }
}
