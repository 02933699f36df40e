//! Authenticated HTTP trigger for the reminder cycle.

use crate::error::AppError;
use crate::reminder::{Clock, CycleError, ReminderEvaluator};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const REMINDERS_ROUTE: &str = "/api/cron/reminders";

#[derive(Clone)]
pub struct ApiState {
    evaluator: Arc<ReminderEvaluator>,
    secret: Option<String>,
    clock: Arc<dyn Clock>,
}

impl ApiState {
    /// Without a secret every trigger is rejected.
    pub fn new(
        evaluator: Arc<ReminderEvaluator>,
        secret: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let secret = secret.filter(|value| !value.trim().is_empty());
        if secret.is_none() {
            tracing::warn!("cron secret is not configured, HTTP triggers will be rejected");
        }
        Self {
            evaluator,
            secret,
            clock,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Cycle(#[from] CycleError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Cycle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct CycleResponse {
    success: bool,
    checked: usize,
    sent: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct UsageResponse {
    message: &'static str,
}

/// Routes:
/// - POST /api/cron/reminders - run one reminder cycle
/// - GET /api/cron/reminders - usage hint, runs nothing
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(REMINDERS_ROUTE, get(usage).post(trigger_cycle))
        .with_state(state)
}

/// Serves `router` on `bind` until `shutdown` is cancelled.
pub async fn serve(bind: &str, router: Router, shutdown: CancellationToken) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::io(format!("bind {bind}: {err}")))?;
    tracing::info!(%bind, "reminder trigger listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|err| AppError::io(format!("http server: {err}")))
}

/// POST /api/cron/reminders
async fn trigger_cycle(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if !authorized(&headers, state.secret.as_deref()) {
        tracing::warn!("rejected unauthorized reminder trigger");
        return Err(ApiError::Unauthorized);
    }

    let report = state.evaluator.run_reminder_cycle(state.clock.now()).await?;

    Ok(Json(CycleResponse {
        success: true,
        checked: report.checked,
        sent: report.sent,
        failed: report.failed,
    }))
}

/// GET /api/cron/reminders
async fn usage() -> impl IntoResponse {
    Json(UsageResponse {
        message: "POST with 'Authorization: Bearer <secret>' to run the reminder cycle",
    })
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return false;
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) => constant_time_eq(token.as_bytes(), secret.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
