//! HTTP status API.
//!
//! Read endpoints expose deposit progress and aggregate stats; the bind
//! endpoint creates new address bindings when enabled. With the dummy
//! scanner, deposits can be injected for local testing.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;

use teller_core::clients::scanner::DepositNote;
use teller_core::clients::wallet::Balance;
use teller_core::entities::{CoinType, Deposit, DepositInfo, DepositStats};
use teller_core::events::DepositNoteSender;
use teller_core::exchange::{BindError, DepositStatusSummary, Exchange};
use teller_core::store::StoreError;

/// State shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange>,
    pub bind_enabled: bool,
    /// Set when the dummy scanner is enabled; lets the API inject deposits.
    pub deposit_injector: Option<DepositNoteSender>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(deposit_status))
        .route("/api/stats", get(stats))
        .route("/api/deposits/errored", get(errored_deposits))
        .route("/api/bind", post(bind))
        .route("/api/dummy/deposit", post(inject_deposit))
        .with_state(state)
}

enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, error),
            ApiError::Forbidden(error) => (StatusCode::FORBIDDEN, error),
            ApiError::NotFound(error) => (StatusCode::NOT_FOUND, error),
            ApiError::Internal(error) => (StatusCode::INTERNAL_SERVER_ERROR, error),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AddressAlreadyBound
            | StoreError::MaxBoundAddresses
            | StoreError::NoBoundAddress => ApiError::BadRequest(err.to_string()),
            StoreError::DepositNotFound(_) => ApiError::NotFound(err.to_string()),
            other => {
                error!(error = %other, "store request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<BindError> for ApiError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Store(e) => e.into(),
            BindError::Scanner(e) => ApiError::BadRequest(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    balance: Option<Balance>,
    processor_error: Option<String>,
    sender_error: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let balance = state.exchange.balance().await.ok();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        balance,
        processor_error: state.exchange.processor_status(),
        sender_error: state.exchange.sender_status(),
    })
}

#[derive(Deserialize)]
struct StatusQuery {
    skyaddr: String,
}

async fn deposit_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<DepositStatusSummary>>, ApiError> {
    let statuses = state.exchange.deposit_statuses(&query.skyaddr).await?;
    Ok(Json(statuses))
}

async fn stats(State(state): State<AppState>) -> Result<Json<DepositStats>, ApiError> {
    Ok(Json(state.exchange.deposit_stats().await?))
}

async fn errored_deposits(
    State(state): State<AppState>,
) -> Result<Json<Vec<DepositInfo>>, ApiError> {
    Ok(Json(state.exchange.errored_deposits().await?))
}

#[derive(Deserialize)]
struct BindRequest {
    sky_address: String,
    deposit_address: String,
    coin_type: String,
}

#[derive(Serialize)]
struct BindResponse {
    sky_address: String,
    deposit_address: String,
    coin_type: CoinType,
    buy_method: String,
}

async fn bind(
    State(state): State<AppState>,
    Json(request): Json<BindRequest>,
) -> Result<Json<BindResponse>, ApiError> {
    if !state.bind_enabled {
        return Err(ApiError::Forbidden("binding is disabled".to_string()));
    }

    let coin_type = CoinType::from_str(&request.coin_type)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let bound = state
        .exchange
        .bind_address(&request.sky_address, &request.deposit_address, coin_type)
        .await?;

    Ok(Json(BindResponse {
        sky_address: bound.sky_address,
        deposit_address: bound.deposit_address,
        coin_type: bound.coin_type,
        buy_method: bound.buy_method.to_string(),
    }))
}

#[derive(Deserialize)]
struct InjectDepositRequest {
    address: String,
    coin_type: String,
    value: i64,
    tx: String,
    n: u32,
    #[serde(default)]
    height: i64,
}

#[derive(Serialize)]
struct InjectDepositResponse {
    deposit_id: String,
}

async fn inject_deposit(
    State(state): State<AppState>,
    Json(request): Json<InjectDepositRequest>,
) -> Result<Json<InjectDepositResponse>, ApiError> {
    let Some(injector) = &state.deposit_injector else {
        return Err(ApiError::NotFound(
            "dummy scanner is not enabled".to_string(),
        ));
    };

    let coin_type = CoinType::from_str(&request.coin_type)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let deposit = Deposit {
        coin_type,
        address: request.address,
        value: request.value,
        height: request.height,
        tx: request.tx,
        n: request.n,
    };
    let deposit_id = deposit.deposit_id();

    let (note, ack_rx) = DepositNote::new(deposit);
    injector
        .send(note)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match ack_rx.await {
        Ok(Ok(())) => Ok(Json(InjectDepositResponse { deposit_id })),
        Ok(Err(e)) => Err(ApiError::from(e)),
        Err(_) => Err(ApiError::Internal(
            "deposit was dropped before processing".to_string(),
        )),
    }
}
