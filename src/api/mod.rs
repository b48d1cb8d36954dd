//! HTTP API for health checks, queries, and signed submissions

use crate::config::ApiConfig;
use crate::crypto::{self, keccak256};
use crate::error::{HubError, HubResult};
use crate::hub::{Hub, HubCall, Receipt};
use crate::ledger::MemoryLedger;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Hub shared between request handlers
pub type SharedHub = Arc<RwLock<Hub<MemoryLedger>>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: SharedHub,
    pub instance_id: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(hub: SharedHub, instance_id: &str) -> Self {
        Self {
            hub,
            instance_id: instance_id.to_string(),
            started_at: Utc::now(),
        }
    }
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> HubResult<()> {
    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HubError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| HubError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/ibtp/:id", get(get_ibtp))
        .route("/receipt/:id", get(get_receipt))
        .route("/interchain/:chain_id", get(get_interchain))
        .route("/transaction/:id/status", get(get_transaction_status))
        .route("/asset-exchange/:id/status", get(get_asset_exchange_status))
        .route("/submit", post(submit))
        .with_state(state)
}

/// Digest a submitter signs: keccak256 of the JSON `{call, nonce}`.
pub fn submission_digest(call: &HubCall, nonce: u64) -> HubResult<[u8; 32]> {
    let body = serde_json::to_vec(&SignedBody { call, nonce })?;
    Ok(keccak256(&body))
}

#[derive(Serialize)]
struct SignedBody<'a> {
    call: &'a HubCall,
    nonce: u64,
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get hub status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let submissions = state.hub.read().await.tx_count();
    let uptime = Utc::now().signed_duration_since(state.started_at);

    Json(StatusResponse {
        instance_id: state.instance_id.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        submissions,
    })
}

async fn get_ibtp(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.hub.read().await.get_ibtp_by_id(&id)?;
    Ok(Json(record))
}

async fn get_receipt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.hub.read().await.get_receipt_by_id(&id)?;
    Ok(Json(record))
}

async fn get_interchain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let meta = state.hub.read().await.get_interchain(&chain_id)?;
    Ok(Json(meta))
}

async fn get_transaction_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.hub.read().await.get_transaction_status(&id)?;
    Ok(Json(StatusCodeResponse {
        id,
        status: status.to_string(),
        code: status.code(),
    }))
}

async fn get_asset_exchange_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = state.hub.read().await.get_asset_exchange_status(&id)?;
    let status = match code {
        0 => "init",
        1 => "redeem",
        _ => "refund",
    };
    Ok(Json(StatusCodeResponse {
        id,
        status: status.to_string(),
        code,
    }))
}

/// Execute a signed call. The caller is whoever signed it.
async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<Receipt>, ApiError> {
    let digest = submission_digest(&request.call, request.nonce)?;
    let signature = hex::decode(request.signature.trim_start_matches("0x"))
        .map_err(|e| HubError::Crypto(format!("Invalid signature hex: {}", e)))?;
    let caller = crypto::recover_address(&digest, &signature)?;

    let mut preimage = digest.to_vec();
    preimage.extend_from_slice(&signature);
    let tx_hash = format!("0x{}", hex::encode(keccak256(&preimage)));

    let receipt = state
        .hub
        .write()
        .await
        .submit_signed(caller, request.nonce, tx_hash, request.call)?;
    Ok(Json(receipt))
}

/// Maps hub errors onto HTTP responses
pub struct ApiError(HubError);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::MalformedId(_) | HubError::Codec(_) | HubError::InvalidBatch(_) => {
                StatusCode::BAD_REQUEST
            }
            HubError::Crypto(_) => StatusCode::UNAUTHORIZED,
            HubError::PermissionDenied | HubError::CallerNotBound { .. } => StatusCode::FORBIDDEN,
            HubError::NonceReused { .. } => StatusCode::CONFLICT,
            HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
            retry_safe: self.0.is_retry_safe(),
        };
        (status, Json(body)).into_response()
    }
}

// Request and response types

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub call: HubCall,
    pub nonce: u64,
    /// Hex `r || s || v` over [`submission_digest`]
    pub signature: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct StatusResponse {
    instance_id: String,
    version: String,
    uptime_seconds: u64,
    submissions: u64,
}

#[derive(Serialize)]
struct StatusCodeResponse {
    id: String,
    status: String,
    code: u8,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: String,
    retry_safe: bool,
}
