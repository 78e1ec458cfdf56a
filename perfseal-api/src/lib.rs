use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use perfseal_crypto::fhe::{Decryptor, EncryptedInput, MockCoprocessor, Plaintext};
use perfseal_crypto::signatures::{verify_decrypt_request, verify_encrypt_request};
use perfseal_execution::{access, engine, registry};
use perfseal_sequencer::{SequencerHandle, SubmitError};
use perfseal_storage::db::Storage;
use perfseal_types::{
    Address, CiphertextHandle, ContractError, ContractState, DriverStatus, FheError, HandleSlot,
    Receipt, SubmissionPolicy, Transaction, MAX_BATCH_SIZE,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use anyhow::Context;

pub mod metrics;

use metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub contract: Arc<RwLock<ContractState>>,
    pub coprocessor: Arc<RwLock<MockCoprocessor>>,
    pub storage: Arc<Storage>,
    pub sequencer: SequencerHandle,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/contract", get(get_contract))
        .route("/drivers", get(get_drivers))
        .route("/drivers/count", get(get_driver_count))
        .route("/drivers/:address", get(get_driver))
        .route("/drivers/:address/result", get(get_result))
        .route("/accounts/:address/nonce", get(get_nonce))
        .route("/receipts/:seq", get(get_receipt))
        .route("/tx", post(submit_tx))
        .route("/fhe/input", post(encrypt_input))
        .route("/fhe/decrypt", post(decrypt))
        .route("/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await.context("serve")?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Contract(ContractError),
    Fhe(FheError),
    Internal(anyhow::Error),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_error: Option<ContractError>,
}

impl From<ContractError> for ApiError {
    fn from(e: ContractError) -> Self {
        ApiError::Contract(e)
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Envelope(e) => ApiError::Contract(e),
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, contract_error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Contract(e) => (StatusCode::BAD_REQUEST, e.to_string(), Some(e)),
            ApiError::Fhe(e) => {
                let status = match e {
                    FheError::AccessDenied => StatusCode::FORBIDDEN,
                    FheError::UnknownHandle => StatusCode::NOT_FOUND,
                    FheError::TypeMismatch | FheError::InvalidProof => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string(), None)
            }
            ApiError::Internal(e) => {
                warn!("Request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"), None)
            }
        };
        (status, Json(ErrorBody { error, contract_error })).into_response()
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}

// ═══════════════════════════════════════════════════════════════
// Views
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContractInfo {
    pub contract_id: Address,
    pub owner: Option<Address>,
    pub paused: bool,
    pub target_threshold: u32,
    pub submission_policy: SubmissionPolicy,
    pub registered_drivers: u64,
    pub max_batch_size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DriverPage {
    pub offset: u64,
    pub total: u64,
    pub drivers: Vec<Address>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DriverCount {
    pub count: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DriverInfo {
    pub address: Address,
    pub registered: bool,
    pub status: DriverStatus,
    pub order_count: HandleSlot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultInfo {
    pub driver: Address,
    pub result: HandleSlot,
    /// A newer order count was submitted after this result was computed.
    pub stale: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NonceInfo {
    pub address: Address,
    pub nonce: u64,
}

#[derive(Deserialize, Debug)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_page_limit")]
    pub limit: u64,
}

fn default_page_limit() -> u64 {
    MAX_BATCH_SIZE as u64
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EncryptRequest {
    pub user: Address,
    pub value: u32,
    /// Hex ed25519 signature by `user` over the encrypt request bytes.
    pub signature: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DecryptRequest {
    pub requester: Address,
    pub handle: CiphertextHandle,
    /// Hex ed25519 signature over the decrypt request bytes.
    pub signature: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptResponse {
    pub handle: CiphertextHandle,
    pub value: Plaintext,
}

// ═══════════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════════

async fn root() -> &'static str {
    "PerfSeal driver performance API v0.1"
}

async fn get_contract(State(app): State<AppState>) -> Json<ContractInfo> {
    let state = app.contract.read().await;
    Json(ContractInfo {
        contract_id: state.contract_id,
        owner: access::owner(&state),
        paused: access::is_paused(&state),
        target_threshold: engine::target_threshold(&state),
        submission_policy: state.submission_policy,
        registered_drivers: registry::registered_driver_count(&state),
        max_batch_size: MAX_BATCH_SIZE,
    })
}

async fn get_drivers(
    State(app): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<DriverPage>, ApiError> {
    let state = app.contract.read().await;
    let drivers = registry::registered_drivers(&state, page.offset, page.limit)?;
    Ok(Json(DriverPage {
        offset: page.offset,
        total: registry::registered_driver_count(&state),
        drivers,
    }))
}

async fn get_driver_count(State(app): State<AppState>) -> Json<DriverCount> {
    let state = app.contract.read().await;
    Json(DriverCount {
        count: registry::registered_driver_count(&state),
    })
}

async fn get_driver(
    State(app): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<DriverInfo>, ApiError> {
    let address = parse_address(&address)?;
    let state = app.contract.read().await;
    Ok(Json(DriverInfo {
        address,
        registered: registry::is_driver_registered(&state, &address),
        status: engine::driver_status(&state, &address),
        order_count: engine::order_count_handle(&state, &address),
    }))
}

async fn get_result(
    State(app): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ResultInfo>, ApiError> {
    let driver = parse_address(&address)?;
    let state = app.contract.read().await;
    Ok(Json(ResultInfo {
        driver,
        result: engine::performance_result(&state, &driver),
        stale: state.slots(&driver).result_stale,
    }))
}

async fn get_nonce(
    State(app): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<NonceInfo>, ApiError> {
    let address = parse_address(&address)?;
    let nonce = app.contract.read().await.nonce_of(&address);
    Ok(Json(NonceInfo { address, nonce }))
}

async fn get_receipt(
    State(app): State<AppState>,
    Path(seq): Path<u64>,
) -> Result<Json<Receipt>, ApiError> {
    match app.storage.load_receipt(seq)? {
        Some(receipt) => Ok(Json(receipt)),
        None => Err(ApiError::NotFound(format!("no receipt at seq {seq}"))),
    }
}

async fn submit_tx(
    State(app): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<Receipt>, ApiError> {
    let instruction = tx.instruction.name();
    let receipt = match app.sequencer.submit(tx).await {
        Ok(receipt) => receipt,
        Err(e) => {
            if matches!(e, SubmitError::Envelope(_)) {
                app.metrics.record_refused(instruction);
            }
            return Err(e.into());
        }
    };
    app.metrics.record_receipt(instruction, &receipt);
    Ok(Json(receipt))
}

fn decode_signature(raw: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| ApiError::BadRequest(format!("signature is not hex: {e}")))
}

/// Relayer stand-in: encrypts `value` for `user` against this contract. Only `user`
/// may ask, since the input proof is bound to them.
async fn encrypt_input(
    State(app): State<AppState>,
    Json(req): Json<EncryptRequest>,
) -> Result<Json<EncryptedInput>, ApiError> {
    if req.user.is_zero() {
        return Err(ApiError::BadRequest("user must not be the zero address".to_string()));
    }
    let signature = decode_signature(&req.signature)?;
    let contract = app.contract.read().await.contract_id;
    verify_encrypt_request(&req.user, &contract, req.value, &signature)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let input = app.sequencer.encrypt_input(req.user, req.value).await?;
    app.metrics.record_encrypted_input();
    Ok(Json(input))
}

async fn decrypt(
    State(app): State<AppState>,
    Json(req): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let signature = decode_signature(&req.signature)?;
    verify_decrypt_request(&req.requester, &req.handle, &signature)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let value = app
        .coprocessor
        .read()
        .await
        .user_decrypt(&req.handle, &req.requester)
        .map_err(ApiError::Fhe)?;

    app.metrics.record_decryption();
    Ok(Json(DecryptResponse {
        handle: req.handle,
        value,
    }))
}

async fn get_metrics(State(app): State<AppState>) -> Result<Response, ApiError> {
    let body = app
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("encode metrics: {e}")))?;
    Ok((
        [(
            CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
        .into_response())
}
