// src/services/api_server.rs
//! API Server for the academic credential chain client
//!
//! JSON REST interface over the query and transaction layers. Reads are
//! `GET`, writes are `POST`. Query endpoints answer absence with `404` and an
//! unusable address with `400`; they never report absence as a server error.
//! Transaction endpoints return the final `TransactionResult` together with
//! every status update observed while the call was in flight.
//!
//! The API is built using Axum and includes endpoints for:
//! - Chain status and capability discovery
//! - Identity, institution, credential and reputation lookups
//! - Identity, institution, credential, endorsement and admin transactions
//! - Document hashing and the local file-reference cache
//! - Credential requests between holders and institutions
//! - Session account selection and notifications
//! - Form step validation

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures::join;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::error::{RequestError, TransactionErrorKind};
use crate::models::credential::CredentialType;
use crate::models::did::KeyType;
use crate::models::reputation::{Endorsement, EndorsementType, ReputationScore, ReputationTier};
use crate::models::request::{CredentialRequest, NewCredentialRequest, RequestStatus};
use crate::models::transaction::{StatusCallback, TransactionResult, TransactionStatus};
use crate::queries::{BlockchainQueries, ChainStatus};
use crate::services::session::{Notice, Notification, Session};
use crate::services::wizard::{FormKind, FormWizard};
use crate::storage::local_cache::{FileReference, LocalCache};
use crate::transactions::BlockchainTransactions;
use crate::utils::crypto::{hash_document, verify_file_hash};
use crate::utils::serialization::encode_metadata;
use crate::wallet::credential_storage::CredentialRequestStorage;
use crate::wallet::key_management::normalize;

// API request and response structures

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Chain identity plus live node status
#[derive(Serialize)]
struct ChainResponse {
    name: String,
    token_symbol: String,
    token_decimals: u8,
    #[serde(flatten)]
    status: ChainStatus,
}

#[derive(Serialize)]
struct ReputationResponse {
    score: ReputationScore,
    tier: ReputationTier,
}

#[derive(Serialize)]
struct EndorsementsResponse {
    received: Vec<Endorsement>,
    given: Vec<Endorsement>,
}

/// Outcome of a transaction endpoint
#[derive(Serialize, Deserialize)]
struct TxResponse {
    result: TransactionResult,
    updates: Vec<TransactionStatus>,
}

/// Request payload for creating an identity or adding a key to one
#[derive(Deserialize)]
struct PublicKeyRequest {
    #[serde(default)]
    account: Option<String>,
    public_key: String,
    key_type: String,
}

#[derive(Deserialize)]
struct RegisterInstitutionRequest {
    #[serde(default)]
    account: Option<String>,
    name: String,
}

/// Request payload for issuing a credential
#[derive(Deserialize)]
struct IssueCredentialRequest {
    #[serde(default)]
    account: Option<String>,
    holder: String,
    content_hash: String,
    credential_type: String,
    /// Text, or a JSON object stored as its serialized form
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    expires_at: Option<u64>,
    /// Credential request fulfilled by this issuance
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Deserialize)]
struct RevokeCredentialRequest {
    #[serde(default)]
    account: Option<String>,
    credential_id: String,
}

#[derive(Deserialize)]
struct VerifyCredentialRequest {
    #[serde(default)]
    account: Option<String>,
    content_hash: String,
}

#[derive(Deserialize)]
struct UpdateMetadataRequest {
    #[serde(default)]
    account: Option<String>,
    credential_id: String,
    #[serde(default)]
    metadata: Value,
}

#[derive(Deserialize)]
struct EndorseRequest {
    #[serde(default)]
    account: Option<String>,
    endorsee: String,
    endorsement_type: String,
    #[serde(default)]
    comment: String,
    weight: u8,
}

#[derive(Deserialize)]
struct RemoveEndorsementRequest {
    #[serde(default)]
    account: Option<String>,
    endorsee: String,
}

/// Request payload for the privileged institution calls
#[derive(Deserialize)]
struct InstitutionAdminRequest {
    #[serde(default)]
    account: Option<String>,
    institution: String,
}

#[derive(Deserialize)]
struct HashDocumentQuery {
    #[serde(default)]
    name: Option<String>,
    /// Hash the upload is expected to have
    #[serde(default)]
    expected: Option<String>,
}

#[derive(Serialize)]
struct HashDocumentResponse {
    reference: FileReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<bool>,
}

#[derive(Deserialize)]
struct ListRequestsQuery {
    #[serde(default)]
    requester: Option<String>,
    #[serde(default)]
    institution: Option<String>,
    #[serde(default)]
    status: Option<RequestStatus>,
}

#[derive(Deserialize)]
struct ReviewRequest {
    #[serde(default)]
    reviewer: Option<String>,
    approve: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct FulfilRequest {
    transaction_hash: String,
}

#[derive(Serialize)]
struct SessionResponse {
    accounts: Vec<String>,
    selected_account: Option<String>,
}

/// `None` disconnects the current selection
#[derive(Deserialize)]
struct SelectAccountRequest {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Serialize)]
struct NotificationsResponse {
    notifications: Vec<Notification>,
    unread_count: usize,
}

/// Marks one notification read, or all of them without an id
#[derive(Deserialize)]
struct MarkReadRequest {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Serialize)]
struct FormValidationResponse {
    valid: bool,
    values: BTreeMap<String, String>,
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum StepAction {
    #[default]
    Next,
    Back,
}

/// One move of a form wizard from the step the client is on
#[derive(Deserialize)]
struct FormStepRequest {
    /// Zero-based index of the current step
    #[serde(default)]
    step: usize,
    #[serde(default)]
    action: StepAction,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct FormStepResponse {
    form: &'static str,
    step: usize,
    title: &'static str,
    is_last: bool,
    missing_fields: Vec<String>,
}

#[derive(Deserialize)]
struct BalanceQuery {
    /// Amount in the smallest unit, as decimal text
    #[serde(default)]
    required: Option<String>,
}

#[derive(Serialize)]
struct BalanceResponse {
    address: String,
    free: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sufficient: Option<bool>,
}

#[derive(Serialize)]
struct InstitutionStatusResponse {
    institution: bool,
    verified: bool,
}

#[derive(Serialize)]
struct InstitutionRequestsResponse {
    pending: usize,
    requests: Vec<CredentialRequest>,
}

/// Removes one notification, or clears the inbox without an id
#[derive(Deserialize)]
struct RemoveNotificationQuery {
    #[serde(default)]
    id: Option<String>,
}

fn ok<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

fn found<T: Serialize>(value: Option<T>, what: &str) -> Response {
    match value {
        Some(value) => ok(value),
        None => error(StatusCode::NOT_FOUND, format!("{} not found", what)),
    }
}

/// Normalizes an SS58 path parameter.
fn address(raw: &str) -> Result<String, Response> {
    normalize(raw).ok_or_else(|| error(StatusCode::BAD_REQUEST, format!("Invalid address `{}`", raw)))
}

fn request_error(e: RequestError) -> Response {
    let status = match e {
        RequestError::NotFound(_) => StatusCode::NOT_FOUND,
        RequestError::InvalidTransition { .. } => StatusCode::CONFLICT,
        RequestError::MissingField(_) => StatusCode::BAD_REQUEST,
    };
    error(status, e.to_string())
}

/// Metadata is stored as text; JSON objects are kept in serialized form.
fn metadata_text(metadata: &Value) -> String {
    match metadata {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(fields) => encode_metadata(fields),
        other => other.to_string(),
    }
}

/// Collects status updates for the response body.
fn recorder() -> (StatusCallback, Arc<Mutex<Vec<TransactionStatus>>>) {
    let updates = Arc::new(Mutex::new(Vec::<TransactionStatus>::new()));
    let sink = updates.clone();
    let callback: StatusCallback = Arc::new(move |status: TransactionStatus| {
        if let Ok(mut updates) = sink.lock() {
            updates.push(status);
        }
    });
    (callback, updates)
}

fn tx_response(result: TransactionResult, updates: Arc<Mutex<Vec<TransactionStatus>>>) -> Response {
    let status = match result.error_kind {
        None => StatusCode::OK,
        Some(TransactionErrorKind::InvalidInput) => StatusCode::BAD_REQUEST,
        Some(TransactionErrorKind::Rejected) => StatusCode::FORBIDDEN,
        Some(TransactionErrorKind::InsufficientBalance) => StatusCode::PAYMENT_REQUIRED,
        Some(TransactionErrorKind::Module) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(TransactionErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(TransactionErrorKind::Dropped) | Some(TransactionErrorKind::Transport) => {
            StatusCode::BAD_GATEWAY
        }
    };
    let updates = updates.lock().map(|u| u.clone()).unwrap_or_default();
    (status, Json(TxResponse { result, updates })).into_response()
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Read access to chain storage
    queries: BlockchainQueries,

    /// Signed calls into the pallets
    transactions: BlockchainTransactions,

    /// In-process credential requests
    requests: Arc<RwLock<CredentialRequestStorage>>,

    /// Accounts, selection and notifications
    session: Arc<Session>,

    /// Hashed document references
    cache: Arc<LocalCache>,

    settings: Arc<AppConfig>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `queries` - Query layer
    /// * `transactions` - Transaction layer
    /// * `session` - Shared session context
    /// * `cache` - Local file-reference cache
    /// * `settings` - Chain display settings and upload limit
    pub fn new(
        queries: BlockchainQueries,
        transactions: BlockchainTransactions,
        session: Arc<Session>,
        cache: Arc<LocalCache>,
        settings: AppConfig,
    ) -> Self {
        ApiServer {
            queries,
            transactions,
            requests: Arc::new(RwLock::new(CredentialRequestStorage::new())),
            session,
            cache,
            settings: Arc::new(settings),
        }
    }

    /// Builds the route table.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/chain", get(Self::chain_handler))
            // Queries
            .route("/did/:address", get(Self::did_handler))
            .route("/institutions", get(Self::institutions_handler))
            .route("/institutions/:address", get(Self::institution_handler))
            .route("/institutions/:address/overview", get(Self::institution_overview_handler))
            .route("/institutions/:address/status", get(Self::institution_status_handler))
            .route("/institutions/:address/requests", get(Self::institution_requests_handler))
            .route("/users/:address", get(Self::user_handler))
            .route("/credentials/:id", get(Self::credential_handler))
            .route("/credentials/holder/:address", get(Self::holder_credentials_handler))
            .route("/credentials/issuer/:address", get(Self::issuer_credentials_handler))
            .route("/verify/:hash", get(Self::verify_hash_handler))
            .route("/verify/:hash/exists", get(Self::hash_exists_handler))
            .route("/balance/:address", get(Self::balance_handler))
            .route("/reputation/:address", get(Self::reputation_handler))
            .route("/endorsements/:address", get(Self::endorsements_handler))
            // Transactions
            .route("/tx/did", post(Self::create_did_handler))
            .route("/tx/did/keys", post(Self::add_public_key_handler))
            .route("/tx/institutions", post(Self::register_institution_handler))
            .route("/tx/credentials", post(Self::issue_credential_handler))
            .route("/tx/credentials/revoke", post(Self::revoke_credential_handler))
            .route("/tx/credentials/verify", post(Self::verify_credential_handler))
            .route("/tx/credentials/metadata", post(Self::update_metadata_handler))
            .route("/tx/endorsements", post(Self::endorse_handler))
            .route("/tx/endorsements/remove", post(Self::remove_endorsement_handler))
            .route("/tx/admin/institutions/verify", post(Self::verify_institution_handler))
            .route("/tx/admin/institutions/revoke", post(Self::revoke_institution_handler))
            // Documents
            .route("/documents", get(Self::documents_handler))
            .route("/documents/hash", post(Self::hash_document_handler))
            .route("/documents/:hash", get(Self::document_handler))
            // Credential requests
            .route("/requests", get(Self::list_requests_handler).post(Self::create_request_handler))
            .route("/requests/:id", get(Self::request_handler).delete(Self::remove_request_handler))
            .route("/requests/:id/review", post(Self::review_request_handler))
            .route("/requests/:id/cancel", post(Self::cancel_request_handler))
            .route("/requests/:id/fulfil", post(Self::fulfil_request_handler))
            // Session
            .route("/session", get(Self::session_handler))
            .route("/session/account", post(Self::select_account_handler))
            .route(
                "/notifications/:address",
                get(Self::notifications_handler).delete(Self::remove_notifications_handler),
            )
            .route("/notifications/:address/read", post(Self::mark_read_handler))
            .route("/forms/:form/validate", post(Self::validate_form_handler))
            .route("/forms/:form/step", post(Self::form_step_handler))
            .layer(DefaultBodyLimit::max(self.settings.max_upload_bytes))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    ///
    /// # Errors
    /// Returns error if the address cannot be bound or the server fails.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Account a transaction is signed with: the one named in the request,
    /// else the session's selection.
    async fn signer_account(&self, requested: Option<String>) -> Result<String, Response> {
        match requested.filter(|a| !a.trim().is_empty()) {
            Some(account) => Ok(account),
            None => self
                .session
                .selected_account()
                .await
                .ok_or_else(|| error(StatusCode::BAD_REQUEST, "No account selected")),
        }
    }

    /// Institution name for notifications, falling back to the address.
    async fn display_name(&self, address: &str) -> String {
        self.queries
            .did
            .get_institution(address)
            .await
            .map(|i| i.name)
            .unwrap_or_else(|| address.to_string())
    }

    // =====================
    // Status
    // =====================

    async fn health_handler() -> impl IntoResponse {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
    }

    /// Reports the node connection and which pallets it exposes
    ///
    /// # Endpoint
    /// GET /chain
    async fn chain_handler(State(state): State<Arc<ApiServer>>) -> Response {
        let status = state.queries.chain_status().await;
        ok(ChainResponse {
            name: state.settings.chain_name.clone(),
            token_symbol: state.settings.token_symbol.clone(),
            token_decimals: state.settings.token_decimals,
            status,
        })
    }

    // =====================
    // Query Handlers
    // =====================

    /// Resolves the identity document of an account
    ///
    /// # Endpoint
    /// GET /did/:address
    ///
    /// # Responses
    /// - 200 OK: Identity document
    /// - 400 Bad Request: Not an SS58 address
    /// - 404 Not Found: No identity, or the lookup failed
    async fn did_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        match address(&raw) {
            Ok(address) => found(state.queries.did.get_did(&address).await, "Identity"),
            Err(response) => response,
        }
    }

    async fn institutions_handler(State(state): State<Arc<ApiServer>>) -> Response {
        ok(state.queries.did.get_all_institutions().await)
    }

    async fn institution_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        match address(&raw) {
            Ok(address) => found(state.queries.did.get_institution(&address).await, "Institution"),
            Err(response) => response,
        }
    }

    /// Institution record with issued credentials, reputation and endorsements
    ///
    /// # Endpoint
    /// GET /institutions/:address/overview
    ///
    /// # Responses
    /// - 200 OK: Combined view
    /// - 503 Service Unavailable: One of the lookups failed
    async fn institution_overview_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        match state.queries.get_institution_data(&address).await {
            Some(data) => ok(data),
            None => error(StatusCode::SERVICE_UNAVAILABLE, "Institution data unavailable"),
        }
    }

    async fn institution_status_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        let (institution, verified) = join!(
            state.queries.did.is_institution(&address),
            state.queries.did.is_verified_institution(&address),
        );
        ok(InstitutionStatusResponse { institution, verified })
    }

    /// Credential requests filed with an institution and how many await review
    ///
    /// # Endpoint
    /// GET /institutions/:address/requests
    async fn institution_requests_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        let storage = state.requests.read().await;
        let mut requests = storage.by_institution(&address);
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        ok(InstitutionRequestsResponse {
            pending: storage.pending_count(&address),
            requests,
        })
    }

    async fn user_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        match state.queries.get_user_data(&address).await {
            Some(data) => ok(data),
            None => error(StatusCode::SERVICE_UNAVAILABLE, "User data unavailable"),
        }
    }

    async fn credential_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        found(state.queries.credential.get_credential(&id).await, "Credential")
    }

    async fn holder_credentials_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        match address(&raw) {
            Ok(address) => ok(state.queries.credential.get_credentials_by_holder(&address).await),
            Err(response) => response,
        }
    }

    async fn issuer_credentials_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        match address(&raw) {
            Ok(address) => ok(state.queries.credential.get_credentials_by_issuer(&address).await),
            Err(response) => response,
        }
    }

    /// Public verification by content hash
    ///
    /// # Endpoint
    /// GET /verify/:hash
    ///
    /// # Responses
    /// - 200 OK: Verification outcome; `found` is false for unknown hashes
    async fn verify_hash_handler(
        Path(hash): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        ok(state.queries.credential.verify_by_hash(&hash).await)
    }

    async fn hash_exists_handler(
        Path(hash): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let exists = state.queries.credential.verify_credential_exists(&hash).await;
        ok(serde_json::json!({ "exists": exists }))
    }

    /// Free balance of an account, optionally checked against an amount
    ///
    /// # Endpoint
    /// GET /balance/:address?required=
    ///
    /// # Responses
    /// - 200 OK: Balance; `free` is null when the lookup failed
    /// - 400 Bad Request: Not an SS58 address, or `required` is not a number
    async fn balance_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<BalanceQuery>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        let required = match query.required.as_deref().map(str::parse::<u128>).transpose() {
            Ok(required) => required,
            Err(_) => return error(StatusCode::BAD_REQUEST, "`required` must be an unsigned integer"),
        };
        let free = state.queries.get_free_balance(&address).await;
        let sufficient = match required {
            Some(required) => Some(state.queries.check_sufficient_balance(&address, required).await),
            None => None,
        };
        ok(BalanceResponse {
            address,
            free,
            sufficient,
        })
    }

    async fn reputation_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        let score = state.queries.reputation.get_reputation_score(&address).await;
        ok(ReputationResponse {
            tier: score.tier(),
            score,
        })
    }

    async fn endorsements_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        let (received, given) = join!(
            state.queries.reputation.get_endorsements_received(&address),
            state.queries.reputation.get_endorsements_given(&address),
        );
        ok(EndorsementsResponse { received, given })
    }

    // =====================
    // Transaction Handlers
    // =====================

    /// Creates the identity document of the signing account
    ///
    /// # Endpoint
    /// POST /tx/did
    ///
    /// # Request Body
    /// Public key as `0x` hex and its key type
    ///
    /// # Responses
    /// - 200 OK: Finalized
    /// - 400 Bad Request: Unknown key type, malformed key or no account
    /// - 422 Unprocessable Entity: Refused by the chain
    async fn create_did_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<PublicKeyRequest>,
    ) -> Response {
        let key_type: KeyType = match payload.key_type.parse() {
            Ok(key_type) => key_type,
            Err(e) => return error(StatusCode::BAD_REQUEST, e),
        };
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .did
            .create_did(&account, &payload.public_key, key_type, Some(callback))
            .await;
        tx_response(result, updates)
    }

    async fn add_public_key_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<PublicKeyRequest>,
    ) -> Response {
        let key_type: KeyType = match payload.key_type.parse() {
            Ok(key_type) => key_type,
            Err(e) => return error(StatusCode::BAD_REQUEST, e),
        };
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .did
            .add_public_key(&account, &payload.public_key, key_type, Some(callback))
            .await;
        tx_response(result, updates)
    }

    async fn register_institution_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RegisterInstitutionRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .did
            .register_institution(&account, &payload.name, Some(callback))
            .await;
        tx_response(result, updates)
    }

    /// Issues a credential from the signing institution
    ///
    /// # Endpoint
    /// POST /tx/credentials
    ///
    /// # Request Body
    /// Holder, content hash, credential type display name, metadata, optional
    /// expiry block and optional request id to mark fulfilled
    ///
    /// # Responses
    /// - 200 OK: Finalized; the holder is notified
    /// - 422 Unprocessable Entity: Refused by the chain
    async fn issue_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<IssueCredentialRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .credential
            .issue_credential(
                &account,
                &payload.holder,
                &payload.content_hash,
                &payload.credential_type,
                &metadata_text(&payload.metadata),
                payload.expires_at,
                Some(callback),
            )
            .await;

        if result.success {
            if let Some(request_id) = &payload.request_id {
                let reference = result
                    .transaction_hash
                    .clone()
                    .or_else(|| result.block_hash.clone())
                    .unwrap_or_default();
                if let Err(e) = state.requests.write().await.fulfil(request_id, &reference) {
                    warn!("Issued credential but could not fulfil request {}: {}", request_id, e);
                }
            }
            if let Some(holder) = normalize(&payload.holder) {
                let institution = state.display_name(&account).await;
                let kind = CredentialType::from_display(&payload.credential_type);
                state
                    .session
                    .notify(&holder, Notice::credential_issued(&institution, kind.display_name()))
                    .await;
            }
        }
        tx_response(result, updates)
    }

    async fn revoke_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RevokeCredentialRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .credential
            .revoke_credential(&account, &payload.credential_id, Some(callback))
            .await;

        if result.success {
            if let Some(credential) = state.queries.credential.get_credential(&payload.credential_id).await {
                let institution = state.display_name(&account).await;
                state
                    .session
                    .notify(
                        &credential.holder,
                        Notice::credential_revoked(&institution, credential.credential_type.display_name()),
                    )
                    .await;
            }
        }
        tx_response(result, updates)
    }

    async fn verify_credential_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<VerifyCredentialRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .credential
            .verify_credential(&account, &payload.content_hash, Some(callback))
            .await;
        tx_response(result, updates)
    }

    async fn update_metadata_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<UpdateMetadataRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .credential
            .update_credential_metadata(
                &account,
                &payload.credential_id,
                &metadata_text(&payload.metadata),
                Some(callback),
            )
            .await;
        tx_response(result, updates)
    }

    async fn endorse_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<EndorseRequest>,
    ) -> Response {
        let endorsement_type: EndorsementType = match payload.endorsement_type.parse() {
            Ok(endorsement_type) => endorsement_type,
            Err(e) => return error(StatusCode::BAD_REQUEST, e),
        };
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .reputation
            .endorse(
                &account,
                &payload.endorsee,
                endorsement_type,
                &payload.comment,
                payload.weight,
                Some(callback),
            )
            .await;

        if let (true, Some(endorsee)) = (result.success, normalize(&payload.endorsee)) {
            let endorser = state.display_name(&account).await;
            state
                .session
                .notify(&endorsee, Notice::endorsement_received(&endorser))
                .await;
        }
        tx_response(result, updates)
    }

    async fn remove_endorsement_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RemoveEndorsementRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .reputation
            .remove_endorsement(&account, &payload.endorsee, Some(callback))
            .await;
        tx_response(result, updates)
    }

    /// Verifies an institution through the sudo key
    ///
    /// # Endpoint
    /// POST /tx/admin/institutions/verify
    ///
    /// # Responses
    /// - 200 OK: Finalized and the wrapped call succeeded
    /// - 422 Unprocessable Entity: Not the sudo key, or the wrapped call failed
    async fn verify_institution_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<InstitutionAdminRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .admin
            .verify_institution(&account, &payload.institution, Some(callback))
            .await;
        tx_response(result, updates)
    }

    async fn revoke_institution_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<InstitutionAdminRequest>,
    ) -> Response {
        let account = match state.signer_account(payload.account).await {
            Ok(account) => account,
            Err(response) => return response,
        };
        let (callback, updates) = recorder();
        let result = state
            .transactions
            .admin
            .revoke_institution(&account, &payload.institution, Some(callback))
            .await;
        tx_response(result, updates)
    }

    // =====================
    // Document Handlers
    // =====================

    /// Hashes an uploaded document and records it in the local cache
    ///
    /// # Endpoint
    /// POST /documents/hash?name=&expected=
    ///
    /// # Request Body
    /// Raw document bytes; the content type is recorded as the MIME type
    ///
    /// # Responses
    /// - 200 OK: File reference, and whether it matches `expected` if given
    /// - 400 Bad Request: Empty body
    /// - 413 Payload Too Large: Over the configured upload limit
    async fn hash_document_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<HashDocumentQuery>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        if body.is_empty() {
            return error(StatusCode::BAD_REQUEST, "Empty document");
        }
        if body.len() > state.settings.max_upload_bytes {
            return error(StatusCode::PAYLOAD_TOO_LARGE, "Document exceeds upload limit");
        }
        let mime_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let reference = FileReference {
            hash: hash_document(&body),
            name: query.name.unwrap_or_else(|| "document".to_string()),
            size: body.len() as u64,
            mime_type,
            stored_at: Utc::now(),
        };
        state.cache.store_file_reference(reference.clone()).await;

        let matches = query.expected.map(|expected| verify_file_hash(&body, &expected));
        ok(HashDocumentResponse { reference, matches })
    }

    async fn document_handler(
        Path(hash): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        found(state.cache.file_reference(&hash).await, "Document")
    }

    async fn documents_handler(State(state): State<Arc<ApiServer>>) -> Response {
        ok(state.cache.file_references().await)
    }

    // =====================
    // Credential Request Handlers
    // =====================

    /// Files a credential request with an institution
    ///
    /// # Endpoint
    /// POST /requests
    ///
    /// # Responses
    /// - 200 OK: Stored request; the institution is notified
    /// - 400 Bad Request: A required field is blank
    async fn create_request_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<NewCredentialRequest>,
    ) -> Response {
        let fields = [
            ("institution", &payload.institution),
            ("credential_type", &payload.credential_type),
            ("program_name", &payload.program_name),
            ("field_of_study", &payload.field_of_study),
            ("start_date", &payload.start_date),
            ("end_date", &payload.end_date),
        ]
        .map(|(field, value)| (field.to_string(), value.clone()));
        if let Err(e) = FormWizard::complete(FormKind::RequestCredential, fields) {
            return error(StatusCode::BAD_REQUEST, e.to_string());
        }

        let created = state.requests.write().await.create(payload);
        match created {
            Ok(request) => {
                state
                    .session
                    .notify(
                        &request.institution,
                        Notice::request_received(&request.requester, &request.program_name),
                    )
                    .await;
                ok(request)
            }
            Err(e) => request_error(e),
        }
    }

    /// Lists requests by requester, institution or status, newest first
    ///
    /// # Endpoint
    /// GET /requests?requester=&institution=&status=
    async fn list_requests_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<ListRequestsQuery>,
    ) -> Response {
        let storage = state.requests.read().await;
        let mut requests = match (&query.requester, &query.institution) {
            (Some(requester), _) => storage.by_requester(requester),
            (None, Some(institution)) => storage.by_institution(institution),
            (None, None) => match query.status {
                Some(status) => storage.by_status(status),
                None => [
                    RequestStatus::Pending,
                    RequestStatus::Approved,
                    RequestStatus::Rejected,
                    RequestStatus::Fulfilled,
                    RequestStatus::Cancelled,
                ]
                .into_iter()
                .flat_map(|status| storage.by_status(status))
                .collect(),
            },
        };
        if let Some(status) = query.status {
            requests.retain(|r| r.status == status);
        }
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        ok(requests)
    }

    async fn request_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        found(state.requests.read().await.get(&id).cloned(), "Request")
    }

    async fn remove_request_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        if state.requests.write().await.remove(&id) {
            ok(serde_json::json!({ "removed": id }))
        } else {
            error(StatusCode::NOT_FOUND, "Request not found")
        }
    }

    /// Approves or rejects a pending request
    ///
    /// # Endpoint
    /// POST /requests/:id/review
    ///
    /// # Responses
    /// - 200 OK: Updated request; the requester is notified
    /// - 404 Not Found: Unknown request
    /// - 409 Conflict: The request is no longer pending
    async fn review_request_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ReviewRequest>,
    ) -> Response {
        let reviewer = match state.signer_account(payload.reviewer).await {
            Ok(reviewer) => reviewer,
            Err(response) => return response,
        };
        let reviewed = {
            let mut storage = state.requests.write().await;
            if payload.approve {
                storage.approve(&id, &reviewer)
            } else {
                let reason = payload.reason.unwrap_or_default();
                storage.reject(&id, &reviewer, &reason)
            }
        };
        let request = match reviewed {
            Ok(request) => request,
            Err(e) => return request_error(e),
        };

        let institution = state.display_name(&request.institution).await;
        let notice = if payload.approve {
            Notice::request_approved(&institution, &request.program_name)
        } else {
            Notice::request_rejected(&institution, &request.program_name)
        };
        state.session.notify(&request.requester, notice).await;
        ok(request)
    }

    async fn cancel_request_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let cancelled = state.requests.write().await.cancel(&id);
        match cancelled {
            Ok(request) => ok(request),
            Err(e) => request_error(e),
        }
    }

    async fn fulfil_request_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<FulfilRequest>,
    ) -> Response {
        let fulfilled = state.requests.write().await.fulfil(&id, &payload.transaction_hash);
        match fulfilled {
            Ok(request) => ok(request),
            Err(e) => request_error(e),
        }
    }

    // =====================
    // Session Handlers
    // =====================

    async fn session_handler(State(state): State<Arc<ApiServer>>) -> Response {
        ok(SessionResponse {
            accounts: state.session.accounts(),
            selected_account: state.session.selected_account().await,
        })
    }

    /// Selects the default signing account, or clears the selection
    ///
    /// # Endpoint
    /// POST /session/account
    ///
    /// # Responses
    /// - 200 OK: Current session
    /// - 404 Not Found: The signer holds no key for the address
    async fn select_account_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<SelectAccountRequest>,
    ) -> Response {
        match payload.address {
            Some(address) => {
                if state.session.select_account(&address).await.is_none() {
                    return error(StatusCode::NOT_FOUND, format!("Unknown account `{}`", address));
                }
            }
            None => state.session.disconnect().await,
        }
        Self::session_handler(State(state)).await
    }

    async fn notifications_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        let notifications = state.session.notifications(&address).await;
        let unread_count = state.session.unread_count(&address).await;
        ok(NotificationsResponse {
            notifications,
            unread_count,
        })
    }

    async fn mark_read_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<MarkReadRequest>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        match payload.id {
            Some(id) => {
                if !state.session.mark_read(&address, &id).await {
                    return error(StatusCode::NOT_FOUND, "Notification not found");
                }
            }
            None => state.session.mark_all_read(&address).await,
        }
        Self::notifications_handler(Path(raw), State(state)).await
    }

    /// Removes one notification, or clears the inbox
    ///
    /// # Endpoint
    /// DELETE /notifications/:address?id=
    async fn remove_notifications_handler(
        Path(raw): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<RemoveNotificationQuery>,
    ) -> Response {
        let address = match address(&raw) {
            Ok(address) => address,
            Err(response) => return response,
        };
        match query.id {
            Some(id) => {
                if !state.session.remove_notification(&address, &id).await {
                    return error(StatusCode::NOT_FOUND, "Notification not found");
                }
            }
            None => state.session.clear_notifications(&address).await,
        }
        Self::notifications_handler(Path(raw), State(state)).await
    }

    /// Checks a complete set of form values step by step
    ///
    /// # Endpoint
    /// POST /forms/:form/validate
    ///
    /// # Responses
    /// - 200 OK: Every step is satisfied
    /// - 400 Bad Request: First step with blank required fields
    /// - 404 Not Found: Unknown form
    async fn validate_form_handler(
        Path(form): Path<String>,
        Json(values): Json<BTreeMap<String, String>>,
    ) -> Response {
        let Some(kind) = FormKind::from_slug(&form) else {
            return error(StatusCode::NOT_FOUND, format!("Unknown form `{}`", form));
        };
        match FormWizard::complete(kind, values) {
            Ok(values) => ok(FormValidationResponse { valid: true, values }),
            Err(e) => error(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    /// Moves a form wizard one step forward or back
    ///
    /// # Endpoint
    /// POST /forms/:form/step
    ///
    /// # Request Body
    /// Current step index, `next` or `back`, and every value entered so far
    ///
    /// # Responses
    /// - 200 OK: The step now shown and its remaining blank fields
    /// - 400 Bad Request: A step up to the current one has blank required fields
    /// - 404 Not Found: Unknown form
    async fn form_step_handler(
        Path(form): Path<String>,
        Json(request): Json<FormStepRequest>,
    ) -> Response {
        let Some(kind) = FormKind::from_slug(&form) else {
            return error(StatusCode::NOT_FOUND, format!("Unknown form `{}`", form));
        };
        let mut wizard = FormWizard::new(kind);
        for (field, value) in request.values {
            wizard.set(&field, value);
        }
        // Replay the steps already passed so skipped ones are caught
        while wizard.current() < request.step && !wizard.is_last() {
            if let Err(e) = wizard.next() {
                return error(StatusCode::BAD_REQUEST, e.to_string());
            }
        }
        match request.action {
            StepAction::Next => {
                if let Err(e) = wizard.next() {
                    return error(StatusCode::BAD_REQUEST, e.to_string());
                }
            }
            StepAction::Back => {
                wizard.back();
            }
        }
        ok(FormStepResponse {
            form: wizard.kind().slug(),
            step: wizard.current(),
            title: wizard.step().title,
            is_last: wizard.is_last(),
            missing_fields: wizard.missing_fields(),
        })
    }
}
