// src/services/api_server.rs
//! API Server for the credential chain service
//!
//! Issuer routes are mounted under `/api/issuer`, verifier routes under
//! `/api/verifier`:
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET  | `/` | liveness |
//! | POST | `/api/issuer/upload` | store a claim ahead of minting |
//! | POST | `/api/issuer/mint` | mint a credential |
//! | POST | `/api/issuer/revoke`, `/api/issuer/burn` | revoke a credential |
//! | POST | `/api/issuer/transfer` | transfer a credential |
//! | GET  | `/api/issuer/claimURI/:tokenId` | anchored claim URI |
//! | GET  | `/api/issuer/claimHash/:tokenId` | anchored claim hash |
//! | GET  | `/api/issuer/credential/:tokenId` | full ledger record |
//! | GET, POST | `/api/verifier/verify` | verify a credential chain |
//! | POST | `/api/verifier/challenge` | issue an ownership challenge |
//!
//! Every failure is rendered as `{"error", "kind", "tokenId"?}` with the
//! status given by [`status_for`].

use crate::error::{CredentialError, LedgerError, StoreError};
use crate::models::credential::{Credential, TokenId, TxReceipt};
use crate::models::requests::{
    ChallengeRequest, MintRequest, RevokeRequest, TransferRequest, UploadRequest, VerifyRequest,
};
use crate::services::credential_issuer::{
    CredentialIssuer, MintOutcome, RevokeOutcome, UploadOutcome,
};
use crate::services::ownership::{Challenge, OwnershipVerifier};
use crate::services::verifier::{VerificationReport, Verifier};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// HTTP status for each failure kind.
pub fn status_for(err: &CredentialError) -> StatusCode {
    match err {
        CredentialError::MissingField(_)
        | CredentialError::InvalidRequest(_)
        | CredentialError::IntegrityMismatch { .. }
        | CredentialError::ChainTooLong { .. }
        | CredentialError::CycleDetected { .. }
        | CredentialError::BrokenChain { .. }
        | CredentialError::MalformedUri { .. }
        | CredentialError::Expired { .. } => StatusCode::BAD_REQUEST,
        CredentialError::NotFound(_) => StatusCode::NOT_FOUND,
        CredentialError::Unauthorized
        | CredentialError::OwnershipProofFailed
        | CredentialError::ChallengeUnknown => StatusCode::UNAUTHORIZED,
        CredentialError::Revoked { .. } => StatusCode::GONE,
        CredentialError::TooManyChallenges => StatusCode::TOO_MANY_REQUESTS,
        CredentialError::Conflict => StatusCode::CONFLICT,
        CredentialError::HopFailed { source, .. } => match source {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            StoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        },
        CredentialError::OrphanedClaim { .. } => StatusCode::BAD_GATEWAY,
        CredentialError::Ledger(LedgerError::Timeout)
        | CredentialError::Store(StoreError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        CredentialError::Ledger(_) | CredentialError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        CredentialError::Store(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for CredentialError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        let mut body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let Some(token_id) = self.token_id() {
            body["tokenId"] = Value::String(token_id.to_string());
        }
        (status, Json(body)).into_response()
    }
}

fn rejected_body(rejection: JsonRejection) -> CredentialError {
    CredentialError::InvalidRequest(rejection.body_text())
}

fn rejected_query(rejection: QueryRejection) -> CredentialError {
    CredentialError::InvalidRequest(rejection.body_text())
}

fn path_token_id(raw: &str) -> Result<TokenId, CredentialError> {
    raw.parse().map_err(CredentialError::InvalidRequest)
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Upload, mint, revoke, transfer and ledger reads
    credential_issuer: Arc<CredentialIssuer>,

    /// Chain verification engine
    verifier: Arc<Verifier>,

    /// Challenge issuance and proof of possession
    ownership: Arc<OwnershipVerifier>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `credential_issuer` - Service for credential writes and reads
    /// * `verifier` - Chain verification engine
    /// * `ownership` - Ownership proof verifier
    pub fn new(
        credential_issuer: CredentialIssuer,
        verifier: Verifier,
        ownership: OwnershipVerifier,
    ) -> Self {
        ApiServer {
            credential_issuer: Arc::new(credential_issuer),
            verifier: Arc::new(verifier),
            ownership: Arc::new(ownership),
        }
    }

    /// Builds the router with all routes and CORS applied.
    pub fn router(&self) -> Router {
        let issuer = Router::new()
            .route("/upload", post(Self::upload_handler))
            .route("/mint", post(Self::mint_handler))
            .route("/revoke", post(Self::revoke_handler))
            .route("/burn", post(Self::revoke_handler))
            .route("/transfer", post(Self::transfer_handler))
            .route("/claimURI/:token_id", get(Self::claim_uri_handler))
            .route("/claimHash/:token_id", get(Self::claim_hash_handler))
            .route("/credential/:token_id", get(Self::credential_handler));

        let verifier = Router::new()
            .route("/verify", get(Self::verify_query_handler).post(Self::verify_body_handler))
            .route("/challenge", post(Self::challenge_handler));

        Router::new()
            .route("/", get(Self::health_handler))
            .nest("/api/issuer", issuer)
            .nest("/api/verifier", verifier)
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves until the listener fails.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    async fn health_handler() -> &'static str {
        "credential-chain service is running"
    }

    // =====================
    // Issuer Handlers
    // =====================

    /// POST /api/issuer/upload
    ///
    /// # Responses
    /// - 200 OK: `{uri, claimHash, password?}`
    /// - 400 Bad Request: missing claim
    /// - 409 Conflict: no free claim key after the configured retries
    async fn upload_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<UploadRequest>, JsonRejection>,
    ) -> Result<Json<UploadOutcome>, CredentialError> {
        let Json(request) = payload.map_err(rejected_body)?;
        let outcome = state.credential_issuer.upload(request.validate()?).await?;
        Ok(Json(outcome))
    }

    /// POST /api/issuer/mint
    ///
    /// # Responses
    /// - 200 OK: token id, transaction receipt, claim hash and URI
    /// - 400 Bad Request: missing or conflicting fields, unknown parent
    /// - 502 Bad Gateway: the claim was stored but the ledger write failed
    async fn mint_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<MintRequest>, JsonRejection>,
    ) -> Result<Json<MintOutcome>, CredentialError> {
        let Json(request) = payload.map_err(rejected_body)?;
        let outcome = state.credential_issuer.mint(request.validate()?).await?;
        Ok(Json(outcome))
    }

    /// POST /api/issuer/revoke (and /api/issuer/burn)
    ///
    /// # Responses
    /// - 200 OK: receipt and claim cleanup status
    /// - 404 Not Found: unknown token
    /// - 410 Gone: already revoked
    async fn revoke_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<RevokeRequest>, JsonRejection>,
    ) -> Result<Json<RevokeOutcome>, CredentialError> {
        let Json(request) = payload.map_err(rejected_body)?;
        let outcome = state.credential_issuer.revoke(request.validate()?).await?;
        Ok(Json(outcome))
    }

    async fn transfer_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<TransferRequest>, JsonRejection>,
    ) -> Result<Json<TxReceipt>, CredentialError> {
        let Json(request) = payload.map_err(rejected_body)?;
        let receipt = state.credential_issuer.transfer(request.validate()?).await?;
        Ok(Json(receipt))
    }

    async fn claim_uri_handler(
        State(state): State<Arc<ApiServer>>,
        Path(token_id): Path<String>,
    ) -> Result<Json<Value>, CredentialError> {
        let token_id = path_token_id(&token_id)?;
        let claim_uri = state.credential_issuer.claim_uri(token_id).await?;
        Ok(Json(json!({ "tokenId": token_id, "claimURI": claim_uri })))
    }

    async fn claim_hash_handler(
        State(state): State<Arc<ApiServer>>,
        Path(token_id): Path<String>,
    ) -> Result<Json<Value>, CredentialError> {
        let token_id = path_token_id(&token_id)?;
        let claim_hash = state.credential_issuer.claim_hash(token_id).await?;
        Ok(Json(json!({ "tokenId": token_id, "claimHash": claim_hash })))
    }

    async fn credential_handler(
        State(state): State<Arc<ApiServer>>,
        Path(token_id): Path<String>,
    ) -> Result<Json<Credential>, CredentialError> {
        let token_id = path_token_id(&token_id)?;
        Ok(Json(state.credential_issuer.credential(token_id).await?))
    }

    // =====================
    // Verifier Handlers
    // =====================

    /// GET /api/verifier/verify?tokenId=&password=
    ///
    /// # Responses
    /// - 200 OK: head-first chain of verified hops
    /// - 400 Bad Request: integrity or chain shape failure
    /// - 401 Unauthorized: wrong password or failed ownership proof
    /// - 404 Not Found: unknown credential or deleted claim
    /// - 410 Gone: a credential on the chain was revoked
    async fn verify_query_handler(
        State(state): State<Arc<ApiServer>>,
        query: Result<Query<VerifyRequest>, QueryRejection>,
    ) -> Result<Json<VerificationReport>, CredentialError> {
        let Query(request) = query.map_err(rejected_query)?;
        let command = request.validate()?;
        Ok(Json(state.verifier.verify(&command, &state.ownership).await?))
    }

    /// POST /api/verifier/verify with `{tokenId, password?, challengeId?, signature?}`
    async fn verify_body_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<VerifyRequest>, JsonRejection>,
    ) -> Result<Json<VerificationReport>, CredentialError> {
        let Json(request) = payload.map_err(rejected_body)?;
        let command = request.validate()?;
        Ok(Json(state.verifier.verify(&command, &state.ownership).await?))
    }

    /// POST /api/verifier/challenge with `{tokenId}`
    async fn challenge_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<ChallengeRequest>, JsonRejection>,
    ) -> Result<Json<Challenge>, CredentialError> {
        let Json(request) = payload.map_err(rejected_body)?;
        let challenge = state.ownership.issue_challenge(request.validate()?).await?;
        Ok(Json(challenge))
    }
}
