// src/storage/claim_store.rs
//! Claim store client for access-controlled off-chain claims.
//!
//! The claim store keeps claim payloads under random [`ClaimKey`]s. A claim
//! may carry a bcrypt password hash; reads of such a claim must present the
//! plaintext password, which the store checks.
//!
//! # HTTP surface
//! | Method | Path | Outcome |
//! |--------|------|---------|
//! | POST   | `/api/claims` body `{Claim, password, claimKey}` | 200, 409 on key conflict |
//! | GET    | `/api/claims?claimKey=&password=` | 200 claim, 401 bad password, 404 |
//! | DELETE | `/api/credentials/{tokenId}?claimKey=` | 200, 404 |
//!
//! Every request is bounded by the configured timeout. A timeout surfaces as
//! [`StoreError::Timeout`], never as a trust failure.

use crate::config::ClaimStoreConfig;
use crate::error::StoreError;
use crate::models::claim::{self, ClaimKey, StoredClaim, CLAIM_KEY_PARAM};
use crate::models::credential::TokenId;
use async_trait::async_trait;
use log::debug;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

/// Keyed claim storage with an optional password gate.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Writes a new claim. Fails with [`StoreError::Conflict`] if the key is
    /// taken; existing claims are never overwritten.
    async fn put(&self, claim: &StoredClaim) -> Result<(), StoreError>;

    /// Reads a claim payload, presenting `password` when the claim is protected.
    async fn get(&self, key: &ClaimKey, password: Option<&str>) -> Result<Value, StoreError>;

    /// Marks the claim anchored by `token_id` deleted; later reads of `key`
    /// fail with [`StoreError::NotFound`].
    async fn soft_delete(&self, token_id: TokenId, key: &ClaimKey) -> Result<(), StoreError>;

    /// The claim URI that is anchored on the ledger for `key`.
    fn claim_uri(&self, key: &ClaimKey) -> String;
}

/// Claim store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpClaimStore {
    http: reqwest::Client,
    base_url: Url,
}

/// Successful GET bodies come either wrapped (`{"credential": {"Claim": ..}}`)
/// or bare (`{"Claim": ..}`).
#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimResponse {
    Wrapped { credential: ClaimBody },
    Bare(ClaimBody),
}

#[derive(Deserialize)]
struct ClaimBody {
    #[serde(rename = "Claim", alias = "claim")]
    claim: Option<Value>,
}

impl HttpClaimStore {
    /// Creates a client for the store at `config.base_url`.
    ///
    /// # Errors
    /// Returns `StoreError::Transport` if the base URL does not parse or the
    /// HTTP client cannot be built.
    pub fn new(config: &ClaimStoreConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            StoreError::Transport(format!("invalid claim store URL {}: {}", config.base_url, e))
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("{}{}", self.base_url.path().trim_end_matches('/'), path));
        url
    }

    fn claims_endpoint(&self) -> Url {
        self.endpoint("/api/claims")
    }

    async fn error_for(response: reqwest::Response) -> StoreError {
        let status = response.status();
        match status {
            StatusCode::CONFLICT => StoreError::Conflict,
            StatusCode::NOT_FOUND => StoreError::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized,
            _ => StoreError::Unexpected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            },
        }
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(err.to_string())
    }
}

#[async_trait]
impl ClaimStore for HttpClaimStore {
    async fn put(&self, claim: &StoredClaim) -> Result<(), StoreError> {
        debug!("storing claim {}", claim.claim_key);
        let response = self
            .http
            .post(self.claims_endpoint())
            .json(claim)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }

    async fn get(&self, key: &ClaimKey, password: Option<&str>) -> Result<Value, StoreError> {
        let mut query = vec![(CLAIM_KEY_PARAM, key.as_str())];
        if let Some(password) = password {
            query.push(("password", password));
        }
        let response = self
            .http
            .get(self.claims_endpoint())
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let body: ClaimResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout
            } else {
                StoreError::MalformedResponse(e.to_string())
            }
        })?;
        let claim = match body {
            ClaimResponse::Wrapped { credential } => credential.claim,
            ClaimResponse::Bare(body) => body.claim,
        };
        claim
            .filter(|value| !value.is_null())
            .ok_or_else(|| StoreError::MalformedResponse("response carries no claim".to_string()))
    }

    async fn soft_delete(&self, token_id: TokenId, key: &ClaimKey) -> Result<(), StoreError> {
        debug!("deleting claim {} of credential {}", key, token_id);
        let response = self
            .http
            .delete(self.endpoint(&format!("/api/credentials/{}", token_id)))
            .query(&[(CLAIM_KEY_PARAM, key.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }

    fn claim_uri(&self, key: &ClaimKey) -> String {
        claim::claim_uri(&self.base_url, key)
    }
}
