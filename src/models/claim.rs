// src/models/claim.rs
//! Off-ledger claim data model.
//!
//! A claim is an arbitrary JSON document held by the claim store under a
//! [`ClaimKey`]. The key is a capability: whoever holds the claim URI (and
//! the password, for protected claims) can read the claim.

use rand::RngCore;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Random bytes in a freshly generated claim key (128 bits).
pub const CLAIM_KEY_BYTES: usize = 16;

/// Query parameter that carries the claim key inside a claim URI.
pub const CLAIM_KEY_PARAM: &str = "claimKey";

/// Opaque capability token naming one claim in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimKey(String);

impl ClaimKey {
    /// Generates a fresh hex-encoded key with [`CLAIM_KEY_BYTES`] of entropy.
    pub fn generate() -> Self {
        let mut bytes = [0u8; CLAIM_KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        ClaimKey(ethers::utils::hex::encode(bytes))
    }

    /// Wraps an existing key, rejecting empty or non URL-safe values.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| ClaimKey(raw.to_string()))
    }

    /// Extracts the claim key from a claim URI's query string.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let url = Url::parse(uri).ok()?;
        let raw = url
            .query_pairs()
            .find(|(name, _)| name == CLAIM_KEY_PARAM)
            .map(|(_, value)| value.into_owned())?;
        Self::parse(&raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the claim URI for `key` under the store's base URL.
///
/// The result has the shape `{base}/api/claims?claimKey={key}`.
pub fn claim_uri(base_url: &Url, key: &ClaimKey) -> String {
    let mut url = base_url.clone();
    url.set_path(&format!("{}/api/claims", base_url.path().trim_end_matches('/')));
    url.set_query(None);
    url.query_pairs_mut().append_pair(CLAIM_KEY_PARAM, key.as_str());
    url.to_string()
}

/// Claim record as written to the claim store.
///
/// Field names follow the store's wire format.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredClaim {
    #[serde(rename = "Claim")]
    pub claim: Value,
    /// bcrypt hash of the claim password, never the plaintext
    #[serde(rename = "password")]
    pub password_hash: Option<String>,
    #[serde(rename = "claimKey")]
    pub claim_key: ClaimKey,
}
