// src/models/requests.rs
//! Request schemas accepted by the service and their validated forms.
//!
//! Every incoming body is deserialized into a `*Request` struct whose fields
//! are all optional, then validated into a command type. Validation reports
//! the first missing field by name, so callers get a precise 400 instead of a
//! generic decode failure.

use crate::error::CredentialError;
use crate::models::credential::TokenId;
use ethers::types::{Address, Bytes};
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, CredentialError> {
    value.ok_or(CredentialError::MissingField(field))
}

fn parse_address(raw: &str, field: &str) -> Result<Address, CredentialError> {
    Address::from_str(raw.trim())
        .map_err(|e| {
            CredentialError::InvalidRequest(format!("`{}` is not an address: {}", field, e))
        })
}

fn parse_token_id(raw: &TokenIdInput, field: &str) -> Result<TokenId, CredentialError> {
    match raw {
        TokenIdInput::Number(n) => Ok(TokenId::from(*n)),
        TokenIdInput::Text(s) => s
            .parse()
            .map_err(|e: String| CredentialError::InvalidRequest(format!("`{}`: {}", field, e))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Token id as clients send it: JSON number or decimal/hex string.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TokenIdInput {
    Number(u64),
    Text(String),
}

/// `POST /api/issuer/upload`
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(alias = "Claim")]
    pub claim: Option<Value>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadCommand {
    pub claim: Value,
    pub password: Option<String>,
}

impl UploadRequest {
    pub fn validate(self) -> Result<UploadCommand, CredentialError> {
        let claim = required(self.claim.filter(|c| !c.is_null()), "claim")?;
        Ok(UploadCommand {
            claim,
            password: non_empty(self.password),
        })
    }
}

/// `POST /api/issuer/mint`
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub token_id: Option<TokenIdInput>,
    pub to: Option<String>,
    #[serde(alias = "Claim")]
    pub claim: Option<Value>,
    pub uri: Option<String>,
    #[serde(alias = "pTokenId")]
    pub parent_token_id: Option<TokenIdInput>,
    pub password: Option<String>,
    #[serde(default)]
    pub generate_password: bool,
    pub issued_at: Option<u64>,
    pub expires_at: Option<u64>,
    pub optional_data: Option<Bytes>,
}

/// Where the claim of a new credential comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimSource {
    /// Store this payload as a new claim
    Inline(Value),
    /// Anchor a claim stored earlier through the upload endpoint
    Uploaded { uri: String },
}

/// Position of a new credential in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lineage {
    Root,
    Child { parent: TokenId },
}

impl Lineage {
    pub fn parent_token_id(&self) -> TokenId {
        match self {
            Lineage::Root => TokenId::ROOT,
            Lineage::Child { parent } => *parent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordPolicy {
    None,
    Supplied(String),
    /// Generate a random password and hand it back once
    Generated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MintCommand {
    pub token_id: TokenId,
    pub to: Address,
    pub source: ClaimSource,
    pub lineage: Lineage,
    pub password: PasswordPolicy,
    pub issued_at: u64,
    pub expires_at: u64,
    pub optional_data: Bytes,
}

impl MintRequest {
    pub fn validate(self) -> Result<MintCommand, CredentialError> {
        let token_id = parse_token_id(&required(self.token_id, "tokenId")?, "tokenId")?;
        if token_id.is_root() {
            return Err(CredentialError::InvalidRequest(
                "`tokenId` 0 is reserved as the root marker".to_string(),
            ));
        }
        let to = parse_address(&required(non_empty(self.to), "to")?, "to")?;

        let source = match (self.claim.filter(|c| !c.is_null()), non_empty(self.uri)) {
            (Some(claim), None) => ClaimSource::Inline(claim),
            (None, Some(uri)) => ClaimSource::Uploaded { uri },
            (Some(_), Some(_)) => {
                return Err(CredentialError::InvalidRequest(
                    "send either `claim` or `uri`, not both".to_string(),
                ))
            }
            (None, None) => return Err(CredentialError::MissingField("claim")),
        };

        let issued_at = required(self.issued_at, "issuedAt")?;
        let expires_at = required(self.expires_at, "expiresAt")?;
        if expires_at != 0 && expires_at <= issued_at {
            return Err(CredentialError::InvalidRequest(
                "`expiresAt` must be after `issuedAt`".to_string(),
            ));
        }

        let lineage = match self.parent_token_id {
            Some(raw) => match parse_token_id(&raw, "parentTokenId")? {
                parent if parent.is_root() => Lineage::Root,
                parent if parent == token_id => {
                    return Err(CredentialError::InvalidRequest(
                        "a credential cannot be its own parent".to_string(),
                    ))
                }
                parent => Lineage::Child { parent },
            },
            None => Lineage::Root,
        };

        let password = match (non_empty(self.password), self.generate_password) {
            (Some(_), true) => {
                return Err(CredentialError::InvalidRequest(
                    "send either `password` or `generatePassword`, not both".to_string(),
                ))
            }
            (Some(password), false) => PasswordPolicy::Supplied(password),
            (None, true) => PasswordPolicy::Generated,
            (None, false) => PasswordPolicy::None,
        };
        if password == PasswordPolicy::Generated && matches!(source, ClaimSource::Uploaded { .. }) {
            return Err(CredentialError::InvalidRequest(
                "`generatePassword` only applies to inline claims".to_string(),
            ));
        }

        Ok(MintCommand {
            token_id,
            to,
            source,
            lineage,
            password,
            issued_at,
            expires_at,
            optional_data: self.optional_data.unwrap_or_default(),
        })
    }
}

/// `POST /api/issuer/revoke` and its `/burn` alias
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub token_id: Option<TokenIdInput>,
}

impl RevokeRequest {
    pub fn validate(self) -> Result<TokenId, CredentialError> {
        parse_token_id(&required(self.token_id, "tokenId")?, "tokenId")
    }
}

/// `POST /api/issuer/transfer`
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    pub token_id: Option<TokenIdInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub from: Address,
    pub to: Address,
    pub token_id: TokenId,
}

impl TransferRequest {
    pub fn validate(self) -> Result<TransferCommand, CredentialError> {
        let from = parse_address(&required(non_empty(self.from), "from")?, "from")?;
        let to = parse_address(&required(non_empty(self.to), "to")?, "to")?;
        let token_id = parse_token_id(&required(self.token_id, "tokenId")?, "tokenId")?;
        Ok(TransferCommand { from, to, token_id })
    }
}

/// `GET /api/verifier/verify` query string and `POST /api/verifier/verify` body
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub token_id: Option<TokenIdInput>,
    pub password: Option<String>,
    pub challenge_id: Option<String>,
    pub signature: Option<String>,
}

/// Proof of possession attached to a verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfPossession {
    pub challenge_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyCommand {
    pub token_id: TokenId,
    pub password: Option<String>,
    pub proof: Option<ProofOfPossession>,
}

impl VerifyRequest {
    pub fn validate(self) -> Result<VerifyCommand, CredentialError> {
        let token_id = parse_token_id(&required(self.token_id, "tokenId")?, "tokenId")?;
        let proof = match (non_empty(self.challenge_id), non_empty(self.signature)) {
            (Some(challenge_id), Some(signature)) => Some(ProofOfPossession {
                challenge_id,
                signature,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(CredentialError::MissingField("signature")),
            (None, Some(_)) => return Err(CredentialError::MissingField("challengeId")),
        };
        Ok(VerifyCommand {
            token_id,
            password: non_empty(self.password),
            proof,
        })
    }
}

/// `POST /api/verifier/challenge`
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub token_id: Option<TokenIdInput>,
}

impl ChallengeRequest {
    pub fn validate(self) -> Result<TokenId, CredentialError> {
        parse_token_id(&required(self.token_id, "tokenId")?, "tokenId")
    }
}
