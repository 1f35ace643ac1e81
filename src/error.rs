// src/error.rs
//! Error taxonomy for the credential chain service.
//!
//! Three layers of errors live here:
//! - [`StoreError`]: failures reported by the off-chain claim store
//! - [`LedgerError`]: failures reported by the on-chain registry
//! - [`CredentialError`]: the request-level taxonomy every pipeline returns
//!
//! Trust failures (integrity, ownership, chain shape) and transient backend
//! failures (timeouts, transport) are separate variants so that retry logic
//! can use [`CredentialError::is_transient`] without ever retrying tampering.

use crate::models::claim::ClaimKey;
use crate::models::credential::{ClaimHash, TokenId};
use thiserror::Error;

/// Errors raised by a [`ClaimStore`](crate::storage::claim_store::ClaimStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The claim key is already taken
    #[error("claim key already exists")]
    Conflict,

    /// The claim key is unknown or was soft-deleted
    #[error("claim not found")]
    NotFound,

    /// The claim is password protected and the password did not match
    #[error("claim password does not match")]
    Unauthorized,

    /// The store did not answer within the configured bound
    #[error("claim store timed out")]
    Timeout,

    /// Connection-level failure
    #[error("claim store transport error: {0}")]
    Transport(String),

    /// A 200 response that carried no usable claim
    #[error("claim store returned a malformed response: {0}")]
    MalformedResponse(String),

    /// Any status the protocol does not define
    #[error("claim store answered {status}: {body}")]
    Unexpected { status: u16, body: String },
}

impl StoreError {
    /// Timeouts and transport failures may be retried by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::Transport(_))
    }
}

/// Errors raised by a [`Registry`](crate::blockchain::registry::Registry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No credential exists for the token id (never minted, or burned)
    #[error("credential {0} does not exist on the ledger")]
    NotFound(TokenId),

    /// The ledger did not answer within the configured bound
    #[error("ledger call timed out")]
    Timeout,

    /// The contract rejected the call (revert, bad arguments)
    #[error("contract call failed: {0}")]
    Contract(String),

    /// The transaction was submitted but never mined
    #[error("transaction {0} was dropped from the mempool")]
    Dropped(String),

    /// RPC connection failure
    #[error("ledger transport error: {0}")]
    Transport(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Timeout | LedgerError::Transport(_))
    }
}

/// Request-level error returned by the mint, revoke, verify and proof pipelines.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// A required request field is absent
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but malformed, or fields conflict
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Claim key collisions persisted through every retry
    #[error("could not allocate a unique claim key")]
    Conflict,

    /// The requested credential or claim does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Wrong claim password
    #[error("claim password does not match")]
    Unauthorized,

    /// The presented signature does not recover to the current owner
    #[error("ownership proof failed")]
    OwnershipProofFailed,

    /// The ownership challenge is unknown, expired or already used
    #[error("ownership challenge is unknown, expired or already used")]
    ChallengeUnknown,

    /// Too many ownership challenges are outstanding
    #[error("too many outstanding ownership challenges")]
    TooManyChallenges,

    /// The stored claim no longer hashes to the anchored claim hash
    #[error("integrity check failed for credential {token_id}: ledger has {expected}, claim hashes to {computed}")]
    IntegrityMismatch {
        token_id: TokenId,
        expected: ClaimHash,
        computed: ClaimHash,
    },

    /// The chain exceeds the configured hop bound
    #[error("credential chain exceeds {depth} hops at credential {token_id}")]
    ChainTooLong { token_id: TokenId, depth: usize },

    /// A credential was reached twice while walking the chain
    #[error("credential chain loops back to credential {token_id}")]
    CycleDetected { token_id: TokenId },

    /// A parent pointer references a credential that does not exist
    #[error("credential chain references missing ancestor {token_id}")]
    BrokenChain { token_id: TokenId },

    /// The claim URI carries no claim key
    #[error("claim URI of credential {token_id} has no claim key: {uri}")]
    MalformedUri { token_id: TokenId, uri: String },

    /// A credential on the chain was revoked on the ledger
    #[error("credential {token_id} has been revoked")]
    Revoked { token_id: TokenId },

    /// A credential on the chain is past its expiry
    #[error("credential {token_id} expired at {expires_at}")]
    Expired { token_id: TokenId, expires_at: u64 },

    /// Fetching the claim of one hop failed
    #[error("claim of credential {token_id} could not be read: {source}")]
    HopFailed {
        token_id: TokenId,
        #[source]
        source: StoreError,
    },

    /// The claim was written off-chain but the ledger write failed
    #[error("ledger write for credential {token_id} failed after claim {claim_key} was stored: {source}")]
    OrphanedClaim {
        token_id: TokenId,
        claim_key: ClaimKey,
        #[source]
        source: LedgerError,
    },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CredentialError {
    /// Whether a caller may retry the request unchanged.
    ///
    /// Only backend timeouts and transport failures qualify. Trust failures
    /// never do, and neither does an orphaned mint since retrying it would
    /// resubmit the same token id.
    pub fn is_transient(&self) -> bool {
        match self {
            CredentialError::Ledger(e) => e.is_transient(),
            CredentialError::Store(e) => e.is_transient(),
            CredentialError::HopFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialError::MissingField(_) | CredentialError::InvalidRequest(_) => {
                "InvalidRequest"
            }
            CredentialError::Conflict => "ConflictError",
            CredentialError::NotFound(_) => "NotFoundError",
            CredentialError::Unauthorized => "UnauthorizedError",
            CredentialError::OwnershipProofFailed => "OwnershipProofFailed",
            CredentialError::ChallengeUnknown => "ChallengeUnknown",
            CredentialError::TooManyChallenges => "TooManyChallenges",
            CredentialError::IntegrityMismatch { .. } => "IntegrityMismatch",
            CredentialError::ChainTooLong { .. } => "ChainTooLong",
            CredentialError::CycleDetected { .. } => "CycleDetected",
            CredentialError::BrokenChain { .. } => "BrokenChain",
            CredentialError::MalformedUri { .. } => "MalformedURI",
            CredentialError::Revoked { .. } => "Revoked",
            CredentialError::Expired { .. } => "Expired",
            CredentialError::HopFailed { source, .. } => match source {
                StoreError::NotFound => "NotFoundError",
                StoreError::Unauthorized => "UnauthorizedError",
                StoreError::Timeout => "Timeout",
                _ => "StoreError",
            },
            CredentialError::OrphanedClaim { .. } => "OrphanWriteWarning",
            CredentialError::Ledger(LedgerError::Timeout) => "Timeout",
            CredentialError::Ledger(_) => "ChainError",
            CredentialError::Store(StoreError::Timeout) => "Timeout",
            CredentialError::Store(_) => "StoreError",
            CredentialError::Internal(_) => "Internal",
        }
    }

    /// The credential a failure is attributed to, when there is one.
    pub fn token_id(&self) -> Option<TokenId> {
        match self {
            CredentialError::IntegrityMismatch { token_id, .. }
            | CredentialError::ChainTooLong { token_id, .. }
            | CredentialError::CycleDetected { token_id }
            | CredentialError::BrokenChain { token_id }
            | CredentialError::MalformedUri { token_id, .. }
            | CredentialError::Revoked { token_id }
            | CredentialError::Expired { token_id, .. }
            | CredentialError::HopFailed { token_id, .. }
            | CredentialError::OrphanedClaim { token_id, .. } => Some(*token_id),
            CredentialError::Ledger(LedgerError::NotFound(token_id)) => Some(*token_id),
            _ => None,
        }
    }
}

impl From<LedgerError> for CredentialError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(token_id) => {
                CredentialError::NotFound(format!("credential {}", token_id))
            }
            other => CredentialError::Ledger(other),
        }
    }
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CredentialError::NotFound("claim".to_string()),
            StoreError::Unauthorized => CredentialError::Unauthorized,
            StoreError::Conflict => CredentialError::Conflict,
            other => CredentialError::Store(other),
        }
    }
}
