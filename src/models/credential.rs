// src/models/credential.rs
//! On-ledger credential data model.
//!
//! A [`Credential`] is the record the registry contract keeps for every token:
//! a pointer to the off-chain claim (`claim_uri`), the anchored hash of that
//! claim (`claim_hash`) and a parent pointer (`issuer_token_id`) that links
//! credentials into chains. A parent pointer of zero marks a root credential.
//!
//! [`ChainVerificationResult`] is the head-first sequence of verified hops the
//! chain verification engine produces. It is built per request and never stored.

use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Token identifier of a credential on the registry contract.
///
/// Serialized as a decimal string so JSON clients never lose precision.
/// Parsing accepts decimal or `0x`-prefixed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TokenId(pub U256);

impl TokenId {
    /// The parent pointer value that marks a root credential.
    pub const ROOT: TokenId = TokenId(U256([0, 0, 0, 0]));

    pub fn is_root(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        TokenId(U256::from(value))
    }
}

impl From<U256> for TokenId {
    fn from(value: U256) -> Self {
        TokenId(value)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("token id is empty".to_string());
        }
        let parsed = match s.strip_prefix("0x") {
            Some(hex_digits) => U256::from_str_radix(hex_digits, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(s).map_err(|e| e.to_string()),
        };
        parsed
            .map(TokenId)
            .map_err(|e| format!("invalid token id `{}`: {}", s, e))
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(TokenId::from(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// 32-byte Keccak-256 content hash anchored on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimHash(pub [u8; 32]);

impl From<[u8; 32]> for ClaimHash {
    fn from(bytes: [u8; 32]) -> Self {
        ClaimHash(bytes)
    }
}

impl From<H256> for ClaimHash {
    fn from(hash: H256) -> Self {
        ClaimHash(hash.0)
    }
}

impl fmt::Display for ClaimHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ClaimHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| format!("invalid claim hash: {}", e))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "claim hash must be 32 bytes".to_string())?;
        Ok(ClaimHash(array))
    }
}

impl Serialize for ClaimHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClaimHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The registry's record for one token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: TokenId,
    #[serde(rename = "claimURI")]
    pub claim_uri: String,
    pub claim_hash: ClaimHash,
    /// Account that submitted the `certify` transaction
    pub issuer: Address,
    /// Parent credential, [`TokenId::ROOT`] for roots
    pub issuer_token_id: TokenId,
    pub issued_at: u64,
    /// Unix seconds, zero when the credential never expires
    pub expires_at: u64,
    #[serde(default)]
    pub optional_data: Bytes,
    /// Set once a `revoke` for this token has landed
    #[serde(default)]
    pub revoked: bool,
}

impl Credential {
    pub fn is_root(&self) -> bool {
        self.issuer_token_id.is_root()
    }

    pub fn parent(&self) -> Option<TokenId> {
        if self.is_root() {
            None
        } else {
            Some(self.issuer_token_id)
        }
    }

    /// Whether the credential is past its expiry at `now` (unix seconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at != 0 && now > self.expires_at
    }
}

/// Arguments of a `certify` transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CertifyRequest {
    /// Holder that receives the token
    pub to: Address,
    pub token_id: TokenId,
    pub claim_uri: String,
    pub claim_hash: ClaimHash,
    pub parent_token_id: TokenId,
    pub issued_at: u64,
    pub expires_at: u64,
    pub optional_data: Bytes,
}

/// Inclusion receipt of a ledger write.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
}

/// One verified hop of a credential chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HopRecord {
    pub token_id: TokenId,
    pub claim: Value,
    #[serde(rename = "claimURI")]
    pub claim_uri: String,
    pub claim_hash: ClaimHash,
    pub issuer: Address,
    pub issuer_token_id: TokenId,
}

/// Head-first sequence of verified hops: the requested credential followed
/// by its ancestors up to the root.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChainVerificationResult {
    pub chain: Vec<HopRecord>,
}

impl ChainVerificationResult {
    pub fn head(&self) -> Option<&HopRecord> {
        self.chain.first()
    }

    pub fn root(&self) -> Option<&HopRecord> {
        self.chain.last()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn token_ids(&self) -> Vec<TokenId> {
        self.chain.iter().map(|hop| hop.token_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_parses_decimal_and_hex() {
        assert_eq!("42".parse::<TokenId>().unwrap(), TokenId::from(42u64));
        assert_eq!("0x2a".parse::<TokenId>().unwrap(), TokenId::from(42u64));
        assert!("".parse::<TokenId>().is_err());
        assert!("forty-two".parse::<TokenId>().is_err());
    }

    #[test]
    fn token_id_serializes_as_decimal_string() {
        let json = serde_json::to_string(&TokenId::from(7u64)).unwrap();
        assert_eq!(json, "\"7\"");

        let from_number: TokenId = serde_json::from_str("7").unwrap();
        let from_text: TokenId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(from_number, from_text);
    }

    #[test]
    fn zero_parent_marks_root() {
        assert!(TokenId::ROOT.is_root());
        assert!(TokenId::from(0u64).is_root());
        assert!(!TokenId::from(1u64).is_root());
    }

    #[test]
    fn claim_hash_displays_as_prefixed_hex() {
        let hash = ClaimHash::from([0xab; 32]);
        let text = hash.to_string();
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<ClaimHash>().unwrap(), hash);
    }

    #[test]
    fn expiry_of_zero_never_expires() {
        let credential = Credential {
            id: TokenId::from(1u64),
            claim_uri: "http://store/api/claims?claimKey=ab".into(),
            claim_hash: ClaimHash::from([0u8; 32]),
            issuer: Address::zero(),
            issuer_token_id: TokenId::ROOT,
            issued_at: 10,
            expires_at: 0,
            optional_data: Bytes::default(),
            revoked: false,
        };
        assert!(!credential.is_expired_at(u64::MAX));
        assert_eq!(credential.parent(), None);
    }
}
