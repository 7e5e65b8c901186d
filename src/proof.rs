//! Wire format for payment proofs.
//!
//! A proof is a caller-supplied claim that a specific transfer happened. It
//! travels as base64-encoded JSON in the `x-payment-proof` request header.
//! Decoding is deliberately loose (all claim fields arrive as strings);
//! [`PaymentProof::validate_structure`] then parses the loose fields into
//! typed [`ProofClaims`]. Keeping the two steps apart lets malformed
//! transport be told apart from ineligible content, and lets structural
//! checks run without any ledger in sight.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::timestamp::UnixTimestamp;
use crate::util::{MoneyAmount, MoneyAmountParseError};

/// Name of the request header carrying the encoded proof.
pub const PAYMENT_PROOF_HEADER: &str = "x-payment-proof";

static TX_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("valid regex"));

/// A transaction hash in the `0x` + 64 hex digits convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TxHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if TX_HASH_RE.is_match(s) {
            Ok(TxHash(s.to_string()))
        } else {
            Err(ValidationError::InvalidTxHash(s.to_string()))
        }
    }
}

impl Display for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payment proof exactly as it appears on the wire.
///
/// All claim fields are strings; nothing here is trusted or parsed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentProof {
    pub tx_hash: String,
    pub amount: String,
    pub sender: String,
    pub recipient: String,
    pub timestamp: String,
}

/// Transport-level failures: the header bytes never yielded a proof object.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 in payment proof: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Payment proof is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Payment proof is not a valid proof object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Content-level failures: the proof object decoded but a claim field does
/// not follow the expected convention.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[source] MoneyAmountParseError),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Empty sender address")]
    EmptySender,
    #[error("Empty recipient address")]
    EmptyRecipient,
}

/// The typed content of a structurally valid proof.
#[derive(Debug, Clone)]
pub struct ProofClaims {
    pub tx_hash: TxHash,
    pub amount: MoneyAmount,
    pub sender: String,
    pub recipient: String,
    pub timestamp: UnixTimestamp,
}

impl PaymentProof {
    /// Serializes the proof to its wire format: base64 of canonical JSON.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("proof serialization is infallible");
        b64.encode(json)
    }

    /// Inverse of [`encode`](Self::encode). Fails on malformed base64,
    /// non-UTF-8 payloads, non-JSON payloads, and missing or unknown fields.
    pub fn decode(wire: &str) -> Result<Self, DecodeError> {
        let raw = b64.decode(wire.trim())?;
        let text = String::from_utf8(raw)?;
        let proof = serde_json::from_str(&text)?;
        Ok(proof)
    }

    /// Checks field conventions and parses the loose wire strings into
    /// typed [`ProofClaims`]. No ledger or pricing knowledge involved.
    pub fn validate_structure(&self) -> Result<ProofClaims, ValidationError> {
        let tx_hash: TxHash = self.tx_hash.parse()?;
        let amount =
            MoneyAmount::parse(&self.amount).map_err(ValidationError::InvalidAmount)?;
        let timestamp = self
            .timestamp
            .parse::<u64>()
            .map(UnixTimestamp::from_secs)
            .map_err(|_| ValidationError::InvalidTimestamp(self.timestamp.clone()))?;
        if self.sender.is_empty() {
            return Err(ValidationError::EmptySender);
        }
        if self.recipient.is_empty() {
            return Err(ValidationError::EmptyRecipient);
        }
        Ok(ProofClaims {
            tx_hash,
            amount,
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            timestamp,
        })
    }
}
