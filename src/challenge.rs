//! 402 challenge construction.
//!
//! A challenge tells the caller what payment would satisfy a resource
//! request: price, currency, where to send funds, and on which network.
//! It is built fresh per unpaid request, never persisted, and carries no
//! security property. The `request_id` is informational only.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::pricing::{Currency, PriceEntry};
use crate::timestamp::UnixTimestamp;
use crate::util::MoneyAmount;

/// A fresh 16-hex-character token identifying one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn fresh() -> Self {
        let bytes: [u8; 8] = rand::rng().random();
        RequestId(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The server's statement of what payment satisfies a resource request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentChallenge {
    pub amount: MoneyAmount,
    pub currency: Currency,
    pub recipient_address: String,
    pub network: String,
    pub asset_contract: String,
    pub request_id: RequestId,
    pub issued_at: UnixTimestamp,
}

/// Body of every 402 response: a fresh challenge, plus the rejection reason
/// when a supplied proof was refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequired {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub x402: PaymentChallenge,
    pub request_id: RequestId,
    pub timestamp: UnixTimestamp,
}

impl PaymentRequired {
    pub fn new(challenge: PaymentChallenge, error: Option<String>) -> Self {
        let request_id = challenge.request_id.clone();
        Self {
            error,
            x402: challenge,
            request_id,
            timestamp: UnixTimestamp::now(),
        }
    }
}

/// Builds challenges from the receiving-side configuration.
///
/// Deterministic given its configuration, except for the fresh `request_id`
/// and `issued_at` instant.
#[derive(Debug, Clone)]
pub struct ChallengeGenerator {
    recipient_address: String,
    network: String,
    asset_contract: String,
}

impl ChallengeGenerator {
    pub fn new(recipient_address: String, network: String, asset_contract: String) -> Self {
        Self {
            recipient_address,
            network,
            asset_contract,
        }
    }

    pub fn recipient_address(&self) -> &str {
        &self.recipient_address
    }

    pub fn issue(&self, entry: &PriceEntry) -> PaymentChallenge {
        PaymentChallenge {
            amount: entry.amount,
            currency: entry.currency,
            recipient_address: self.recipient_address.clone(),
            network: self.network.clone(),
            asset_contract: self.asset_contract.clone(),
            request_id: RequestId::fresh(),
            issued_at: UnixTimestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PriceRegistry;

    fn generator() -> ChallengeGenerator {
        ChallengeGenerator::new(
            format!("0x{}", "2".repeat(40)),
            "base".to_string(),
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
        )
    }

    #[test]
    fn test_request_id_is_16_hex() {
        let id = RequestId::fresh();
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_issue_matches_price_entry() {
        let registry = PriceRegistry::builtin();
        let entry = registry.price_of("translate").unwrap();
        let challenge = generator().issue(entry);
        assert_eq!(challenge.amount.to_string(), "0.02");
        assert_eq!(challenge.currency, Currency::Usdc);
        assert_eq!(challenge.network, "base");
        assert_eq!(challenge.recipient_address, format!("0x{}", "2".repeat(40)));
    }

    #[test]
    fn test_issue_generates_distinct_request_ids() {
        let registry = PriceRegistry::builtin();
        let entry = registry.price_of("logic").unwrap();
        let generator = generator();
        let first = generator.issue(entry);
        let second = generator.issue(entry);
        assert_ne!(first.request_id, second.request_id);
    }

    #[test]
    fn test_challenge_amount_serializes_as_string() {
        let registry = PriceRegistry::builtin();
        let entry = registry.price_of("translate").unwrap();
        let challenge = generator().issue(entry);
        let json = serde_json::to_value(&challenge).unwrap();
        assert_eq!(json["amount"], "0.02");
        assert_eq!(json["currency"], "USDC");
    }
}
