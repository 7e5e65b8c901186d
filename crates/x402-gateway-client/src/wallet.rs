//! Where payment proofs come from.
//!
//! The gateway's challenge names an amount, currency and recipient; turning
//! that into a proof is a wallet concern this crate does not solve. The
//! [`ProofSource`] trait is the seam; [`MockWallet`] fills it with
//! fabricated transaction hashes for development against gateways that only
//! check structural validity.

use async_trait::async_trait;
use rand::Rng;

use x402_gateway::challenge::PaymentChallenge;
use x402_gateway::proof::PaymentProof;
use x402_gateway::timestamp::UnixTimestamp;

/// Failure to produce a proof for a challenge (wallet locked, insufficient
/// funds, user declined — whatever the implementation means by it).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProofSourceError(pub String);

/// Produces a payment proof satisfying a challenge.
#[async_trait]
pub trait ProofSource: Send + Sync {
    async fn pay(&self, challenge: &PaymentChallenge) -> Result<PaymentProof, ProofSourceError>;
}

/// Fabricates proofs without touching any chain: a random transaction hash,
/// the challenged amount, the challenged recipient, a current timestamp.
#[derive(Debug, Clone)]
pub struct MockWallet {
    sender: String,
}

impl MockWallet {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl ProofSource for MockWallet {
    async fn pay(&self, challenge: &PaymentChallenge) -> Result<PaymentProof, ProofSourceError> {
        let hash_bytes: [u8; 32] = rand::rng().random();
        Ok(PaymentProof {
            tx_hash: format!("0x{}", hex::encode(hash_bytes)),
            amount: challenge.amount.to_string(),
            sender: self.sender.clone(),
            recipient: challenge.recipient_address.clone(),
            timestamp: UnixTimestamp::now().to_string(),
        })
    }
}
