//! The protocol state machine: challenge issuance, proof verification,
//! ledger commit, handler dispatch.
//!
//! Per request: resolve the agent (unknown resources fail fast, before any
//! payment logic), then either issue a challenge (no proof header) or walk
//! the verification ladder: decode, structural validation, business
//! validation, atomic ledger commit, bounded dispatch. Cheap checks run
//! before the one state-mutating step. No state survives across requests;
//! continuity of the challenge/retry exchange is carried by the client.
//!
//! The ledger commit happens before handler execution: a `tx_hash` is spent
//! even if the downstream call then fails. Callers can distinguish
//! "pay again" (402) from "paid but execution failed" (5xx) by status.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::agents::{AgentRegistry, HandlerError};
use crate::challenge::{ChallengeGenerator, PaymentRequired};
use crate::ledger::{Ledger, PaymentRecord, StorageError, TryCommit};
use crate::pricing::{PriceEntry, PriceRegistry};
use crate::proof::{DecodeError, PaymentProof, ProofClaims, TxHash, ValidationError};
use crate::stats::{self, UsageStats};
use crate::timestamp::UnixTimestamp;

/// Everything that can go wrong between an incoming request and a served
/// result. Variant order mirrors the verification ladder.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The request target is not a priced resource. No payment state touched.
    #[error("Unknown agent: {0}")]
    UnknownResource(String),
    /// The proof header never yielded a proof object.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The proof object violates a field convention.
    #[error(transparent)]
    Structure(#[from] ValidationError),
    /// The proof pays somebody else.
    #[error("Proof recipient {proof} does not match receiving address {expected}")]
    IncompatibleRecipient { proof: String, expected: String },
    /// The proof pays less than the resource costs.
    #[error("Proof amount {offered} below required price {required}")]
    InsufficientAmount { offered: String, required: String },
    /// The proof is older than the validity window.
    #[error("Proof is {age_secs}s old, exceeding the {window_secs}s validity window")]
    Expired { age_secs: u64, window_secs: u64 },
    /// The `tx_hash` was already consumed.
    #[error("Payment proof already used: {0}")]
    Replay(TxHash),
    /// Ledger I/O failed. Never reported as a replay.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The payment was committed but fulfillment failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Receipt echoed back to the payer on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub tx_hash: TxHash,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// 200 body for a fulfilled, paid request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServedResponse {
    pub success: bool,
    pub result: String,
    pub agent: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    pub payment: PaymentReceipt,
    pub model: String,
    pub tokens_used: u64,
}

/// What the dispatcher decided to send back.
#[derive(Debug)]
pub enum Disposition {
    /// No proof was supplied; here is what payment would satisfy the request.
    PaymentRequired(Box<PaymentRequired>),
    /// Payment consumed and the handler delivered.
    Served(Box<ServedResponse>),
}

/// Orchestrates the whole flow. Depends on the [`Ledger`] seam, not a
/// concrete store.
pub struct Gateway {
    ledger: Arc<dyn Ledger>,
    prices: PriceRegistry,
    agents: AgentRegistry,
    challenges: ChallengeGenerator,
    validity_window: Duration,
}

impl Gateway {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        prices: PriceRegistry,
        agents: AgentRegistry,
        challenges: ChallengeGenerator,
        validity_window: Duration,
    ) -> Self {
        Self {
            ledger,
            prices,
            agents,
            challenges,
            validity_window,
        }
    }

    pub fn price_entries(&self) -> &[PriceEntry] {
        self.prices.entries()
    }

    /// Fresh challenge for a priced resource, wrapped for the 402 body.
    pub fn challenge_for(&self, entry: &PriceEntry, error: Option<String>) -> PaymentRequired {
        PaymentRequired::new(self.challenges.issue(entry), error)
    }

    /// Current usage summary folded from the ledger snapshot.
    pub async fn usage_stats(&self) -> Result<UsageStats, StorageError> {
        let records = self.ledger.all_records().await?;
        Ok(stats::summarize(&records, UnixTimestamp::now()))
    }

    /// Runs one request through the state machine.
    #[instrument(skip(self, proof_header, payload), fields(agent = resource))]
    pub async fn serve(
        &self,
        resource: &str,
        proof_header: Option<&str>,
        payload: &Value,
    ) -> Result<Disposition, PaymentError> {
        let entry = self
            .prices
            .price_of(resource)
            .ok_or_else(|| PaymentError::UnknownResource(resource.to_string()))?;
        let handler = self
            .agents
            .get(resource)
            .ok_or_else(|| PaymentError::UnknownResource(resource.to_string()))?;

        let wire = match proof_header {
            None => {
                let required = self.challenge_for(entry, None);
                tracing::debug!(request_id = %required.request_id, "Issued payment challenge");
                return Ok(Disposition::PaymentRequired(Box::new(required)));
            }
            Some(wire) => wire,
        };

        let proof = PaymentProof::decode(wire)?;
        let claims = proof.validate_structure()?;
        self.assert_eligible(&claims, entry, UnixTimestamp::now())?;

        let record = PaymentRecord {
            tx_hash: claims.tx_hash.clone(),
            amount: claims.amount,
            sender: claims.sender.clone(),
            resource: resource.to_string(),
            verified_at: UnixTimestamp::now(),
        };
        match self.ledger.try_commit(record).await? {
            TryCommit::Committed => {}
            TryCommit::AlreadyExists => return Err(PaymentError::Replay(claims.tx_hash)),
        }
        tracing::info!(tx_hash = %claims.tx_hash, amount = %claims.amount, "Payment consumed");

        let output = self.agents.dispatch(handler.as_ref(), payload).await?;
        Ok(Disposition::Served(Box::new(ServedResponse {
            success: true,
            result: output.text,
            agent: resource.to_string(),
            cost: entry.amount.as_decimal(),
            payment: PaymentReceipt {
                tx_hash: claims.tx_hash,
                amount: claims.amount.as_decimal(),
            },
            model: output.model,
            tokens_used: output.tokens_used,
        })))
    }

    /// Business validation: recipient, amount, freshness. Runs before the
    /// ledger call since it is cheaper and mutates nothing.
    fn assert_eligible(
        &self,
        claims: &ProofClaims,
        entry: &PriceEntry,
        now: UnixTimestamp,
    ) -> Result<(), PaymentError> {
        let expected = self.challenges.recipient_address();
        if !claims.recipient.eq_ignore_ascii_case(expected) {
            return Err(PaymentError::IncompatibleRecipient {
                proof: claims.recipient.clone(),
                expected: expected.to_string(),
            });
        }
        if claims.amount < entry.amount {
            return Err(PaymentError::InsufficientAmount {
                offered: claims.amount.to_string(),
                required: entry.amount.to_string(),
            });
        }
        let age_secs = claims.timestamp.age_from(now);
        let window_secs = self.validity_window.as_secs();
        if age_secs > window_secs {
            return Err(PaymentError::Expired {
                age_secs,
                window_secs,
            });
        }
        Ok(())
    }
}
