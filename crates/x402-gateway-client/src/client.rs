//! Explicit client facade over the 402 flow.
//!
//! Where [`X402Payments`](crate::middleware::X402Payments) hides the dance
//! inside a middleware, [`GatewayClient`] spells it out: send unpaid, read
//! the challenge, pay, resend once. Use it when the call sites want the
//! structured error taxonomy rather than a generic middleware error.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

use x402_gateway::challenge::PaymentRequired;
use x402_gateway::gateway::ServedResponse;
use x402_gateway::pricing::PriceEntry;
use x402_gateway::proof::PAYMENT_PROOF_HEADER;
use x402_gateway::stats::UsageStats;

use crate::wallet::{ProofSource, ProofSourceError};

/// Structured failure taxonomy for one logical call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server's challenge or response body was not decodable.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The proof source could not produce a proof.
    #[error("Payment failed: {0}")]
    Payment(#[from] ProofSourceError),
    /// The server refused the request (including a proof rejected on retry).
    #[error("Request refused with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    /// Transport failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// `GET /api/v1/stats` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: UsageStats,
    pub prices: Vec<PriceEntry>,
}

/// Client for one gateway instance.
pub struct GatewayClient {
    base_url: Url,
    http: reqwest::Client,
    wallet: Arc<dyn ProofSource>,
}

impl GatewayClient {
    pub fn new<W: ProofSource + 'static>(mut base_url: Url, wallet: W) -> Self {
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self {
            base_url,
            http: reqwest::Client::new(),
            wallet: Arc::new(wallet),
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        self.base_url
            .join(path)
            .expect("base url accepts relative path")
    }

    /// Performs the full two-step flow against a priced agent: request
    /// without proof, satisfy the challenge, resend with the proof header.
    /// Exactly one retry per logical call, never more.
    #[instrument(skip(self, payload), fields(resource = resource))]
    pub async fn call_with_payment(
        &self,
        resource: &str,
        payload: &Value,
    ) -> Result<ServedResponse, ClientError> {
        let url = self.endpoint(&format!("api/v1/{resource}"));

        let first = self.http.post(url.clone()).json(payload).send().await?;
        if first.status() != StatusCode::PAYMENT_REQUIRED {
            return Self::parse_served(first).await;
        }

        let required = first
            .json::<PaymentRequired>()
            .await
            .map_err(|e| ClientError::Protocol(format!("undecodable challenge: {e}")))?;
        tracing::debug!(
            amount = %required.x402.amount,
            request_id = %required.request_id,
            "Received payment challenge"
        );

        let proof = self.wallet.pay(&required.x402).await?;
        let second = self
            .http
            .post(url)
            .header(PAYMENT_PROOF_HEADER, proof.encode())
            .json(payload)
            .send()
            .await?;
        Self::parse_served(second).await
    }

    async fn parse_served(response: reqwest::Response) -> Result<ServedResponse, ClientError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<ServedResponse>()
                .await
                .map_err(|e| ClientError::Protocol(format!("undecodable response: {e}")));
        }
        let detail = response.text().await.unwrap_or_default();
        Err(ClientError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }

    /// `GET /api/v1/stats`.
    pub async fn stats(&self) -> Result<StatsResponse, ClientError> {
        let response = self.http.get(self.endpoint("api/v1/stats")).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Rejected {
                status: response.status().as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json::<StatsResponse>()
            .await
            .map_err(|e| ClientError::Protocol(format!("undecodable stats: {e}")))
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<Value, ClientError> {
        let response = self.http.get(self.endpoint("health")).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Rejected {
                status: response.status().as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Protocol(format!("undecodable health body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::MockWallet;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn challenge_body() -> Value {
        json!({
            "x402": {
                "amount": "0.02",
                "currency": "USDC",
                "recipient_address": format!("0x{}", "2".repeat(40)),
                "network": "base",
                "asset_contract": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                "request_id": "aabbccddeeff0011",
                "issued_at": "1700000000"
            },
            "request_id": "aabbccddeeff0011",
            "timestamp": "1700000000"
        })
    }

    fn served_body() -> Value {
        json!({
            "success": true,
            "result": "Bonjour",
            "agent": "translate",
            "cost": 0.02,
            "payment": {"tx_hash": format!("0x{}", "a".repeat(64)), "amount": 0.02},
            "model": "glm-4.7",
            "tokens_used": 12
        })
    }

    fn client(server: &MockServer) -> GatewayClient {
        GatewayClient::new(
            Url::parse(&server.uri()).unwrap(),
            MockWallet::new(format!("0x{}", "1".repeat(40))),
        )
    }

    #[tokio::test]
    async fn test_call_with_payment_pays_and_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .and(header_exists(PAYMENT_PROOF_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(served_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
            .expect(1)
            .mount(&server)
            .await;

        let served = client(&server)
            .call_with_payment("translate", &json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(served.result, "Bonjour");
        assert_eq!(served.agent, "translate");
    }

    #[tokio::test]
    async fn test_rejection_after_retry_is_not_chased() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server)
            .call_with_payment("translate", &json!({"text": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 402, .. }));
    }

    #[tokio::test]
    async fn test_malformed_challenge_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .respond_with(ResponseTemplate::new(402).set_body_string("not a challenge"))
            .mount(&server)
            .await;

        let err = client(&server)
            .call_with_payment("translate", &json!({"text": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_stats_deserializes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "stats": {
                    "total_earnings": 0.02,
                    "today_earnings": 0.02,
                    "total_transactions": 1,
                    "today_transactions": 1
                },
                "prices": [
                    {"resource": "translate", "amount": "0.02", "currency": "USDC"}
                ]
            })))
            .mount(&server)
            .await;

        let stats = client(&server).stats().await.unwrap();
        assert!(stats.success);
        assert_eq!(stats.stats.total_transactions, 1);
        assert_eq!(stats.prices.len(), 1);
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "version": "0.3.1"})),
            )
            .mount(&server)
            .await;

        let health = client(&server).health().await.unwrap();
        assert_eq!(health["status"], "ok");
    }
}
