//! Middleware for handling HTTP 402 Payment Required responses.
//!
//! [`X402Payments`] implements `reqwest_middleware::Middleware`: when a
//! request comes back 402, it decodes the challenge body, asks its
//! [`ProofSource`] for a proof, and retries the request once with the
//! `x-payment-proof` header attached. Exactly one retry per logical call,
//! never more — a second 402 is returned to the caller as-is.

use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;
use tracing::instrument;

use x402_gateway::challenge::PaymentRequired;
use x402_gateway::proof::PAYMENT_PROOF_HEADER;

use crate::wallet::{ProofSource, ProofSourceError};

/// Errors that can occur while constructing or applying a payment.
#[derive(Debug, thiserror::Error)]
pub enum PaymentsError {
    /// The 402 body was not a decodable challenge.
    #[error("Malformed payment challenge: {0}")]
    Protocol(String),
    /// The proof source could not produce a proof for the challenge.
    #[error("Failed to obtain payment proof")]
    Payment(#[source] ProofSourceError),
    /// The original request could not be cloned for retrying with a payment
    /// header. This typically happens when the body is a stream.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    /// The encoded proof could not be inserted into an HTTP header.
    #[error("Failed to encode payment proof into HTTP header")]
    HeaderValueEncode(#[source] http::header::InvalidHeaderValue),
}

impl From<PaymentsError> for rqm::Error {
    fn from(error: PaymentsError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Middleware that answers 402 challenges by attaching a payment proof and
/// retrying once.
#[derive(Clone)]
pub struct X402Payments {
    wallet: Arc<dyn ProofSource>,
}

impl X402Payments {
    pub fn with_wallet<W: ProofSource + 'static>(wallet: W) -> Self {
        Self {
            wallet: Arc::new(wallet),
        }
    }

    pub fn wallet(&self) -> &Arc<dyn ProofSource> {
        &self.wallet
    }

    /// Obtains a proof for the challenge and encodes it as a header value.
    #[instrument(name = "x402.build_proof_header", skip_all, fields(
        amount = %required.x402.amount,
        request_id = %required.request_id,
    ))]
    pub async fn build_proof_header(
        &self,
        required: &PaymentRequired,
    ) -> Result<HeaderValue, PaymentsError> {
        let proof = self
            .wallet
            .pay(&required.x402)
            .await
            .map_err(PaymentsError::Payment)?;
        HeaderValue::from_str(&proof.encode()).map_err(PaymentsError::HeaderValueEncode)
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for X402Payments {
    /// Intercepts the response. On a 402, constructs a payment proof and
    /// retries the request with it.
    #[instrument(name = "x402.handle", skip(self, req, extensions, next), fields(method = %req.method(), url = %req.url()))]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone(); // For retrying with payment later

        let res = next.clone().run(req, extensions).await?;
        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res); // No payment needed: passthrough
        }

        tracing::debug!("Received 402 Payment Required");
        let required = res
            .json::<PaymentRequired>()
            .await
            .map_err(|e| Into::<rqm::Error>::into(PaymentsError::Protocol(e.to_string())))?;

        let retry_req = async {
            let header = self.build_proof_header(&required).await?;
            let mut req = retry_req.ok_or(PaymentsError::RequestNotCloneable)?;
            req.headers_mut().insert(PAYMENT_PROOF_HEADER, header);
            Ok::<Request, PaymentsError>(req)
        }
        .await
        .map_err(Into::<rqm::Error>::into)?;
        next.run(retry_req, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::MockWallet;
    use reqwest_middleware::ClientBuilder;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn challenge_body() -> serde_json::Value {
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

    fn client_with_payments() -> reqwest_middleware::ClientWithMiddleware {
        ClientBuilder::new(reqwest::Client::new())
            .with(X402Payments::with_wallet(MockWallet::new(format!(
                "0x{}",
                "1".repeat(40)
            ))))
            .build()
    }

    #[tokio::test]
    async fn test_passthrough_without_402() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let res = client_with_payments()
            .post(format!("{}/api/v1/translate", server.uri()))
            .json(&json!({"text": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_retries_once_with_proof_header() {
        let server = MockServer::start().await;
        // Unpaid requests are challenged...
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .and(header_exists("x-payment-proof"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        // ...and the paid retry succeeds.
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
            .expect(1)
            .mount(&server)
            .await;

        let res = client_with_payments()
            .post(format!("{}/api/v1/translate", server.uri()))
            .json(&json!({"text": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_never_retries_twice() {
        let server = MockServer::start().await;
        // Server keeps answering 402 even to paid requests.
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
            .expect(2)
            .mount(&server)
            .await;

        let res = client_with_payments()
            .post(format!("{}/api/v1/translate", server.uri()))
            .json(&json!({"text": "hi"}))
            .send()
            .await
            .unwrap();
        // The second 402 is handed back, not chased.
        assert_eq!(res.status(), 402);
    }

    #[tokio::test]
    async fn test_malformed_challenge_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/translate"))
            .respond_with(ResponseTemplate::new(402).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_with_payments()
            .post(format!("{}/api/v1/translate", server.uri()))
            .json(&json!({"text": "hi"}))
            .send()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Malformed payment challenge"));
    }
}
