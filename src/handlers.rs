//! HTTP endpoints of the gateway.
//!
//! Thin axum handlers over [`Gateway`](crate::gateway::Gateway): extract the
//! proof header and payload, run the dispatcher, and map each
//! [`PaymentError`] variant to a status. Payment-side rejections answer 402
//! with a fresh challenge plus the rejection reason, so a client can tell
//! "pay (again)" apart from "your payment was spent but execution failed"
//! (5xx).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

use crate::agents::HandlerError;
use crate::gateway::{Disposition, Gateway, PaymentError};
use crate::proof::PAYMENT_PROOF_HEADER;

/// All routes served by the gateway.
pub fn routes() -> Router<Arc<Gateway>> {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/v1/stats", get(get_stats))
        .route("/api/v1/{agent}", post(post_agent))
}

/// `GET /health`: liveness and build identity.
#[instrument(skip_all)]
async fn get_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /api/v1/stats`: usage summary plus the price table.
#[instrument(skip_all)]
async fn get_stats(State(gateway): State<Arc<Gateway>>) -> Response {
    match gateway.usage_stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "stats": stats,
                "prices": gateway.price_entries(),
            })),
        )
            .into_response(),
        Err(error) => {
            tracing::error!(error = ?error, "Failed to read ledger for stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Ledger unavailable"})),
            )
                .into_response()
        }
    }
}

/// `POST /api/v1/{agent}`: the paid entry point.
///
/// Without an `x-payment-proof` header this responds 402 with a challenge;
/// with one, the proof is verified exactly once and the agent dispatched.
#[instrument(skip_all, fields(agent = %agent))]
async fn post_agent(
    State(gateway): State<Arc<Gateway>>,
    Path(agent): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // A missing or malformed body is an empty payload, not an error; each
    // handler defaults its own fields.
    let payload: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
    let proof_header = headers
        .get(PAYMENT_PROOF_HEADER)
        .and_then(|value| value.to_str().ok());

    match gateway.serve(&agent, proof_header, &payload).await {
        Ok(Disposition::PaymentRequired(required)) => {
            (StatusCode::PAYMENT_REQUIRED, Json(*required)).into_response()
        }
        Ok(Disposition::Served(served)) => (StatusCode::OK, Json(*served)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, agent = %agent, "Request rejected");
            payment_error_response(&gateway, &agent, error)
        }
    }
}

fn payment_error_response(gateway: &Gateway, agent: &str, error: PaymentError) -> Response {
    match &error {
        PaymentError::UnknownResource(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": error.to_string()})),
        )
            .into_response(),
        PaymentError::Decode(_)
        | PaymentError::Structure(_)
        | PaymentError::IncompatibleRecipient { .. }
        | PaymentError::InsufficientAmount { .. }
        | PaymentError::Expired { .. }
        | PaymentError::Replay(_) => rejection_with_challenge(gateway, agent, &error),
        PaymentError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Payment ledger unavailable"})),
        )
            .into_response(),
        PaymentError::Handler(HandlerError::Timeout(_)) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({"success": false, "error": error.to_string()})),
        )
            .into_response(),
        PaymentError::Handler(HandlerError::Upstream(_)) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"success": false, "error": error.to_string()})),
        )
            .into_response(),
    }
}

/// 402 for a refused proof: the rejection reason plus a fresh challenge the
/// caller can satisfy instead.
fn rejection_with_challenge(gateway: &Gateway, agent: &str, error: &PaymentError) -> Response {
    let body = match gateway
        .price_entries()
        .iter()
        .find(|entry| entry.resource == agent)
    {
        Some(entry) => {
            let required = gateway.challenge_for(entry, Some(error.to_string()));
            json!(required)
        }
        None => json!({"error": error.to_string()}),
    };
    (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentRegistry, CompletionsClient};
    use crate::challenge::ChallengeGenerator;
    use crate::ledger::MemoryLedger;
    use crate::pricing::PriceRegistry;
    use crate::proof::PaymentProof;
    use crate::timestamp::UnixTimestamp;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECEIVING: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0beb1";

    fn app(upstream_uri: &str) -> Router {
        let upstream = CompletionsClient::new(
            Url::parse(&format!("{upstream_uri}/v1")).unwrap(),
            "test-key".to_string(),
        );
        let gateway = Gateway::new(
            Arc::new(MemoryLedger::new()),
            PriceRegistry::builtin(),
            AgentRegistry::builtin(upstream, Duration::from_secs(5)),
            ChallengeGenerator::new(
                RECEIVING.to_string(),
                "base".to_string(),
                "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
            ),
            Duration::from_secs(300),
        );
        routes().with_state(Arc::new(gateway))
    }

    async fn mount_completion(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Bonjour"}}],
                "usage": {"total_tokens": 12}
            })))
            .mount(server)
            .await;
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, proof: Option<&str>, payload: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(proof) = proof {
            builder = builder.header(PAYMENT_PROOF_HEADER, proof);
        }
        builder.body(Body::from(payload.to_string())).unwrap()
    }

    fn translate_proof(timestamp: u64) -> String {
        PaymentProof {
            tx_hash: format!("0x{}", "a".repeat(64)),
            amount: "0.02".to_string(),
            sender: format!("0x{}", "1".repeat(40)),
            recipient: RECEIVING.to_string(),
            timestamp: timestamp.to_string(),
        }
        .encode()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app("http://localhost:9");
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_agent_is_404() {
        let app = app("http://localhost:9");
        let response = app
            .oneshot(post("/api/v1/fortune-teller", None, &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_challenge_then_payment_then_replay_then_stats() {
        let server = MockServer::start().await;
        mount_completion(&server).await;
        let app = app(&server.uri());

        // Unpaid request: challenged with the listed price.
        let response = app
            .clone()
            .oneshot(post("/api/v1/translate", None, &json!({"text": "hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let challenge = body_json(response).await;
        assert_eq!(challenge["x402"]["amount"], "0.02");
        assert_eq!(challenge["x402"]["currency"], "USDC");
        assert_eq!(challenge["x402"]["network"], "base");
        assert_eq!(challenge["request_id"].as_str().unwrap().len(), 16);

        // Paid request: served, cost as a JSON number.
        let wire = translate_proof(UnixTimestamp::now().as_secs());
        let response = app
            .clone()
            .oneshot(post(
                "/api/v1/translate",
                Some(&wire),
                &json!({"text": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let served = body_json(response).await;
        assert_eq!(served["success"], true);
        assert_eq!(served["cost"], 0.02);
        assert_eq!(served["agent"], "translate");
        assert_eq!(served["result"], "Bonjour");
        assert_eq!(served["payment"]["tx_hash"], format!("0x{}", "a".repeat(64)));
        assert_eq!(served["tokens_used"], 12);

        // Exact same header again: replay, rejected with a reason.
        let response = app
            .clone()
            .oneshot(post(
                "/api/v1/translate",
                Some(&wire),
                &json!({"text": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let rejected = body_json(response).await;
        assert!(rejected["error"].as_str().unwrap().contains("already used"));

        // Stats reflect the single consumed payment.
        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stats = body_json(response).await;
        assert_eq!(stats["stats"]["total_transactions"], 1);
        assert_eq!(stats["stats"]["total_earnings"], 0.02);
        assert!(stats["prices"].as_array().unwrap().len() == 8);
    }

    #[tokio::test]
    async fn test_stale_proof_rejected_even_with_fresh_hash() {
        let server = MockServer::start().await;
        mount_completion(&server).await;
        let app = app(&server.uri());

        let wire = translate_proof(UnixTimestamp::now().as_secs() - 600);
        let response = app
            .oneshot(post(
                "/api/v1/translate",
                Some(&wire),
                &json!({"text": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let rejected = body_json(response).await;
        assert!(rejected["error"].as_str().unwrap().contains("validity window"));
        // Rejection still carries a fresh challenge to satisfy.
        assert_eq!(rejected["x402"]["amount"], "0.02");
    }

    #[tokio::test]
    async fn test_garbage_proof_rejected_without_ledger_mutation() {
        let app = app("http://localhost:9");
        let response = app
            .clone()
            .oneshot(post("/api/v1/translate", Some("!!!"), &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let response = app
            .oneshot(Request::get("/api/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stats = body_json(response).await;
        assert_eq!(stats["stats"]["total_transactions"], 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_maps_to_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let app = app(&server.uri());

        let wire = translate_proof(UnixTimestamp::now().as_secs());
        let response = app
            .oneshot(post(
                "/api/v1/translate",
                Some(&wire),
                &json!({"text": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }
}
