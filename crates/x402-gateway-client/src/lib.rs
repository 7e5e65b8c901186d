//! Client for payment-gated agent APIs speaking the HTTP 402 flow.
//!
//! Two ways in:
//!
//! - [`X402Payments`] — a `reqwest-middleware` middleware that intercepts
//!   `402 Payment Required` responses, obtains a proof from a
//!   [`ProofSource`], attaches the `x-payment-proof` header, and retries the
//!   request exactly once.
//! - [`GatewayClient`] — a small facade with explicit
//!   [`call_with_payment`](GatewayClient::call_with_payment), `stats` and
//!   `health` calls, for callers who want the two-step dance spelled out.
//!
//! Obtaining an actual on-chain payment is out of scope; [`ProofSource`] is
//! the seam where a real wallet plugs in. [`MockWallet`] fabricates proofs
//! for development and tests.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use x402_gateway_client::{GatewayClient, MockWallet};
//! use serde_json::json;
//!
//! let client = GatewayClient::new(
//!     "http://localhost:5002".parse().unwrap(),
//!     MockWallet::new("0x1111111111111111111111111111111111111111"),
//! );
//! let served = client
//!     .call_with_payment("translate", &json!({"text": "hello"}))
//!     .await?;
//! println!("{}", served.result);
//! ```

mod client;
mod middleware;
mod wallet;

pub use client::*;
pub use middleware::*;
pub use wallet::*;
