//! Payment-gated agent API over HTTP 402 flows.
//!
//! This crate serves priced text-generation agents behind a
//! `402 Payment Required` challenge. A caller without a payment proof gets
//! a challenge describing the price; a caller presenting a proof in the
//! `x-payment-proof` header gets it verified exactly once — the proof's
//! transaction hash is consumed in an append-only ledger, so replays are
//! rejected for the lifetime of the store — and the requested agent is
//! dispatched under a hard deadline.
//!
//! The proof is a structural claim, not an on-chain fact: this gateway
//! checks its shape, recipient, amount, freshness, and uniqueness, never
//! the blockchain itself.
//!
//! # Modules
//!
//! - [`agents`] — Agent handlers, the dispatch registry, and the downstream
//!   completions client.
//! - [`challenge`] — 402 challenge construction and the `PaymentRequired`
//!   response body.
//! - [`config`] — Server configuration with env-var resolution.
//! - [`gateway`] — The dispatcher state machine tying everything together.
//! - [`handlers`] — Axum HTTP endpoints (`/health`, `/api/v1/stats`,
//!   `/api/v1/{agent}`).
//! - [`ledger`] — Append-only, replay-protecting payment ledger.
//! - [`pricing`] — The static price table.
//! - [`proof`] — Payment-proof wire codec and structural validation.
//! - [`stats`] — Usage summaries folded from the ledger.
//! - [`timestamp`] — Unix timestamp type for validity windows.
//! - [`util`] — Money amounts, shutdown signals, tracing setup.

pub mod agents;
pub mod challenge;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod ledger;
pub mod pricing;
pub mod proof;
pub mod stats;
pub mod timestamp;
pub mod util;
