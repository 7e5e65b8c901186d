//! Utility types shared across the gateway.
//!
//! - [`money_amount`] - Human-readable currency amount parsing
//! - [`sig_down`] - Graceful shutdown signal handling
//! - [`telemetry`] - Tracing subscriber setup

pub mod money_amount;
pub mod sig_down;
pub mod telemetry;

pub use money_amount::*;
pub use sig_down::*;
pub use telemetry::*;
