//! Static price table for the gateway's agents.
//!
//! Prices are fixed at boot and never change for the process lifetime. The
//! registry is the single authority on which resource identifiers exist:
//! the dispatcher fails fast on anything it does not list.

use serde::{Deserialize, Serialize};

use crate::util::MoneyAmount;

/// Settlement currency for all built-in agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USDC")]
    Usdc,
}

/// One priced resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEntry {
    pub resource: String,
    pub amount: MoneyAmount,
    pub currency: Currency,
}

/// Read-only mapping of resource identifiers to prices.
#[derive(Debug, Clone)]
pub struct PriceRegistry {
    entries: Vec<PriceEntry>,
}

impl PriceRegistry {
    pub fn new(entries: Vec<PriceEntry>) -> Self {
        Self { entries }
    }

    /// The price table of the eight built-in agents.
    pub fn builtin() -> Self {
        let table = [
            ("architect", "0.10"),
            ("code-gen", "0.08"),
            ("code-audit", "0.05"),
            ("logic", "0.06"),
            ("translate", "0.02"),
            ("long-text", "0.03"),
            ("crawl", "0.04"),
            ("vision", "0.15"),
        ];
        let entries = table
            .iter()
            .map(|(resource, amount)| PriceEntry {
                resource: resource.to_string(),
                amount: MoneyAmount::parse(amount).expect("valid builtin price"),
                currency: Currency::Usdc,
            })
            .collect();
        Self { entries }
    }

    pub fn price_of(&self, resource: &str) -> Option<&PriceEntry> {
        self.entries.iter().find(|e| e.resource == resource)
    }

    pub fn entries(&self) -> &[PriceEntry] {
        &self.entries
    }
}
