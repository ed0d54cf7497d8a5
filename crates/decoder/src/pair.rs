//! Canonical pair resolution.
//!
//! A trading pair is ordered by quote priority: the higher-priority token is
//! the quote, the lower-priority token is the base (SOL is base against
//! USDC). Ties fall back to lexicographic mint ordering so any two mints
//! always resolve to the same `(base, quote)` pair regardless of argument
//! order.

use anyhow::{anyhow, Result};
use std::collections::HashMap;

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111111";

/// A normalised trading pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPair {
    pub base_symbol: String,
    pub base_mint: String,
    pub quote_symbol: String,
    pub quote_mint: String,
    /// True when the original `(a, b)` order had to be swapped.
    pub inverted: bool,
}

impl CanonicalPair {
    /// Pair symbol in `BASE/QUOTE` form, e.g. `SOL/USDC`.
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base_symbol, self.quote_symbol)
    }

    pub fn is_stablecoin_pair(&self) -> bool {
        const STABLES: [&str; 6] = ["USDC", "USDT", "BUSD", "DAI", "UST", "FRAX"];
        STABLES.contains(&self.base_symbol.as_str())
            && STABLES.contains(&self.quote_symbol.as_str())
    }
}

/// Token registry and priority map backing pair resolution. Both tables can
/// be extended at runtime, which tests use to register synthetic tokens.
#[derive(Debug, Clone)]
pub struct PairResolver {
    quote_priority: HashMap<String, i32>,
    known_tokens: HashMap<String, String>,
}

impl Default for PairResolver {
    fn default() -> Self {
        let quote_priority = HashMap::from([
            ("USDC".to_string(), 100),
            ("USDT".to_string(), 90),
            ("SOL".to_string(), 80),
            ("WSOL".to_string(), 75),
            ("ETH".to_string(), 70),
            ("WETH".to_string(), 65),
            ("BTC".to_string(), 60),
            ("WBTC".to_string(), 55),
        ]);
        let known_tokens = HashMap::from([
            (USDC_MINT.to_string(), "USDC".to_string()),
            (USDT_MINT.to_string(), "USDT".to_string()),
            (SOL_MINT.to_string(), "SOL".to_string()),
            (WSOL_MINT.to_string(), "WSOL".to_string()),
        ]);
        Self {
            quote_priority,
            known_tokens,
        }
    }
}

impl PairResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a mint -> symbol mapping.
    pub fn register_token(&mut self, mint: impl Into<String>, symbol: impl Into<String>) {
        self.known_tokens.insert(mint.into(), symbol.into());
    }

    /// Sets the quote priority for a symbol; higher values quote over lower.
    pub fn set_quote_priority(&mut self, symbol: impl Into<String>, priority: i32) {
        self.quote_priority.insert(symbol.into(), priority);
    }

    /// Resolves the canonical ordering of two mints. Invariant:
    /// `resolve(a, b)` and `resolve(b, a)` return the same pair.
    pub fn resolve(&self, mint_a: &str, mint_b: &str) -> Result<CanonicalPair> {
        if mint_a.is_empty() || mint_b.is_empty() {
            return Err(anyhow!("mint addresses cannot be empty"));
        }

        let symbol_a = self.token_symbol(mint_a);
        let symbol_b = self.token_symbol(mint_b);
        let priority_a = self.quote_priority(&symbol_a);
        let priority_b = self.quote_priority(&symbol_b);

        let a_is_base = match priority_b.cmp(&priority_a) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => mint_a < mint_b,
        };

        if a_is_base {
            Ok(CanonicalPair {
                base_symbol: symbol_a,
                base_mint: mint_a.to_string(),
                quote_symbol: symbol_b,
                quote_mint: mint_b.to_string(),
                inverted: false,
            })
        } else {
            Ok(CanonicalPair {
                base_symbol: symbol_b,
                base_mint: mint_b.to_string(),
                quote_symbol: symbol_a,
                quote_mint: mint_a.to_string(),
                inverted: true,
            })
        }
    }

    fn token_symbol(&self, mint: &str) -> String {
        if let Some(symbol) = self.known_tokens.get(mint) {
            return symbol.clone();
        }
        // Unknown tokens are identified by a mint prefix.
        if mint.len() > 8 {
            mint[..8].to_string()
        } else {
            mint.to_string()
        }
    }

    fn quote_priority(&self, symbol: &str) -> i32 {
        self.quote_priority.get(symbol).copied().unwrap_or(0)
    }
}
