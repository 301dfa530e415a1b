//! Symbol identifiers, safe-key normalization, and the active view.
//!
//! Trading pairs arrive from the backend as slash-separated identifiers
//! ("BTC/USDC"). Registries and chart targets need a flat key, so the slash
//! is replaced with an underscore. Normalization must be deterministic and
//! collision-free for the symbol set in use; [`KeyRegistry`] enforces the
//! collision-freedom invariant instead of assuming it.

use crate::error::{SyncError, SyncResult};
use std::collections::HashMap;

/// Normalize a symbol to a flat key usable as a registry/chart target id.
///
/// "BTC/USDC" becomes "BTC_USDC". Deterministic; collision detection is the
/// job of [`KeyRegistry`].
pub fn safe_key(symbol: &str) -> String {
    symbol.replace('/', "_")
}

/// Guards the invariant that no two distinct symbols share a safe key.
///
/// The naive normalization collides for e.g. "BTC/USDC" and "BTC_USDC".
/// Registering the second of such a pair is an error, not a silent overwrite.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    /// safe key -> owning symbol
    owners: HashMap<String, String>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol, returning its safe key.
    ///
    /// Re-registering the same symbol is a no-op. Registering a different
    /// symbol that normalizes to an already-owned key fails with
    /// [`SyncError::KeyCollision`].
    pub fn register(&mut self, symbol: &str) -> SyncResult<String> {
        let key = safe_key(symbol);
        match self.owners.get(&key) {
            Some(owner) if owner == symbol => Ok(key),
            Some(owner) => Err(SyncError::KeyCollision {
                a: owner.clone(),
                b: symbol.to_string(),
                key,
            }),
            None => {
                self.owners.insert(key.clone(), symbol.to_string());
                Ok(key)
            }
        }
    }

    /// Release a symbol's key, if registered.
    pub fn remove(&mut self, symbol: &str) {
        let key = safe_key(symbol);
        if self.owners.get(&key).is_some_and(|owner| owner == symbol) {
            self.owners.remove(&key);
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.owners
            .get(&safe_key(symbol))
            .is_some_and(|owner| owner == symbol)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// The currently active view. Exactly one is active at a time; it determines
/// which poll target fires on each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// Aggregate dashboard: status, donuts, balance history, order listing.
    Home,
    /// Configuration editor. Never polled.
    Config,
    /// Wallet listing.
    Wallet,
    /// A single trading pair's detail view.
    Pair(String),
}

impl ViewState {
    /// Views exempt from tab reconciliation (everything but pair tabs).
    pub fn is_builtin(&self) -> bool {
        !matches!(self, ViewState::Pair(_))
    }
}

impl std::fmt::Display for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewState::Home => write!(f, "home"),
            ViewState::Config => write!(f, "config"),
            ViewState::Wallet => write!(f, "wallet"),
            ViewState::Pair(symbol) => write!(f, "{}", symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_key_replaces_separator() {
        assert_eq!(safe_key("BTC/USDC"), "BTC_USDC");
        assert_eq!(safe_key("PLAIN"), "PLAIN");
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut keys = KeyRegistry::new();
        assert_eq!(keys.register("BTC/USDC").unwrap(), "BTC_USDC");
        assert_eq!(keys.register("BTC/USDC").unwrap(), "BTC_USDC");
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_collision_is_detected() {
        let mut keys = KeyRegistry::new();
        keys.register("BTC/USDC").unwrap();
        let err = keys.register("BTC_USDC").unwrap_err();
        assert!(matches!(err, SyncError::KeyCollision { .. }));
    }

    #[test]
    fn test_remove_releases_key() {
        let mut keys = KeyRegistry::new();
        keys.register("BTC/USDC").unwrap();
        keys.remove("BTC/USDC");
        assert!(!keys.contains("BTC/USDC"));
        // Key is free again for the other spelling.
        keys.register("BTC_USDC").unwrap();
    }

    #[test]
    fn test_remove_ignores_non_owner() {
        let mut keys = KeyRegistry::new();
        keys.register("BTC/USDC").unwrap();
        keys.remove("BTC_USDC");
        assert!(keys.contains("BTC/USDC"));
    }
}
