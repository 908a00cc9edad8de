//! Pool registry
//!
//! Maps an asset pair to its pool. Pairs are keyed in sorted symbol order;
//! a pool requested with its assets reversed is created in canonical order
//! with decimals swapped and the initial price inverted.

use crate::error::{EngineError, Result};
use crate::pool::Pool;
use crate::types::Era;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tidal_config::PoolSettings;
use tracing::info;

/// Canonical (sorted) asset pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey(String, String);

impl PairKey {
    /// Order `a` and `b`; `true` when they had to be swapped
    pub fn new(a: &str, b: &str) -> Result<(Self, bool)> {
        if a == b {
            return Err(EngineError::IdenticalAssets(a.to_string()));
        }
        if a < b {
            Ok((PairKey(a.to_string(), b.to_string()), false))
        } else {
            Ok((PairKey(b.to_string(), a.to_string()), true))
        }
    }

    pub fn token0(&self) -> &str {
        &self.0
    }

    pub fn token1(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: BTreeMap<PairKey, Pool>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the pool for `settings.symbols`
    pub fn create(&mut self, settings: &PoolSettings) -> Result<&mut Pool> {
        settings.validate()?;
        let [a, b] = &settings.symbols;
        let (key, swapped) = PairKey::new(a, b)?;
        if self.pools.contains_key(&key) {
            return Err(EngineError::PoolExists(key.0, key.1));
        }

        let mut canonical = settings.clone();
        if swapped {
            canonical.symbols = [b.clone(), a.clone()];
            canonical.decimals = [settings.decimals[1], settings.decimals[0]];
            canonical.initial_price = Decimal::ONE / settings.initial_price;
        }
        let pool = Pool::new(&canonical)?;
        info!(token0 = key.token0(), token1 = key.token1(), swapped, "Pool registered");
        Ok(self.pools.entry(key).or_insert(pool))
    }

    pub fn get(&self, a: &str, b: &str) -> Result<&Pool> {
        let (key, _) = PairKey::new(a, b)?;
        match self.pools.get(&key) {
            Some(pool) => Ok(pool),
            None => Err(EngineError::UnknownPool(key.0, key.1)),
        }
    }

    pub fn get_mut(&mut self, a: &str, b: &str) -> Result<&mut Pool> {
        let (key, _) = PairKey::new(a, b)?;
        match self.pools.get_mut(&key) {
            Some(pool) => Ok(pool),
            None => Err(EngineError::UnknownPool(key.0, key.1)),
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &PairKey> {
        self.pools.keys()
    }

    /// Step every pool's clock; stops at the first failure
    pub fn advance_all(&mut self, eras: Era) -> Result<()> {
        for pool in self.pools.values_mut() {
            pool.advance(eras)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tidal_config::SettingsError;

    fn settings(a: &str, b: &str, price: Decimal) -> PoolSettings {
        PoolSettings {
            symbols: [a.to_string(), b.to_string()],
            decimals: [6, 18],
            initial_price: price,
            ..PoolSettings::default()
        }
    }

    #[test]
    fn test_reversed_pair_is_canonicalized() {
        let mut registry = PoolRegistry::new();
        registry.create(&settings("WETH", "USDC", dec!(0.5))).unwrap();
        let pool = registry.get("WETH", "USDC").unwrap();
        assert_eq!(pool.params().symbols, ["USDC".to_string(), "WETH".to_string()]);
        assert_eq!(pool.params().decimals, [18, 6]);
        let price = pool.price_info().price;
        assert!((price - dec!(2)).abs() < dec!(0.02));
    }

    #[test]
    fn test_duplicate_and_missing_pairs() {
        let mut registry = PoolRegistry::new();
        registry.create(&settings("A", "B", dec!(1))).unwrap();
        assert_eq!(
            registry.create(&settings("B", "A", dec!(1))).unwrap_err(),
            EngineError::PoolExists("A".to_string(), "B".to_string())
        );
        assert_eq!(
            registry.get("A", "C").unwrap_err(),
            EngineError::UnknownPool("A".to_string(), "C".to_string())
        );
        assert_eq!(
            registry.get("A", "A").unwrap_err(),
            EngineError::IdenticalAssets("A".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rejects_invalid_settings_before_registering() {
        let mut registry = PoolRegistry::new();
        let mut bad = settings("WETH", "USDC", dec!(0));
        assert!(matches!(
            registry.create(&bad),
            Err(EngineError::InvalidSettings(SettingsError::NotPositive { field: "initial_price", .. }))
        ));
        bad.initial_price = dec!(1);
        bad.decimals = [40, 6];
        assert!(matches!(
            registry.create(&bad),
            Err(EngineError::InvalidSettings(SettingsError::DecimalsTooLarge { token: 0, decimals: 40 }))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_advance_all_steps_every_pool() {
        let mut registry = PoolRegistry::new();
        registry.create(&settings("A", "B", dec!(1))).unwrap();
        registry.create(&settings("A", "C", dec!(1))).unwrap();
        registry.advance_all(100).unwrap();
        assert_eq!(registry.get("A", "B").unwrap().era(), 100);
        assert_eq!(registry.get_mut("C", "A").unwrap().era(), 100);
    }
}
