//! Online frequency store and exact probability oracle.
//!
//! The store is a plain histogram over a totally ordered key type. The oracle
//! side derives exact rational event densities and cumulative-less-than
//! probabilities from the counts — no floating point is involved anywhere in
//! this module, because these values feed the coding interval directly and
//! any rounding here would leak a probability-dependent bias into the output.

use std::collections::BTreeMap;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;

/// Online histogram of observed events.
///
/// Counts are always positive; the running total is monotonically
/// non-decreasing except when the store is cleared by a full reset.
#[derive(Debug, Clone)]
pub struct FrequencyStore<K: Ord> {
    counts: BTreeMap<K, u64>,
    total: u64,
}

impl<K: Ord> Default for FrequencyStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord> FrequencyStore<K> {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    /// Record one occurrence of `key`.
    pub fn insert(&mut self, key: K) {
        self.add(key, 1);
    }

    /// Record `n` occurrences at once (snapshot reload, mode conversion).
    pub fn add(&mut self, key: K, n: u64) {
        if n == 0 {
            return;
        }
        *self.counts.entry(key).or_insert(0) += n;
        self.total += n;
    }

    /// Occurrences of `key` seen so far (0 for an unseen key).
    pub fn count(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Total number of recorded occurrences.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct keys.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Iterate keys in ascending order with their counts.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(k, &c)| (k, c))
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
    }

    /// Exact `(density, cumulative)` for `key`.
    ///
    /// `density` is `count/total`. `cumulative` is the probability mass of
    /// keys strictly less than `key` — ties excluded. An empty store yields
    /// `(0, 0)`; an unseen key yields density 0 with its cumulative computed
    /// against the existing keys.
    pub fn probs(&self, key: &K) -> (BigRational, BigRational) {
        if self.total == 0 {
            return (BigRational::zero(), BigRational::zero());
        }
        let total = BigInt::from(self.total);
        let below: u64 = self.counts.range(..key).map(|(_, &c)| c).sum();
        let density = BigRational::new(BigInt::from(self.count(key)), total.clone());
        let cumulative = BigRational::new(BigInt::from(below), total);
        (density, cumulative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(num: i64, den: i64) -> BigRational {
        BigRational::new(BigInt::from(num), BigInt::from(den))
    }

    #[test]
    fn test_empty_store_probs_are_zero() {
        let store: FrequencyStore<i64> = FrequencyStore::new();
        assert_eq!(store.probs(&7), (BigRational::zero(), BigRational::zero()));
    }

    #[test]
    fn test_three_uniques_exact_probs() {
        let mut store = FrequencyStore::new();
        for k in 0..3 {
            store.insert(k);
        }
        assert_eq!(store.probs(&0), (ratio(1, 3), ratio(0, 1)));
        assert_eq!(store.probs(&1), (ratio(1, 3), ratio(1, 3)));
        assert_eq!(store.probs(&2), (ratio(1, 3), ratio(2, 3)));
    }

    #[test]
    fn test_repeated_keys_weight_the_density() {
        let mut store = FrequencyStore::new();
        store.add(1, 4);
        store.insert(2);
        assert_eq!(store.probs(&2), (ratio(1, 5), ratio(4, 5)));
    }

    #[test]
    fn test_unseen_key_has_zero_density() {
        let mut store = FrequencyStore::new();
        for k in [1, 2, 3] {
            store.insert(k);
        }
        // Below every key.
        assert_eq!(store.probs(&0), (ratio(0, 1), ratio(0, 1)));
        // Above every key: cumulative is the whole mass.
        assert_eq!(store.probs(&5), (ratio(0, 1), ratio(1, 1)));
        // Ties are excluded from the cumulative.
        assert_eq!(store.probs(&2).1, ratio(1, 3));
    }

    #[test]
    fn test_totals_and_clear() {
        let mut store = FrequencyStore::new();
        assert_eq!(store.total(), 0);
        store.insert(9);
        store.insert(9);
        store.insert(4);
        assert_eq!(store.total(), 3);
        assert_eq!(store.distinct(), 2);
        assert_eq!(store.count(&9), 2);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.count(&9), 0);
    }

    #[test]
    fn test_iter_is_ordered() {
        let mut store = FrequencyStore::new();
        for k in [5, -2, 3] {
            store.insert(k);
        }
        let keys: Vec<i64> = store.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![-2, 3, 5]);
    }
}
