//! Entropy accounting: self-information sums and emission gating.
//!
//! This is the only module where floating point is allowed, and only inside
//! the logarithms. Logs are rounded one ULP toward zero so the accountant can
//! under-estimate accumulated information but never over-estimate it — the
//! digits themselves are decided by the exact-rational extractor, never by a
//! float.

use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

use crate::store::FrequencyStore;

/// Self-information of an event with probability `p`, in base-`base` digits:
/// `-log_base(p)` for `p > 0`, else 0.
pub fn entropy_of(p: &BigRational, base: u32) -> f64 {
    if p.is_zero() {
        return 0.0;
    }
    let p = p.to_f64().unwrap_or(0.0);
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    round_down(-(p.ln() / f64::from(base).ln()))
}

/// Total self-information of every observation in the store, in base-`base`
/// digits: `Σ -c·log_base(c/total)`.
///
/// This is `total ×` the empirical Shannon entropy. Zero for an empty store
/// and for a store holding a single distinct key.
pub fn theoretical_entropy<K: Ord>(store: &FrequencyStore<K>, base: u32) -> f64 {
    let total = store.total();
    if total == 0 {
        return 0.0;
    }
    let ln_base = f64::from(base).ln();
    let ln_total = (total as f64).ln();
    store
        .iter()
        .map(|(_, c)| {
            let c = c as f64;
            c * (ln_total - c.ln()) / ln_base
        })
        .sum()
}

/// Expected self-information of the next event under the current estimate —
/// the empirical Shannon entropy of one draw.
pub fn average_next_entropy<K: Ord>(store: &FrequencyStore<K>, base: u32) -> f64 {
    let total = store.total();
    if total == 0 {
        0.0
    } else {
        theoretical_entropy(store, base) / total as f64
    }
}

/// Digits newly justified by a step that adds `info` to an accumulator
/// currently at `before`: output is released only when the running total
/// crosses an integer boundary, so over-extraction is bounded by the
/// sub-integer remainder carried in `accumulator − output_digits`.
pub fn justified_digits(before: f64, info: f64) -> u64 {
    let crossed = (before + info).floor() - before.floor();
    if crossed > 0.0 { crossed as u64 } else { 0 }
}

/// One ULP toward zero: floor-safe rounding for the logarithm.
fn round_down(x: f64) -> f64 {
    if x > 0.0 && x.is_finite() {
        f64::from_bits(x.to_bits() - 1)
    } else {
        x
    }
}
