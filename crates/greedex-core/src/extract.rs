//! Digit extraction: the base-N digit prefix provably pinned by the coding
//! interval.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::interval::Interval;

/// Every output digit determined by `interval`, from the most significant
/// down.
///
/// Descends over windows of width `base^-k`, scanning the candidate digit
/// windows of each level left to right:
///
/// - the interval sits strictly inside a candidate → that digit is fixed;
///   descend into it;
/// - the interval straddles a candidate's right edge without being fully
///   right-bounded → the next digit is not yet justified; return what was
///   collected;
/// - a candidate lies fully inside the interval → append its digit and
///   advance a level.
///
/// The prefix is recomputed from scratch on every step; the extractor emits
/// only the suffix beyond its already-emitted digit count, so digits are
/// never revised or duplicated. Exhausting a whole level without resolving
/// one of the three cases means the interval invariant is broken, which is
/// fatal.
pub fn determined_digits(interval: &Interval, base: u32) -> Vec<u32> {
    assert!(base >= 2, "base must be at least 2");
    let i_left = interval.left();
    let i_right = interval.right();
    let big_base = BigRational::from_integer(BigInt::from(base));

    let mut digits = Vec::new();
    let mut width = BigRational::one();
    let mut w_left = BigRational::zero();

    'descend: loop {
        width = &width / &big_base;
        let mut w_left_d = w_left.clone();
        for d in 0..base {
            let w_right = &w_left_d + &width;
            if *i_left >= w_right {
                // Interval lies entirely right of this candidate.
                w_left_d = w_right;
                continue;
            }
            if w_left_d <= *i_left && i_right <= w_right && *interval.length() < width {
                // Interval strictly inside the candidate: the digit is fixed.
                digits.push(d);
                w_left = w_left_d;
                continue 'descend;
            }
            if i_right > w_right {
                // Straddles the candidate's right edge: undetermined.
                return digits;
            }
            if w_left_d <= *i_left && i_right <= w_right {
                // Candidate window covered exactly by the interval.
                digits.push(d);
                w_left = w_left_d;
                continue 'descend;
            }
            w_left_d = w_right;
        }
        panic!(
            "digit search exhausted base {base} at depth {}: interval invariant broken",
            digits.len() + 1
        );
    }
}
