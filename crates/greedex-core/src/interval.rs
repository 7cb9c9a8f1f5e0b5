//! Exact-rational coding interval.

use num_rational::BigRational;
use num_traits::{One, Zero};

/// The `[left, left + length)` sub-interval of `[0, 1)` guaranteed to contain
/// the code point of every not-yet-excluded continuation of the observed
/// sequence.
///
/// All arithmetic is exact. Numerator/denominator magnitude grows without
/// bound over a long stream; the extractor's soft-reset policy caps that
/// growth at a bounded entropy loss.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    left: BigRational,
    length: BigRational,
}

impl Interval {
    /// The full unit interval `[0, 1)`.
    pub fn unit() -> Self {
        Self {
            left: BigRational::zero(),
            length: BigRational::one(),
        }
    }

    pub fn left(&self) -> &BigRational {
        &self.left
    }

    pub fn length(&self) -> &BigRational {
        &self.length
    }

    /// Exclusive right endpoint `left + length`.
    pub fn right(&self) -> BigRational {
        &self.left + &self.length
    }

    /// Arithmetic-coding narrowing step:
    /// `left += length·cumulative; length *= density`.
    ///
    /// A density of exactly 0 leaves the interval unchanged — a
    /// zero-probability query must not corrupt the code point. Probabilities
    /// outside `[0, 1]` are a programming-invariant violation, not a
    /// recoverable input error, and panic.
    pub fn narrow(&mut self, density: &BigRational, cumulative: &BigRational) {
        let zero = BigRational::zero();
        let one = BigRational::one();
        assert!(
            *density >= zero && *density <= one,
            "density {density} outside [0, 1]"
        );
        assert!(
            *cumulative >= zero && *cumulative <= one,
            "cumulative {cumulative} outside [0, 1]"
        );
        if density.is_zero() {
            return;
        }
        self.left += &self.length * cumulative;
        self.length = &self.length * density;

        assert!(self.left >= zero, "interval left drifted below 0");
        assert!(self.right() <= one, "interval escaped the unit range");
        assert!(self.length > zero, "interval collapsed to zero length");
    }
}
