//! Crate error type.
//!
//! Only recoverable failures live here: configuration rejected at
//! construction and persistence I/O. Invariant violations (inverted interval,
//! probability outside `[0, 1]`, an unresolved digit search) would corrupt
//! the randomness guarantee of every future digit, so they panic instead of
//! returning — silent continuation must never be possible.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// Output base below 2.
    BaseTooSmall(u32),
    /// Rounding threshold above 1 (the valid range is `(0, 1]`; values
    /// `<= 0` disable soft resets).
    RoundingOutOfRange(f64),
    /// Negative entropy buffering threshold.
    NegativeEntropyThreshold(f64),
    /// Persistence I/O failure, surfaced at the save/load call site.
    Io(io::Error),
    /// Persisted store blob failed to (de)serialize.
    Persist(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BaseTooSmall(base) => write!(f, "base must be at least 2, got {base}"),
            Self::RoundingOutOfRange(r) => {
                write!(f, "rounding threshold must lie in (0, 1], got {r}")
            }
            Self::NegativeEntropyThreshold(e) => {
                write!(f, "entropy buffering threshold must be non-negative, got {e}")
            }
            Self::Io(e) => write!(f, "persistence i/o failed: {e}"),
            Self::Persist(e) => write!(f, "persisted store is unreadable: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Persist(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Persist(e)
    }
}
