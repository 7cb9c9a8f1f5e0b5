//! # greedex-core
//!
//! **Greedy randomness extraction from arbitrary event streams.**
//!
//! `greedex-core` turns a stream of weakly random events — numbers, strings,
//! anything that can be counted — into unbiased output digits in any base,
//! without knowing the source distribution in advance. It learns the
//! distribution online from observed frequencies, narrows an exact-rational
//! arithmetic-coding interval with each event, and emits a digit the moment
//! the interval provably pins it down.
//!
//! ## Quick Start
//!
//! ```
//! use greedex_core::{Extractor, ExtractorConfig};
//!
//! let mut ex = Extractor::new(ExtractorConfig::default()).unwrap();
//!
//! // Seed the frequency estimate, then extract live.
//! ex.insert_all(["1", "2", "3"]).unwrap();
//! let digits = ex.observe("4").unwrap();
//! assert_eq!(digits, vec![1, 1]);
//! ```
//!
//! ## Architecture
//!
//! Events → Frequency store → Probability oracle → Interval coder → Digits
//!
//! Every component is exact-rational except the entropy accountant, which
//! uses floating point only for logarithms (rounded one ULP toward zero, so
//! accumulated information is never over-stated). The digits themselves are
//! decided purely by the interval, never by a float.
//!
//! Unparseable tokens trigger a one-way fallback from natural numeric
//! ordering to first-seen enumeration; counts and cumulative probabilities
//! survive the switch. Optional buffering ([`ExtractorConfig::rev_block`],
//! [`ExtractorConfig::rev_entropy`]) withholds output until the estimate has
//! warmed up, and the soft-reset policy ([`ExtractorConfig::rounding`])
//! bounds exact-fraction growth over long streams.

pub mod entropy;
pub mod error;
pub mod event;
pub mod extract;
pub mod extractor;
pub mod interval;
pub mod store;

pub use entropy::{average_next_entropy, entropy_of, justified_digits, theoretical_entropy};
pub use error::Error;
pub use event::{EventKey, NumericParser, StoreMode, StoreSnapshot, TokenParser};
pub use extract::determined_digits;
pub use extractor::{Extractor, ExtractorConfig, Phase};
pub use interval::Interval;
pub use store::FrequencyStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
