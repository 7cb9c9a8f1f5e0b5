//! Event keys, token parsing, and the tagged storage mode.
//!
//! Input tokens are converted to event values by a pluggable [`TokenParser`].
//! While every token parses, events are stored under their natural numeric
//! order. The first token that fails to parse triggers a one-way switch to
//! enumerated storage, where each distinct raw token is assigned a
//! monotonically increasing first-seen id used as a surrogate order. Ids are
//! stable for the store's lifetime and are never renumbered.

use std::collections::HashMap;
use std::fmt;

use num_rational::BigRational;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::entropy::theoretical_entropy;
use crate::store::FrequencyStore;

/// A stored event: either a naturally ordered numeric value or a surrogate
/// first-seen id for tokens without a usable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKey {
    Num(i64),
    Tag(u64),
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Tag(id) => write!(f, "#{id}"),
        }
    }
}

/// Converts an input token into an ordered numeric event.
pub trait TokenParser {
    /// `None` signals an unparseable token and triggers the one-way fallback
    /// to enumerated storage.
    fn parse(&self, token: &str) -> Option<i64>;
}

/// Default parser: signed decimal integers.
pub struct NumericParser;

impl TokenParser for NumericParser {
    fn parse(&self, token: &str) -> Option<i64> {
        token.trim().parse().ok()
    }
}

/// Storage representation for observed events: a tagged alternative, not a
/// silent runtime type swap.
///
/// The numeric→enumerated transition re-keys existing counts through a
/// defined conversion: numeric keys receive surrogate ids in ascending
/// numeric order, so every cumulative probability is preserved across the
/// switch.
pub enum StoreMode {
    Numeric(FrequencyStore<i64>),
    Enumerated {
        ids: HashMap<String, u64>,
        next_id: u64,
        store: FrequencyStore<u64>,
    },
}

impl Default for StoreMode {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreMode {
    pub fn new() -> Self {
        StoreMode::Numeric(FrequencyStore::new())
    }

    /// Resolve a raw token to its event key, switching to enumerated storage
    /// the first time parsing fails. On a switch, the conversion map from old
    /// numeric keys to new surrogate ids is returned so the caller can re-key
    /// anything it holds (e.g. the buffering backlog).
    pub fn resolve(
        &mut self,
        token: &str,
        parser: &dyn TokenParser,
    ) -> (EventKey, Option<HashMap<i64, u64>>) {
        if let StoreMode::Numeric(_) = self {
            if let Some(n) = parser.parse(token) {
                return (EventKey::Num(n), None);
            }
            let conversion = self.enumerate();
            let key = self.intern(token);
            return (key, Some(conversion));
        }
        (self.intern(token), None)
    }

    /// One-way switch to enumerated storage. Existing keys are assigned ids
    /// in ascending numeric order.
    fn enumerate(&mut self) -> HashMap<i64, u64> {
        let StoreMode::Numeric(old) = self else {
            return HashMap::new();
        };
        let mut ids = HashMap::new();
        let mut conversion = HashMap::new();
        let mut store = FrequencyStore::new();
        let mut next_id = 0u64;
        for (k, c) in old.iter() {
            ids.insert(k.to_string(), next_id);
            conversion.insert(*k, next_id);
            store.add(next_id, c);
            next_id += 1;
        }
        log::debug!("switching to enumerated storage, {next_id} key(s) re-keyed");
        *self = StoreMode::Enumerated {
            ids,
            next_id,
            store,
        };
        conversion
    }

    /// Id for a raw token in enumerated mode, assigning the next id on first
    /// sight. Must only be called after the switch.
    fn intern(&mut self, token: &str) -> EventKey {
        let StoreMode::Enumerated { ids, next_id, .. } = self else {
            unreachable!("intern called in numeric mode");
        };
        let id = *ids.entry(token.to_string()).or_insert_with(|| {
            let id = *next_id;
            *next_id += 1;
            id
        });
        EventKey::Tag(id)
    }

    /// Record one occurrence of `key`.
    pub fn insert(&mut self, key: &EventKey) {
        match (self, key) {
            (StoreMode::Numeric(store), EventKey::Num(n)) => store.insert(*n),
            (StoreMode::Enumerated { store, .. }, EventKey::Tag(id)) => store.insert(*id),
            _ => panic!("event key {key} does not match the storage mode"),
        }
    }

    /// Exact `(density, cumulative)` for a resolved key.
    pub fn probs(&self, key: &EventKey) -> (BigRational, BigRational) {
        match (self, key) {
            (StoreMode::Numeric(store), EventKey::Num(n)) => store.probs(n),
            (StoreMode::Enumerated { store, .. }, EventKey::Tag(id)) => store.probs(id),
            _ => panic!("event key {key} does not match the storage mode"),
        }
    }

    /// Probability estimate for a raw token without recording it and without
    /// assigning an id. An unseen token reports density 0 with its cumulative
    /// computed against the existing keys (in enumerated mode an unseen token
    /// would sort after every assigned id).
    pub fn peek_probs(&self, token: &str, parser: &dyn TokenParser) -> (BigRational, BigRational) {
        match self {
            StoreMode::Numeric(store) => match parser.parse(token) {
                Some(n) => store.probs(&n),
                // An unparseable token has no position yet; it would be
                // assigned the largest surrogate id, after every key.
                None if store.is_empty() => (BigRational::zero(), BigRational::zero()),
                None => (BigRational::zero(), BigRational::one()),
            },
            StoreMode::Enumerated { ids, next_id, store } => {
                let id = ids.get(token).copied().unwrap_or(*next_id);
                store.probs(&id)
            }
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            StoreMode::Numeric(store) => store.total(),
            StoreMode::Enumerated { store, .. } => store.total(),
        }
    }

    pub fn distinct(&self) -> usize {
        match self {
            StoreMode::Numeric(store) => store.distinct(),
            StoreMode::Enumerated { store, .. } => store.distinct(),
        }
    }

    /// Total self-information of every observation so far, in base-`base`
    /// digits.
    pub fn theoretical_entropy(&self, base: u32) -> f64 {
        match self {
            StoreMode::Numeric(store) => theoretical_entropy(store, base),
            StoreMode::Enumerated { store, .. } => theoretical_entropy(store, base),
        }
    }

    /// Serializable snapshot of the store — the only persisted state.
    pub fn snapshot(&self) -> StoreSnapshot {
        match self {
            StoreMode::Numeric(store) => StoreSnapshot::Numeric {
                counts: store.iter().map(|(k, c)| (*k, c)).collect(),
            },
            StoreMode::Enumerated {
                ids,
                next_id,
                store,
            } => {
                let mut id_list: Vec<(String, u64)> =
                    ids.iter().map(|(t, id)| (t.clone(), *id)).collect();
                id_list.sort_by_key(|(_, id)| *id);
                StoreSnapshot::Enumerated {
                    ids: id_list,
                    next_id: *next_id,
                    counts: store.iter().map(|(k, c)| (*k, c)).collect(),
                }
            }
        }
    }

    /// Rebuild a store from a persisted snapshot. Subsequent probability
    /// estimates are identical to a store that observed the same insertion
    /// history, id assignments included.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        match snapshot {
            StoreSnapshot::Numeric { counts } => {
                let mut store = FrequencyStore::new();
                for (k, c) in counts {
                    store.add(k, c);
                }
                StoreMode::Numeric(store)
            }
            StoreSnapshot::Enumerated {
                ids,
                next_id,
                counts,
            } => {
                let mut store = FrequencyStore::new();
                for (k, c) in counts {
                    store.add(k, c);
                }
                StoreMode::Enumerated {
                    ids: ids.into_iter().collect(),
                    next_id,
                    store,
                }
            }
        }
    }
}

/// Persisted form of the frequency store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StoreSnapshot {
    Numeric {
        counts: Vec<(i64, u64)>,
    },
    Enumerated {
        ids: Vec<(String, u64)>,
        next_id: u64,
        counts: Vec<(u64, u64)>,
    },
}
