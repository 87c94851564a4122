//! Dictionary cache indexed by word length.
//!
//! The bank is an injected service: production wires it to the words table
//! through [`WordSource`], tests hand it a fixed list. Reload is a full
//! re-fetch-and-replace guarded by a TTL; there is no partial merge, so a
//! half-loaded cache can never be observed.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use fleche_store::words::{StoredWord, WordRepo};
use fleche_store::{Database, StoreError};

/// Word lengths kept in the cache.
const MIN_LEN: usize = 2;
const MAX_LEN: usize = 15;

/// Default cache lifetime before a reload.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// A dictionary word as used by grid generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordCandidate {
    /// Uppercase A-Z form placed into the grid.
    pub normalized: String,
    pub lemma: String,
    pub frequency: f64,
    pub clue: String,
    pub clue_full: String,
}

impl From<StoredWord> for WordCandidate {
    fn from(w: StoredWord) -> Self {
        Self {
            normalized: w.normalized,
            lemma: w.lemma,
            frequency: w.frequency,
            clue: w.clue,
            clue_full: w.clue_full,
        }
    }
}

/// Where the bank loads its words from. The source must already exclude
/// words without a definition (they are unusable as grid entries).
pub trait WordSource: Send + Sync {
    fn load(&self) -> Result<Vec<WordCandidate>, StoreError>;
}

/// Production source: the words table.
pub struct StoreWordSource {
    repo: WordRepo,
}

impl StoreWordSource {
    pub fn new(db: Database) -> Self {
        Self { repo: WordRepo::new(db) }
    }
}

impl WordSource for StoreWordSource {
    fn load(&self) -> Result<Vec<WordCandidate>, StoreError> {
        Ok(self.repo.all_with_best_clue()?.into_iter().map(Into::into).collect())
    }
}

struct CacheState {
    by_length: HashMap<usize, Vec<WordCandidate>>,
    loaded_at: Instant,
}

/// Length-indexed dictionary cache with a TTL.
pub struct WordBank {
    source: Box<dyn WordSource>,
    ttl: Duration,
    cache: RwLock<Option<CacheState>>,
}

impl WordBank {
    pub fn new(source: Box<dyn WordSource>) -> Self {
        Self::with_ttl(source, DEFAULT_TTL)
    }

    pub fn with_ttl(source: Box<dyn WordSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Force a full reload, replacing the cache wholesale.
    pub fn refresh(&self) -> Result<(), StoreError> {
        let words = self.source.load()?;
        let mut by_length: HashMap<usize, Vec<WordCandidate>> = HashMap::new();
        let mut kept = 0usize;
        for word in words {
            let len = word.normalized.len();
            if !(MIN_LEN..=MAX_LEN).contains(&len) {
                continue;
            }
            by_length.entry(len).or_default().push(word);
            kept += 1;
        }
        info!(words = kept, lengths = by_length.len(), "word cache loaded");
        *self.cache.write() = Some(CacheState {
            by_length,
            loaded_at: Instant::now(),
        });
        Ok(())
    }

    /// Load the cache if missing or expired.
    pub fn ensure_loaded(&self) -> Result<(), StoreError> {
        let fresh = self
            .cache
            .read()
            .as_ref()
            .is_some_and(|state| state.loaded_at.elapsed() < self.ttl);
        if fresh {
            return Ok(());
        }
        self.refresh()
    }

    /// Number of cached candidates at a given length.
    pub fn count_at(&self, length: usize) -> usize {
        self.cache
            .read()
            .as_ref()
            .and_then(|state| state.by_length.get(&length))
            .map_or(0, Vec::len)
    }

    /// Find a word of `length` matching the fixed letters in `constraints`
    /// (`None` = free position) and not in `exclude`. Candidates are
    /// shuffled with the caller's RNG, so a fixed seed yields a fixed pick
    /// for a fixed cache snapshot.
    pub fn find_candidate(
        &self,
        length: usize,
        constraints: &[Option<u8>],
        exclude: &HashSet<String>,
        rng: &mut StdRng,
    ) -> Option<WordCandidate> {
        debug_assert_eq!(constraints.len(), length);

        let cache = self.cache.read();
        let candidates = cache.as_ref()?.by_length.get(&length)?;

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.shuffle(rng);

        for idx in order {
            let word = &candidates[idx];
            if exclude.contains(&word.normalized) {
                continue;
            }
            let bytes = word.normalized.as_bytes();
            let compatible = constraints
                .iter()
                .enumerate()
                .all(|(i, c)| c.is_none_or(|letter| bytes[i] == letter));
            if compatible {
                debug!(word = %word.normalized, length, "candidate found");
                return Some(word.clone());
            }
        }
        None
    }
}
