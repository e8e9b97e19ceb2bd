//! Token to prime mapping shared by every indexing and query path.
//!
//! Lookups share a read lock. Assigning new primes goes through the single
//! upgradable-read slot of the lock, so at most one writer advances the prime
//! cursor at a time while plain readers keep running until the upgrade.

use crate::error::{Error, Result};
use crate::Prime;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Cursor value before any token is assigned. The first token receives 3.
pub const INITIAL_PRIME_CURSOR: Prime = 2;

/// Smallest prime strictly greater than `n`.
pub fn next_prime_after(n: Prime) -> Result<Prime> {
    n.checked_add(1)
        .and_then(|start| (start..=Prime::MAX).find(|&c| primal::is_prime(c)))
        .ok_or(Error::VocabularyExhausted { last_prime: n })
}

/// Persisted form: `{token, prime}` pairs plus the assignment cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularySnapshot {
    pub entries: Vec<(String, Prime)>,
    pub last_prime: Prime,
}

#[derive(Debug)]
struct Tables {
    token_to_prime: HashMap<String, Prime>,
    prime_to_token: HashMap<Prime, String>,
    last_prime: Prime,
}

impl Tables {
    fn empty() -> Self {
        Self {
            token_to_prime: HashMap::new(),
            prime_to_token: HashMap::new(),
            last_prime: INITIAL_PRIME_CURSOR,
        }
    }

    fn assign(&mut self, token: &str) -> Result<Prime> {
        if let Some(&p) = self.token_to_prime.get(token) {
            return Ok(p);
        }
        let p = next_prime_after(self.last_prime)?;
        self.token_to_prime.insert(token.to_string(), p);
        self.prime_to_token.insert(p, token.to_string());
        self.last_prime = p;
        Ok(p)
    }
}

#[derive(Debug)]
pub struct Vocabulary {
    tables: RwLock<Tables>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocabulary {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Tables::empty()) }
    }

    pub fn len(&self) -> usize {
        self.tables.read().token_to_prime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_prime(&self) -> Prime {
        self.tables.read().last_prime
    }

    pub fn prime(&self, token: &str) -> Option<Prime> {
        self.tables.read().token_to_prime.get(token).copied()
    }

    pub fn token(&self, prime: Prime) -> Option<String> {
        self.tables.read().prime_to_token.get(&prime).cloned()
    }

    /// Looks up every token, skipping the ones never seen. Never mutates.
    pub fn lookup_all<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<Prime> {
        let tables = self.tables.read();
        tokens
            .iter()
            .filter_map(|t| tables.token_to_prime.get(t.as_ref()).copied())
            .collect()
    }

    /// Maps every token to its prime, assigning new primes in order of first
    /// appearance for tokens not yet in the vocabulary.
    pub fn intern_all<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<Prime>> {
        let tables = self.tables.upgradable_read();
        let known: Option<Vec<Prime>> = tokens
            .iter()
            .map(|t| tables.token_to_prime.get(t.as_ref()).copied())
            .collect();
        if let Some(primes) = known {
            return Ok(primes);
        }

        let mut tables = RwLockUpgradableReadGuard::upgrade(tables);
        let before = tables.token_to_prime.len();
        let primes = tokens
            .iter()
            .map(|t| tables.assign(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        tracing::trace!(
            added = tables.token_to_prime.len() - before,
            last_prime = tables.last_prime,
            "vocabulary grew"
        );
        Ok(primes)
    }

    pub fn snapshot(&self) -> VocabularySnapshot {
        let tables = self.tables.read();
        let mut entries: Vec<(String, Prime)> = tables
            .token_to_prime
            .iter()
            .map(|(t, &p)| (t.clone(), p))
            .collect();
        entries.sort_by_key(|(_, p)| *p);
        VocabularySnapshot { entries, last_prime: tables.last_prime }
    }

    /// Rebuilds a vocabulary, rejecting snapshots that would break
    /// uniqueness or place an assigned prime beyond the cursor.
    pub fn from_snapshot(snapshot: &VocabularySnapshot) -> Result<Self> {
        let mut tables = Tables::empty();
        let mut seen = HashSet::with_capacity(snapshot.entries.len());
        for (token, prime) in &snapshot.entries {
            if *prime > snapshot.last_prime || !seen.insert(*prime) {
                return Err(Error::CheckpointCorruption(format!(
                    "vocabulary entry {token:?} -> {prime} conflicts with cursor {} or another token",
                    snapshot.last_prime
                )));
            }
            if tables.token_to_prime.insert(token.clone(), *prime).is_some() {
                return Err(Error::CheckpointCorruption(format!("duplicate vocabulary token {token:?}")));
            }
            tables.prime_to_token.insert(*prime, token.clone());
        }
        tables.last_prime = snapshot.last_prime.max(INITIAL_PRIME_CURSOR);
        Ok(Self { tables: RwLock::new(tables) })
    }

    /// Replaces the contents with those of `other`.
    pub fn replace_with(&self, other: Vocabulary) {
        *self.tables.write() = other.tables.into_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_consecutive_primes_from_three() {
        let v = Vocabulary::new();
        let primes = v.intern_all(&["alpha", "beta", "alpha", "gamma"]).unwrap();
        assert_eq!(primes, vec![3, 5, 3, 7]);
        assert_eq!(v.last_prime(), 7);
        assert_eq!(v.token(5).as_deref(), Some("beta"));
    }

    #[test]
    fn lookup_never_grows() {
        let v = Vocabulary::new();
        v.intern_all(&["known"]).unwrap();
        assert_eq!(v.lookup_all(&["unknown", "known"]), vec![3]);
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn next_prime_skips_composites() {
        assert_eq!(next_prime_after(7).unwrap(), 11);
        assert_eq!(next_prime_after(89).unwrap(), 97);
        assert!(matches!(next_prime_after(Prime::MAX), Err(Error::VocabularyExhausted { .. })));
    }

    #[test]
    fn snapshot_restores_cursor() {
        let v = Vocabulary::new();
        v.intern_all(&["a", "b", "c"]).unwrap();
        let restored = Vocabulary::from_snapshot(&v.snapshot()).unwrap();
        assert_eq!(restored.intern_all(&["d"]).unwrap(), vec![11]);
        assert_eq!(restored.prime("b"), Some(5));
    }

    #[test]
    fn snapshot_with_shared_prime_is_rejected() {
        let snap = VocabularySnapshot {
            entries: vec![("a".into(), 3), ("b".into(), 3)],
            last_prime: 3,
        };
        assert!(matches!(Vocabulary::from_snapshot(&snap), Err(Error::CheckpointCorruption(_))));
    }
}
