//! Sparse prime-indexed vectors.
//!
//! Weights are kept in a `BTreeMap` so iteration is ordered by prime. The dot
//! product walks both vectors in that order, which makes it bit-for-bit
//! symmetric.

use crate::Prime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Golden ratio; the right-hand biorthogonal weights decay by `PHI^-(i/n)`.
pub const PHI: f64 = 1.618_033_988_749_895;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimeVector {
    weights: BTreeMap<Prime, f64>,
}

impl PrimeVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I: IntoIterator<Item = (Prime, f64)>>(pairs: I) -> Self {
        Self { weights: pairs.into_iter().collect() }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, prime: Prime) -> Option<f64> {
        self.weights.get(&prime).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Prime, f64)> + '_ {
        self.weights.iter().map(|(&p, &w)| (p, w))
    }

    pub fn primes(&self) -> impl Iterator<Item = Prime> + '_ {
        self.weights.keys().copied()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Sparse dot product over the primes present in both vectors.
    pub fn dot(&self, other: &PrimeVector) -> f64 {
        let mut a = self.weights.iter().peekable();
        let mut b = other.weights.iter().peekable();
        let mut acc = 0.0;
        while let (Some(&(pa, wa)), Some(&(pb, wb))) = (a.peek(), b.peek()) {
            match pa.cmp(pb) {
                Ordering::Less => {
                    a.next();
                }
                Ordering::Greater => {
                    b.next();
                }
                Ordering::Equal => {
                    acc += wa * wb;
                    a.next();
                    b.next();
                }
            }
        }
        acc
    }

    fn normalized(mut self) -> Self {
        let total = self.sum();
        if total > 0.0 {
            for w in self.weights.values_mut() {
                *w /= total;
            }
        }
        self
    }
}

/// A left/right pair of weightings of the same content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiorthogonalVector {
    pub left: PrimeVector,
    pub right: PrimeVector,
}

/// Relative term frequencies; weights sum to 1.0 unless `primes` is empty.
pub fn build_vector(primes: &[Prime]) -> PrimeVector {
    let mut counts: BTreeMap<Prime, f64> = BTreeMap::new();
    for &p in primes {
        *counts.entry(p).or_insert(0.0) += 1.0;
    }
    PrimeVector { weights: counts }.normalized()
}

/// Decay applied to the occurrence at `position` of a stream of length `len`.
/// Falls from 1.0 at the start towards `1/PHI` at the end.
pub fn position_decay(position: usize, len: usize) -> f64 {
    if len == 0 {
        return 1.0;
    }
    PHI.powf(-(position as f64) / len as f64)
}

/// Left is [`build_vector`]; right sums position-decayed occurrences, so
/// words appearing early weigh more, then renormalizes to 1.0.
pub fn build_biorthogonal_vector(primes: &[Prime]) -> BiorthogonalVector {
    let mut decayed: BTreeMap<Prime, f64> = BTreeMap::new();
    for (i, &p) in primes.iter().enumerate() {
        *decayed.entry(p).or_insert(0.0) += position_decay(i, primes.len());
    }
    BiorthogonalVector {
        left: build_vector(primes),
        right: PrimeVector { weights: decayed }.normalized(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let v = build_vector(&[3, 5, 5, 7, 7, 7]);
        assert!((v.sum() - 1.0).abs() < 1e-12);
        assert!((v.get(7).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_stream_is_empty_vector() {
        assert!(build_vector(&[]).is_empty());
        let bio = build_biorthogonal_vector(&[]);
        assert!(bio.left.is_empty() && bio.right.is_empty());
        assert_eq!(bio.left.dot(&build_vector(&[3])), 0.0);
    }

    #[test]
    fn right_vector_favours_early_words() {
        let bio = build_biorthogonal_vector(&[3, 5]);
        assert_eq!(bio.left.get(3), bio.left.get(5));
        assert!(bio.right.get(3).unwrap() > bio.right.get(5).unwrap());
        assert!((bio.right.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dot_only_counts_shared_primes() {
        let a = PrimeVector::from_pairs([(3, 0.5), (5, 0.5)]);
        let b = PrimeVector::from_pairs([(5, 0.25), (11, 0.75)]);
        assert_eq!(a.dot(&b), 0.125);
        assert_eq!(a.dot(&b), b.dot(&a));
    }
}
