//! Resonance, entropy, phase and persistence metrics and their combination.
//!
//! All functions here are pure. Time enters only through the idle days
//! handed in by the caller.

use crate::config::{PersistenceConfig, ScoringConfig};
use crate::vector::{BiorthogonalVector, PrimeVector};
use crate::Prime;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sparse dot product. Empty vectors resonate with nothing.
pub fn resonance(a: &PrimeVector, b: &PrimeVector) -> f64 {
    a.dot(b)
}

/// Shannon entropy (bits) of the prime occurrence distribution.
pub fn entropy(primes: &[Prime]) -> f64 {
    if primes.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<Prime, usize> = HashMap::new();
    for &p in primes {
        *counts.entry(p).or_insert(0) += 1;
    }
    let total = primes.len() as f64;
    let h: f64 = counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum();
    // a single repeated token sums to -0.0
    h.max(0.0)
}

pub fn standard_score(resonance: f64, doc_entropy: f64, query_entropy: f64, entropy_weight: f64) -> f64 {
    resonance - entropy_weight * (doc_entropy - query_entropy).abs()
}

/// Phase decay of a document that has not been indexed or matched for
/// `idle_days`: `idle / (idle + horizon)`, 0 for a fresh document, 1/2 at
/// the horizon and strictly increasing towards 1 as it goes stale.
pub fn phase_decay(idle_days: f64, horizon_days: f64) -> f64 {
    let horizon = horizon_days.max(f64::MIN_POSITIVE);
    let idle = idle_days.max(0.0);
    idle / (idle + horizon)
}

/// Resonance as the real part, phase decay as the imaginary part.
pub fn complex_resonance(query: &PrimeVector, doc: &PrimeVector, decay: f64) -> Complex64 {
    Complex64::new(resonance(query, doc), decay)
}

/// Asymmetric match: query-left against document-right and vice versa.
pub fn biorthogonal_score(query: &BiorthogonalVector, doc: &BiorthogonalVector) -> f64 {
    resonance(&query.left, &doc.right) + resonance(&query.right, &doc.left)
}

pub fn quantum_score(c: Complex64, biorthogonal: f64, config: &ScoringConfig) -> f64 {
    c.re - config.imag_weight * c.im.abs() + config.biorthogonal_weight * biorthogonal
}

/// `S = exp(-alpha * (1 - eta) * Q / T)`.
///
/// Inputs are clamped to their domains (alpha, Q >= 0, eta in [0,1],
/// T >= `min_buffering`). An exponent that underflows is floored at the
/// smallest positive `f64`, so S stays in (0, 1].
pub fn persistence_score(fragility: f64, reversibility: f64, pressure: f64, buffering: f64, min_buffering: f64) -> f64 {
    let alpha = fragility.max(0.0);
    let eta = reversibility.clamp(0.0, 1.0);
    let q = pressure.max(0.0);
    let t = buffering.max(min_buffering).max(f64::MIN_POSITIVE);
    (-alpha * (1.0 - eta) * (q / t)).exp().max(f64::MIN_POSITIVE)
}

/// Q after `idle_days` on top of the pressure already accumulated.
pub fn entropy_pressure(accumulated: f64, idle_days: f64, per_day: f64) -> f64 {
    accumulated.max(0.0) + per_day.max(0.0) * idle_days.max(0.0)
}

/// Buffering capacity T of a document vector: redundancy of its weights
/// (share of repeated weight values) plus the symmetry of the weight profile
/// ordered by prime, floored at `min_buffering`.
pub fn buffering_capacity(vector: &PrimeVector, min_buffering: f64) -> f64 {
    let weights: Vec<f64> = vector.iter().map(|(_, w)| w).collect();
    (redundancy(&weights) + symmetry(&weights)).max(min_buffering)
}

fn redundancy(weights: &[f64]) -> f64 {
    if weights.len() <= 1 {
        return 0.0;
    }
    let mut distinct: Vec<i64> = weights.iter().map(|w| (w * 1e6).round() as i64).collect();
    distinct.sort_unstable();
    distinct.dedup();
    1.0 - distinct.len() as f64 / weights.len() as f64
}

fn symmetry(weights: &[f64]) -> f64 {
    let n = weights.len();
    if n <= 1 {
        return 1.0;
    }
    let half = n / 2;
    let total: f64 = (0..half)
        .map(|i| {
            let (a, b) = (weights[i], weights[n - 1 - i]);
            let max = a.max(b);
            if max > 0.0 { 1.0 - (a - b).abs() / max } else { 1.0 }
        })
        .sum();
    total / half as f64
}

/// Per-term multipliers of the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub standard: f64,
    pub quantum: f64,
    pub persistence: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { standard: 0.5, quantum: 0.25, persistence: 0.25 }
    }
}

/// Scoring switches resolved once per search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub enable_quantum: bool,
    pub enable_persistence: bool,
    pub weights: ScoreWeights,
    /// Results scoring at or below this value are dropped.
    pub min_score: Option<f64>,
    /// Importance multiplier of the post-search feedback step.
    pub importance: f64,
    pub apply_feedback: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            enable_quantum: true,
            enable_persistence: true,
            weights: ScoreWeights::default(),
            min_score: None,
            importance: 1.0,
            apply_feedback: true,
        }
    }
}

impl SearchOptions {
    /// Resonance minus the entropy penalty, nothing else.
    pub fn standard_only() -> Self {
        Self { enable_quantum: false, enable_persistence: false, ..Self::default() }
    }
}

/// Weighted mean of the enabled terms. A disabled term (`None`) contributes
/// neither to the numerator nor to the weight total.
pub fn combine(standard: f64, quantum: Option<f64>, persistence: Option<f64>, weights: &ScoreWeights) -> f64 {
    let terms = [
        Some((standard, weights.standard)),
        quantum.map(|q| (q, weights.quantum)),
        persistence.map(|p| (p, weights.persistence)),
    ];
    let (num, den) = terms
        .iter()
        .flatten()
        .fold((0.0, 0.0), |(n, d), &(s, w)| (n + s * w, d + w));
    if den > 0.0 { num / den } else { standard }
}

/// NaN and infinities rank below every finite score.
pub fn sanitize(score: f64) -> f64 {
    if score.is_finite() { score } else { f64::NEG_INFINITY }
}

/// Query-side inputs shared by every document of one search.
#[derive(Debug, Clone)]
pub struct QuerySignals {
    pub vector: PrimeVector,
    pub biorthogonal: BiorthogonalVector,
    pub entropy: f64,
}

impl QuerySignals {
    pub fn from_primes(primes: &[Prime]) -> Self {
        Self {
            vector: crate::vector::build_vector(primes),
            biorthogonal: crate::vector::build_biorthogonal_vector(primes),
            entropy: entropy(primes),
        }
    }
}

/// Document-side inputs, captured under the document's lock.
#[derive(Debug, Clone, Copy)]
pub struct DocumentSignals<'a> {
    pub vector: &'a PrimeVector,
    pub biorthogonal: &'a BiorthogonalVector,
    pub entropy: f64,
    pub reversibility: f64,
    pub accumulated_pressure: f64,
    pub buffering: f64,
    pub fragility: f64,
    pub idle_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub resonance: f64,
    pub delta_entropy: f64,
    pub standard: f64,
    pub quantum: Option<f64>,
    pub biorthogonal: Option<f64>,
    pub persistence: Option<f64>,
    pub combined: f64,
}

pub struct Scorer<'a> {
    pub query: &'a QuerySignals,
    pub scoring: &'a ScoringConfig,
    pub persistence: &'a PersistenceConfig,
    pub options: &'a SearchOptions,
}

impl Scorer<'_> {
    pub fn score(&self, doc: &DocumentSignals<'_>) -> ScoreBreakdown {
        let res = resonance(&self.query.vector, doc.vector);
        let delta_entropy = (doc.entropy - self.query.entropy).abs();
        let standard = standard_score(res, doc.entropy, self.query.entropy, self.scoring.entropy_weight);

        let (quantum, biorthogonal) = if self.options.enable_quantum {
            let decay = phase_decay(doc.idle_days, self.scoring.decay_horizon_days);
            let c = complex_resonance(&self.query.vector, doc.vector, decay);
            let bio = biorthogonal_score(&self.query.biorthogonal, doc.biorthogonal);
            (Some(quantum_score(c, bio, self.scoring)), Some(bio))
        } else {
            (None, None)
        };

        let persistence = self.options.enable_persistence.then(|| {
            let q = entropy_pressure(doc.accumulated_pressure, doc.idle_days, self.persistence.pressure_per_day);
            persistence_score(doc.fragility, doc.reversibility, q, doc.buffering, self.persistence.min_buffering)
        });

        let combined = sanitize(combine(standard, quantum, persistence, &self.options.weights));
        ScoreBreakdown { resonance: res, delta_entropy, standard, quantum, biorthogonal, persistence, combined }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::build_vector;

    #[test]
    fn entropy_of_repeated_token_is_zero() {
        assert_eq!(entropy(&[7, 7, 7, 7]), 0.0);
        assert_eq!(entropy(&[]), 0.0);
    }

    #[test]
    fn entropy_of_uniform_stream_is_log2_n() {
        for n in 1..20u64 {
            let primes: Vec<Prime> = (0..n).map(|i| 1000 + i).collect();
            assert!((entropy(&primes) - (n as f64).log2()).abs() < 1e-9);
        }
    }

    #[test]
    fn resonance_is_symmetric_and_self_maximal() {
        let a = build_vector(&[3, 5, 5, 7, 11]);
        let b = build_vector(&[5, 7, 13, 13]);
        assert_eq!(resonance(&a, &b), resonance(&b, &a));
        assert!(resonance(&a, &a) >= resonance(&a, &b));
    }

    #[test]
    fn persistence_bounds() {
        let cases = [
            (0.0, 0.0, 0.0, 1.0),
            (5.0, 0.2, 4.0, 0.5),
            (0.2, 1.0, 100.0, 0.5),
            (1.0, 0.5, 0.0, 2.0),
            (50.0, 0.0, 1000.0, 1e-3),
            (f64::MAX, 0.0, f64::MAX, 1e-3),
        ];
        for (alpha, eta, q, t) in cases {
            let s = persistence_score(alpha, eta, q, t, 1e-3);
            assert!(s > 0.0 && s <= 1.0, "{alpha} {eta} {q} {t} -> {s}");
        }
        assert_eq!(persistence_score(3.0, 1.0, 50.0, 0.1, 1e-3), 1.0);
        assert_eq!(persistence_score(3.0, 0.1, 0.0, 0.1, 1e-3), 1.0);
        // T = 0 is clamped rather than dividing by zero
        assert!(persistence_score(0.2, 0.5, 1.0, 0.0, 1e-3).is_finite());
    }

    #[test]
    fn disabled_terms_are_omitted_not_zeroed() {
        let w = ScoreWeights::default();
        assert_eq!(combine(0.4, None, None, &w), 0.4);
        let with_persistence = combine(0.4, None, Some(1.0), &w);
        assert!((with_persistence - (0.4 * 0.5 + 0.25) / 0.75).abs() < 1e-12);
    }

    #[test]
    fn nan_sinks_to_negative_infinity() {
        assert_eq!(sanitize(f64::NAN), f64::NEG_INFINITY);
        assert_eq!(sanitize(f64::INFINITY), f64::NEG_INFINITY);
        assert_eq!(sanitize(0.25), 0.25);
    }

    #[test]
    fn phase_separates_documents_with_equal_overlap() {
        let q = QuerySignals::from_primes(&[3, 5]);
        let dv = build_vector(&[3, 5, 7]);
        let bio = crate::vector::build_biorthogonal_vector(&[3, 5, 7]);
        let scoring = ScoringConfig::default();
        let persistence = PersistenceConfig::default();
        let options = SearchOptions::default();
        let scorer = Scorer { query: &q, scoring: &scoring, persistence: &persistence, options: &options };
        let doc = |idle_days| DocumentSignals {
            vector: &dv,
            biorthogonal: &bio,
            entropy: 1.5,
            reversibility: 0.5,
            accumulated_pressure: 0.0,
            buffering: 1.0,
            fragility: 0.2,
            idle_days,
        };
        let fresh = scorer.score(&doc(0.0));
        let stale = scorer.score(&doc(90.0));
        assert_eq!(fresh.standard, stale.standard);
        assert!(fresh.quantum.unwrap() > stale.quantum.unwrap());

        let old = scorer.score(&doc(2000.0));
        let older = scorer.score(&doc(5000.0));
        assert!(old.quantum.unwrap() > older.quantum.unwrap());
    }

    #[test]
    fn phase_decay_keeps_growing_with_age() {
        assert_eq!(phase_decay(0.0, 30.0), 0.0);
        assert_eq!(phase_decay(30.0, 30.0), 0.5);
        let mut last = 0.0;
        for idle in [1.0, 100.0, 1_100.0, 10_000.0, 1e6] {
            let d = phase_decay(idle, 30.0);
            assert!(d > last && d < 1.0, "{idle} -> {d}");
            last = d;
        }
    }
}
