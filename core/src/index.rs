//! In-memory document index.
//!
//! The document table sits behind one `RwLock`; each document's mutable
//! feedback state (reversibility, pressure, last match) has its own `Mutex`.
//! A search holds the table read lock, scores and ranks, and only then
//! applies its feedback, so a search never sees its own update.

use crate::clock::{days_between, Clock, SystemClock};
use crate::compress::Body;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::scoring::{
    buffering_capacity, entropy, entropy_pressure, DocumentSignals, QuerySignals, ScoreBreakdown, Scorer,
    SearchOptions,
};
use crate::store::DocumentStore;
use crate::tokenizer::{Tokenizer, WORD_RE};
use crate::vector::{build_biorthogonal_vector, build_vector, BiorthogonalVector, PrimeVector};
use crate::vocabulary::{Vocabulary, VocabularySnapshot};
use crate::{DocId, Prime};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Weight of the previous reversibility in a feedback update.
const FEEDBACK_RETENTION: f64 = 0.9;
/// Share of the accumulated entropy pressure kept when a document is matched.
const PRESSURE_RELIEF: f64 = 0.5;
const SNIPPET_LEAD_CHARS: usize = 100;
const SNIPPET_CHARS: usize = 200;

/// External full-text pre-filter narrowing a search to candidate documents.
pub trait CandidateSource {
    fn candidate_ids(&self, query: &str) -> HashSet<DocId>;
}

impl<F> CandidateSource for F
where
    F: Fn(&str) -> HashSet<DocId>,
{
    fn candidate_ids(&self, query: &str) -> HashSet<DocId> {
        self(query)
    }
}

/// Mutable part of a document, touched only by the feedback step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackState {
    pub reversibility: f64,
    /// Entropy pressure accumulated up to `last_refresh`.
    pub entropy_pressure: f64,
    pub last_matched_at: Option<u64>,
}

#[derive(Debug)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub origin: String,
    pub body: Body,
    pub vector: PrimeVector,
    pub biorthogonal: BiorthogonalVector,
    pub entropy: f64,
    pub buffering: f64,
    pub fragility: f64,
    pub indexed_at: u64,
    state: Mutex<FeedbackState>,
}

impl Document {
    pub fn feedback_state(&self) -> FeedbackState {
        *self.state.lock()
    }

    fn last_refresh(state: &FeedbackState, indexed_at: u64) -> u64 {
        state.last_matched_at.unwrap_or(indexed_at).max(indexed_at)
    }

    pub fn to_record(&self) -> Result<DocumentRecord> {
        let state = self.feedback_state();
        Ok(DocumentRecord {
            id: self.id,
            title: self.title.clone(),
            origin: self.origin.clone(),
            compressed_body: self.body.compressed_bytes()?.into_owned(),
            vector: self.vector.iter().collect(),
            right_vector: self.biorthogonal.right.iter().collect(),
            entropy: self.entropy,
            reversibility: state.reversibility,
            entropy_pressure: state.entropy_pressure,
            buffering: self.buffering,
            fragility: self.fragility,
            indexed_at: self.indexed_at,
            last_matched_at: state.last_matched_at,
        })
    }

    fn from_record(record: DocumentRecord) -> Self {
        let vector = PrimeVector::from_pairs(record.vector);
        let biorthogonal = BiorthogonalVector {
            left: vector.clone(),
            right: PrimeVector::from_pairs(record.right_vector),
        };
        Self {
            id: record.id,
            title: record.title,
            origin: record.origin,
            body: Body::Compressed(record.compressed_body),
            vector,
            biorthogonal,
            entropy: record.entropy,
            buffering: record.buffering,
            fragility: record.fragility,
            indexed_at: record.indexed_at,
            state: Mutex::new(FeedbackState {
                reversibility: record.reversibility,
                entropy_pressure: record.entropy_pressure,
                last_matched_at: record.last_matched_at,
            }),
        }
    }
}

/// On-disk shape of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocId,
    pub title: String,
    pub origin: String,
    pub compressed_body: Vec<u8>,
    pub vector: Vec<(Prime, f64)>,
    pub right_vector: Vec<(Prime, f64)>,
    pub entropy: f64,
    pub reversibility: f64,
    pub entropy_pressure: f64,
    pub buffering: f64,
    pub fragility: f64,
    pub indexed_at: u64,
    pub last_matched_at: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub vocabulary: VocabularySnapshot,
    pub documents: Vec<DocumentRecord>,
    pub next_id: DocId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub vocabulary_size: usize,
    pub avg_entropy: f64,
    pub compressed_documents: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub doc_id: DocId,
    pub title: String,
    pub origin: String,
    pub scores: ScoreBreakdown,
    pub snippet: Option<String>,
}

/// Reversibility update owed to one matched document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackUpdate {
    pub doc_id: DocId,
    pub resonance: f64,
}

#[derive(Debug, Default)]
struct DocTable {
    docs: BTreeMap<DocId, Document>,
    origins: HashMap<String, DocId>,
    next_id: DocId,
}

pub struct Index {
    tokenizer: Tokenizer,
    table: RwLock<DocTable>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl Index {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let tokenizer = Tokenizer::new(Arc::new(Vocabulary::new()), config.tokenizer.clone());
        Self { tokenizer, table: RwLock::new(DocTable::default()), config, clock }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        self.tokenizer.vocabulary()
    }

    pub fn len(&self) -> usize {
        self.table.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_origin(&self, origin: &str) -> bool {
        self.table.read().origins.contains_key(origin)
    }

    pub fn doc_id_for_origin(&self, origin: &str) -> Option<DocId> {
        self.table.read().origins.get(origin).copied()
    }

    /// Tokenizes, vectorizes and stores a new document. The same text always
    /// yields the same vectors; calling twice creates two documents.
    pub fn add_document(&self, title: &str, origin: &str, body: &str) -> Result<DocId> {
        let primes = self.tokenizer.tokenize(body)?;
        let vector = build_vector(&primes);
        let biorthogonal = build_biorthogonal_vector(&primes);
        let persistence = &self.config.persistence;
        let buffering = buffering_capacity(&vector, persistence.min_buffering);
        let now = self.clock.now();

        let mut table = self.table.write();
        let id = table.next_id;
        table.next_id += 1;
        table.origins.insert(origin.to_string(), id);
        table.docs.insert(
            id,
            Document {
                id,
                title: title.to_string(),
                origin: origin.to_string(),
                body: Body::Raw(body.to_string()),
                entropy: entropy(&primes),
                vector,
                biorthogonal,
                buffering,
                fragility: persistence.fragility,
                indexed_at: now,
                state: Mutex::new(FeedbackState {
                    reversibility: persistence.default_reversibility,
                    entropy_pressure: 0.0,
                    last_matched_at: None,
                }),
            },
        );
        tracing::debug!(doc_id = id, origin, tokens = primes.len(), "document indexed");
        Ok(id)
    }

    /// Explicit removal; the engine never drops documents on its own.
    pub fn remove_document(&self, id: DocId) -> bool {
        let mut table = self.table.write();
        match table.docs.remove(&id) {
            Some(doc) => {
                if table.origins.get(&doc.origin) == Some(&id) {
                    table.origins.remove(&doc.origin);
                }
                true
            }
            None => false,
        }
    }

    pub fn document_text(&self, id: DocId) -> Result<String> {
        let table = self.table.read();
        let doc = table.docs.get(&id).ok_or(Error::DocumentNotFound(id))?;
        Ok(doc.body.text()?.into_owned())
    }

    pub fn feedback_state(&self, id: DocId) -> Option<FeedbackState> {
        self.table.read().docs.get(&id).map(Document::feedback_state)
    }

    pub fn vectors(&self, id: DocId) -> Option<(PrimeVector, BiorthogonalVector)> {
        self.table
            .read()
            .docs
            .get(&id)
            .map(|d| (d.vector.clone(), d.biorthogonal.clone()))
    }

    pub fn search(&self, query: &str, top_k: usize, options: &SearchOptions) -> Vec<SearchResult> {
        self.search_filtered(query, top_k, options, None)
    }

    /// Search restricted to the documents an external pre-filter proposes.
    pub fn search_with_candidates(
        &self,
        query: &str,
        top_k: usize,
        options: &SearchOptions,
        source: &dyn CandidateSource,
    ) -> Vec<SearchResult> {
        let candidates = source.candidate_ids(query);
        self.search_filtered(query, top_k, options, Some(&candidates))
    }

    fn search_filtered(
        &self,
        query: &str,
        top_k: usize,
        options: &SearchOptions,
        candidates: Option<&HashSet<DocId>>,
    ) -> Vec<SearchResult> {
        let start = Instant::now();
        let primes = self.tokenizer.tokenize_readonly(query);
        if primes.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let signals = QuerySignals::from_primes(&primes);
        let scorer = Scorer {
            query: &signals,
            scoring: &self.config.scoring,
            persistence: &self.config.persistence,
            options,
        };
        let now = self.clock.now();
        let query_words: HashSet<String> = self.tokenizer.words(query).into_iter().collect();

        // Phase 1: score and rank under the read lock.
        let (results, updates) = {
            let table = self.table.read();
            let mut ranked: Vec<(&Document, ScoreBreakdown)> = Vec::new();
            // every matched document gets feedback, not only the returned ones
            let mut updates: Vec<FeedbackUpdate> = Vec::new();
            for doc in table.docs.values() {
                if candidates.is_some_and(|c| !c.contains(&doc.id)) {
                    continue;
                }
                if doc.vector.dot(&signals.vector) <= 0.0 {
                    continue;
                }
                let state = doc.feedback_state();
                let breakdown = scorer.score(&DocumentSignals {
                    vector: &doc.vector,
                    biorthogonal: &doc.biorthogonal,
                    entropy: doc.entropy,
                    reversibility: state.reversibility,
                    accumulated_pressure: state.entropy_pressure,
                    buffering: doc.buffering,
                    fragility: doc.fragility,
                    idle_days: days_between(Document::last_refresh(&state, doc.indexed_at), now),
                });
                if breakdown.combined == f64::NEG_INFINITY {
                    tracing::warn!(doc_id = doc.id, ?breakdown, "non-finite score, document excluded");
                    continue;
                }
                updates.push(FeedbackUpdate { doc_id: doc.id, resonance: breakdown.resonance });
                if options.min_score.is_some_and(|min| breakdown.combined <= min) {
                    continue;
                }
                ranked.push((doc, breakdown));
            }
            ranked.sort_by(|(da, a), (db, b)| {
                b.combined
                    .total_cmp(&a.combined)
                    .then(db.indexed_at.cmp(&da.indexed_at))
                    .then(da.id.cmp(&db.id))
            });
            ranked.truncate(top_k);

            let results: Vec<SearchResult> = ranked
                .into_iter()
                .map(|(doc, scores)| SearchResult {
                    doc_id: doc.id,
                    title: doc.title.clone(),
                    origin: doc.origin.clone(),
                    scores,
                    snippet: doc.body.text().ok().map(|t| snippet(&t, &query_words)),
                })
                .collect();
            (results, updates)
        };

        // Phase 2: feedback, strictly after ranking.
        if options.apply_feedback {
            self.apply_feedback(&updates, options.importance);
        }
        tracing::debug!(query, hits = results.len(), took_s = start.elapsed().as_secs_f64(), "search");
        results
    }

    /// The "quantum jump": nudges reversibility of matched documents towards
    /// `resonance * importance`, relieves part of their entropy pressure and
    /// marks them as matched now.
    pub fn apply_feedback(&self, updates: &[FeedbackUpdate], importance: f64) {
        let now = self.clock.now();
        let per_day = self.config.persistence.pressure_per_day;
        let table = self.table.read();
        for update in updates {
            let Some(doc) = table.docs.get(&update.doc_id) else { continue };
            let mut state = doc.state.lock();
            let eta = FEEDBACK_RETENTION * state.reversibility
                + (1.0 - FEEDBACK_RETENTION) * update.resonance * importance;
            if eta.is_finite() {
                state.reversibility = eta.clamp(0.0, 1.0);
            }
            let idle = days_between(Document::last_refresh(&state, doc.indexed_at), now);
            state.entropy_pressure = entropy_pressure(state.entropy_pressure, idle, per_day) * PRESSURE_RELIEF;
            state.last_matched_at = Some(now);
        }
    }

    /// Compresses every raw body. Vectors and entropy are untouched.
    pub fn compress_all_documents(&self) -> Result<usize> {
        let mut table = self.table.write();
        let mut changed = 0;
        for doc in table.docs.values_mut() {
            if doc.body.compress_in_place()? {
                changed += 1;
            }
        }
        tracing::info!(compressed = changed, total = table.docs.len(), "compressed documents");
        Ok(changed)
    }

    pub fn decompress_all_documents(&self) -> Result<usize> {
        let mut table = self.table.write();
        let mut changed = 0;
        for doc in table.docs.values_mut() {
            if doc.body.decompress_in_place()? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn stats(&self) -> IndexStats {
        let table = self.table.read();
        let n = table.docs.len();
        let avg_entropy = if n == 0 {
            0.0
        } else {
            table.docs.values().map(|d| d.entropy).sum::<f64>() / n as f64
        };
        IndexStats {
            document_count: n,
            vocabulary_size: self.vocabulary().len(),
            avg_entropy,
            compressed_documents: table.docs.values().filter(|d| d.body.is_compressed()).count(),
        }
    }

    pub fn snapshot(&self) -> Result<IndexSnapshot> {
        let table = self.table.read();
        let documents = table.docs.values().map(Document::to_record).collect::<Result<Vec<_>>>()?;
        Ok(IndexSnapshot {
            vocabulary: self.vocabulary().snapshot(),
            documents,
            next_id: table.next_id,
        })
    }

    /// Replaces the index contents with `snapshot`. Everything is validated
    /// and rebuilt first; on error the current contents stay as they were.
    pub fn restore(&self, snapshot: IndexSnapshot) -> Result<()> {
        let vocabulary = Vocabulary::from_snapshot(&snapshot.vocabulary)?;
        let mut rebuilt = DocTable { next_id: snapshot.next_id, ..DocTable::default() };
        for record in snapshot.documents {
            if record.id >= snapshot.next_id {
                return Err(Error::CheckpointCorruption(format!(
                    "document id {} not below next id {}",
                    record.id, snapshot.next_id
                )));
            }
            if let Some(&p) = record.vector.iter().map(|(p, _)| p).find(|p| vocabulary.token(**p).is_none()) {
                return Err(Error::CheckpointCorruption(format!(
                    "document {} references unknown prime {p}",
                    record.id
                )));
            }
            let doc = Document::from_record(record);
            rebuilt.origins.insert(doc.origin.clone(), doc.id);
            if rebuilt.docs.insert(doc.id, doc).is_some() {
                return Err(Error::CheckpointCorruption("duplicate document id".into()));
            }
        }

        let mut table = self.table.write();
        self.vocabulary().replace_with(vocabulary);
        *table = rebuilt;
        tracing::info!(documents = table.docs.len(), vocabulary = self.vocabulary().len(), "index restored");
        Ok(())
    }

    pub fn save_to_store(&self, store: &dyn DocumentStore) -> Result<usize> {
        let snapshot = self.snapshot()?;
        store.put_vocabulary(&snapshot.vocabulary)?;
        for record in &snapshot.documents {
            store.put_document(record)?;
        }
        let kept: HashSet<DocId> = snapshot.documents.iter().map(|d| d.id).collect();
        for id in store.document_ids()?.into_iter().filter(|id| !kept.contains(id)) {
            store.remove_document(id)?;
        }
        store.flush()?;
        Ok(snapshot.documents.len())
    }

    pub fn load_from_store(&self, store: &dyn DocumentStore) -> Result<usize> {
        let vocabulary = store.vocabulary()?.unwrap_or_default();
        let documents = store.documents()?;
        let next_id = documents.iter().map(|d| d.id + 1).max().unwrap_or(0);
        let n = documents.len();
        self.restore(IndexSnapshot { vocabulary, documents, next_id })?;
        Ok(n)
    }

    /// One JSON line per document: origin, title and its persistence metrics.
    pub fn export_jsonl<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        #[derive(Serialize)]
        struct ExportRow<'a> {
            id: DocId,
            origin: &'a str,
            title: &'a str,
            entropy: f64,
            reversibility: f64,
            buffering: f64,
            indexed_at: u64,
        }

        let mut out = BufWriter::new(File::create(path)?);
        let table = self.table.read();
        for doc in table.docs.values() {
            let row = ExportRow {
                id: doc.id,
                origin: &doc.origin,
                title: &doc.title,
                entropy: doc.entropy,
                reversibility: doc.feedback_state().reversibility,
                buffering: doc.buffering,
                indexed_at: doc.indexed_at,
            };
            serde_json::to_writer(&mut out, &row)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(table.docs.len())
    }
}

/// Up to `SNIPPET_CHARS` characters starting shortly before the first query
/// word found in `text`, whitespace collapsed.
fn snippet(text: &str, words: &HashSet<String>) -> String {
    let hit = WORD_RE
        .find_iter(text)
        .find(|m| words.contains(&m.as_str().to_lowercase()))
        .map(|m| m.start())
        .unwrap_or(0);
    let start = text[..hit]
        .char_indices()
        .rev()
        .nth(SNIPPET_LEAD_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window: String = text[start..].chars().take(SNIPPET_CHARS).collect();
    window.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn index_at(now: u64) -> (Index, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        (Index::with_clock(EngineConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn snippet_centres_on_first_hit() {
        let text = format!("{} needle and more", "filler ".repeat(40));
        let words: HashSet<String> = ["needle".to_string()].into_iter().collect();
        let s = snippet(&text, &words);
        assert!(s.contains("needle"));
        assert!(s.starts_with("filler"));
        assert!(s.chars().count() <= SNIPPET_CHARS);
    }

    #[test]
    fn feedback_moves_reversibility_and_stamps_match() {
        let (index, clock) = index_at(1_000);
        let id = index.add_document("t", "o", "alpha beta").unwrap();
        clock.advance_days(2);
        index.apply_feedback(&[FeedbackUpdate { doc_id: id, resonance: 1.0 }], 1.0);
        let state = index.feedback_state(id).unwrap();
        assert!((state.reversibility - (0.9 * 0.5 + 0.1)).abs() < 1e-12);
        assert_eq!(state.last_matched_at, Some(clock.now()));
        // two idle days at 0.05/day, then halved
        assert!((state.entropy_pressure - 0.05).abs() < 1e-12);
    }

    #[test]
    fn remove_document_forgets_origin() {
        let (index, _) = index_at(0);
        let id = index.add_document("t", "file:///a.txt", "some words").unwrap();
        assert!(index.contains_origin("file:///a.txt"));
        assert!(index.remove_document(id));
        assert!(!index.contains_origin("file:///a.txt"));
        assert!(!index.remove_document(id));
    }
}
