pub mod checkpoint;
pub mod clock;
pub mod compress;
pub mod config;
pub mod error;
pub mod index;
pub mod scoring;
pub mod store;
pub mod tokenizer;
pub mod vector;
pub mod vocabulary;

pub type DocId = u32;
/// Identifier assigned to a vocabulary token. Always a prime number.
pub type Prime = u64;

pub use checkpoint::{Checkpoint, FrontierEntry, FrontierSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, PersistenceConfig, ScoringConfig, TokenizerConfig};
pub use error::{Error, Result};
pub use index::{CandidateSource, DocumentRecord, Index, IndexSnapshot, IndexStats, SearchResult};
pub use scoring::{ScoreBreakdown, ScoreWeights, SearchOptions};
pub use vector::{build_biorthogonal_vector, build_vector, BiorthogonalVector, PrimeVector};
pub use vocabulary::{Vocabulary, VocabularySnapshot};
