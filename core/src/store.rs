use crate::error::{Error, Result};
use crate::index::DocumentRecord;
use crate::vocabulary::VocabularySnapshot;
use crate::{DocId, Prime};
use std::path::Path;

const LAST_PRIME_KEY: &[u8] = b"last_prime";

/// Durable document persistence behind the index.
pub trait DocumentStore: Send + Sync {
    fn put_document(&self, record: &DocumentRecord) -> Result<()>;
    fn get_document(&self, id: DocId) -> Result<Option<DocumentRecord>>;
    fn remove_document(&self, id: DocId) -> Result<bool>;
    fn document_ids(&self) -> Result<Vec<DocId>>;
    /// All documents in id order.
    fn documents(&self) -> Result<Vec<DocumentRecord>>;
    fn put_vocabulary(&self, snapshot: &VocabularySnapshot) -> Result<()>;
    fn vocabulary(&self) -> Result<Option<VocabularySnapshot>>;
    fn flush(&self) -> Result<()>;
}

/// `sled` store: one tree of bincode records keyed by big-endian id, one
/// tree of `token -> prime` pairs, and the prime cursor in the default tree.
pub struct SledStore {
    db: sled::Db,
    docs: sled::Tree,
    vocab: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let docs = db.open_tree("documents")?;
        let vocab = db.open_tree("vocabulary")?;
        Ok(Self { db, docs, vocab })
    }
}

fn decode_prime(bytes: &[u8]) -> Result<Prime> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::CheckpointCorruption(format!("prime value of {} bytes", bytes.len())))?;
    Ok(Prime::from_be_bytes(arr))
}

impl DocumentStore for SledStore {
    fn put_document(&self, record: &DocumentRecord) -> Result<()> {
        self.docs.insert(record.id.to_be_bytes(), bincode::serialize(record)?)?;
        Ok(())
    }

    fn get_document(&self, id: DocId) -> Result<Option<DocumentRecord>> {
        match self.docs.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn remove_document(&self, id: DocId) -> Result<bool> {
        Ok(self.docs.remove(id.to_be_bytes())?.is_some())
    }

    fn document_ids(&self) -> Result<Vec<DocId>> {
        self.docs
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                let arr: [u8; 4] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::CheckpointCorruption(format!("document key of {} bytes", key.len())))?;
                Ok(DocId::from_be_bytes(arr))
            })
            .collect()
    }

    fn documents(&self) -> Result<Vec<DocumentRecord>> {
        self.docs
            .iter()
            .map(|kv| {
                let (_, bytes) = kv?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    fn put_vocabulary(&self, snapshot: &VocabularySnapshot) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (token, prime) in &snapshot.entries {
            batch.insert(token.as_bytes(), prime.to_be_bytes().to_vec());
        }
        self.vocab.apply_batch(batch)?;
        self.db.insert(LAST_PRIME_KEY, snapshot.last_prime.to_be_bytes().to_vec())?;
        Ok(())
    }

    fn vocabulary(&self) -> Result<Option<VocabularySnapshot>> {
        let Some(cursor) = self.db.get(LAST_PRIME_KEY)? else {
            return Ok(None);
        };
        let mut entries = Vec::with_capacity(self.vocab.len());
        for kv in self.vocab.iter() {
            let (token, prime) = kv?;
            let token = String::from_utf8(token.to_vec())
                .map_err(|e| Error::CheckpointCorruption(format!("vocabulary token is not utf-8: {e}")))?;
            entries.push((token, decode_prime(&prime)?));
        }
        entries.sort_by_key(|(_, p)| *p);
        Ok(Some(VocabularySnapshot { entries, last_prime: decode_prime(&cursor)? }))
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
