use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::SearchConfig;
use crate::document::{DocumentRecord, Field};
use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::search::{self, ScoredDocument, SortKey};
use crate::segment::{self, SegmentPaths};
use crate::store::{self, DocumentStore};
use crate::tokenizer::tokenize;

/// Index health as reported by the stats API.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexStats {
    pub ready: bool,
    pub docs: u64,
}

/// Owner of the document store and inverted index for one data directory.
///
/// Single writer, many readers: every mutation takes a bounded write-lock
/// critical section (one document's remove-then-add, or a pointer-sized
/// swap on rebuild), so concurrent searches observe either the pre- or the
/// fully-post-update postings of a document, never a partial purge.
/// Tokenization and segment serialization run outside the locks.
pub struct Engine {
    data_dir: PathBuf,
    config: SearchConfig,
    store: RwLock<DocumentStore>,
    index: RwLock<InvertedIndex>,
    ready: AtomicBool,
}

impl Engine {
    /// Open a data directory, replaying the record log and loading the
    /// committed segment if one exists. A directory that has never been
    /// indexed opens empty with `ready = false`; a corrupt segment is an
    /// error so callers can choose the [`Engine::recover`] path.
    pub fn open<P: AsRef<Path>>(data_dir: P, config: SearchConfig) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let store = store::load_log(&records_path(&data_dir))?;
        let (index, ready) = match segment::load(&SegmentPaths::new(data_dir.join("index"))) {
            Ok((index, _meta)) => (index, true),
            Err(Error::IndexUnavailable(_)) => (InvertedIndex::new(), false),
            Err(e) => return Err(e),
        };
        tracing::info!(docs = store.count(), ready, dir = %data_dir.display(), "opened engine");
        Ok(Self::assemble(data_dir, config, store, index, ready))
    }

    /// Open a data directory ignoring any existing segment and rebuild the
    /// index from the record log: the recovery path for `CorruptSegment`.
    pub fn recover<P: AsRef<Path>>(data_dir: P, config: SearchConfig) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let store = store::load_log(&records_path(&data_dir))?;
        tracing::warn!(docs = store.count(), dir = %data_dir.display(), "rebuilding index from record log");
        let engine = Self::assemble(data_dir, config, store, InvertedIndex::new(), false);
        engine.rebuild()?;
        Ok(engine)
    }

    fn assemble(
        data_dir: PathBuf,
        config: SearchConfig,
        store: DocumentStore,
        index: InvertedIndex,
        ready: bool,
    ) -> Self {
        Engine {
            data_dir,
            config,
            store: RwLock::new(store),
            index: RwLock::new(index),
            ready: AtomicBool::new(ready),
        }
    }

    /// Upsert one record into the store and re-index its searchable fields.
    ///
    /// Re-ingesting an unchanged record leaves store, log, and index content
    /// identical; a record sharing an id with different content wholesale
    /// replaces the old version, old postings included.
    pub fn ingest(&self, record: DocumentRecord) -> Result<()> {
        record.validate()?;
        let analyzed: Vec<(Field, Vec<String>)> = Field::ALL
            .iter()
            .map(|f| (*f, tokenize(&record.field_text(*f)).collect()))
            .collect();

        let changed = self.store.write().upsert(record.clone());
        if changed {
            store::append_log(&records_path(&self.data_dir), &record)?;
        }

        let mut index = self.index.write();
        index.remove_document(&record.id);
        for (field, terms) in &analyzed {
            index.add_terms(&record.id, *field, terms);
        }
        Ok(())
    }

    /// Remove a document from store and index. Durable after the next
    /// checkpoint, when the record log is compacted.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.store.write().remove(id).is_some();
        self.index.write().remove_document(id);
        removed
    }

    /// Re-index every stored record into a fresh index, swap it in, and
    /// checkpoint.
    pub fn rebuild(&self) -> Result<()> {
        let mut fresh = InvertedIndex::new();
        {
            let store = self.store.read();
            for record in store.all() {
                for field in Field::ALL {
                    let terms: Vec<String> = tokenize(&record.field_text(field)).collect();
                    fresh.add_terms(&record.id, field, &terms);
                }
            }
        }
        *self.index.write() = fresh;
        self.checkpoint()
    }

    /// Commit the current index as a new segment generation and compact the
    /// record log. All-or-nothing: a crash mid-checkpoint leaves the
    /// previous generation committed.
    pub fn checkpoint(&self) -> Result<()> {
        let snapshot = self.index.read().clone();
        let doc_count = self.store.read().count() as u64;
        segment::commit(&self.segment_paths(), &snapshot, doc_count)?;
        {
            let store = self.store.read();
            store::rewrite_log(&records_path(&self.data_dir), &store)?;
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Ranked keyword search. Fails with `IndexUnavailable` until an index
    /// has been built (or loaded) at least once.
    pub fn search(&self, query: &str, sort: SortKey) -> Result<Vec<ScoredDocument>> {
        if !self.is_ready() {
            return Err(Error::IndexUnavailable("index has not been built yet".into()));
        }
        let store = self.store.read();
        let index = self.index.read();
        Ok(search::search(&index, &store, &self.config, query, sort))
    }

    /// Never fails: an unbuilt index reports `ready = false, docs = 0`.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            ready: self.is_ready(),
            docs: self.store.read().count() as u64,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn segment_paths(&self) -> SegmentPaths {
        SegmentPaths::new(self.data_dir.join("index"))
    }
}

fn records_path(data_dir: &Path) -> PathBuf {
    data_dir.join("records.jsonl")
}
