use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::document::DocumentRecord;
use crate::error::Result;

/// Canonical record storage keyed by stable id. Holds the stored field
/// values returned in search results; the inverted index only references
/// documents by id.
#[derive(Debug, Default)]
pub struct DocumentStore {
    records: HashMap<String, DocumentRecord>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or wholesale-replace the record with this id. Returns whether
    /// observable state changed; re-upserting an identical record is a no-op.
    pub fn upsert(&mut self, record: DocumentRecord) -> bool {
        match self.records.get(&record.id) {
            Some(existing) if *existing == record => false,
            _ => {
                self.records.insert(record.id.clone(), record);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.records.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<DocumentRecord> {
        self.records.remove(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.values()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }
}

/// Replay an append-only JSONL record log. A missing file is an empty store;
/// later lines for an id supersede earlier ones; undecodable lines are
/// logged and skipped.
pub fn load_log(path: &Path) -> Result<DocumentStore> {
    let mut store = DocumentStore::new();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
        Err(e) => return Err(e.into()),
    };
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DocumentRecord>(&line) {
            Ok(record) => {
                store.upsert(record);
            }
            Err(err) => {
                tracing::warn!(line = lineno + 1, %err, "skipping undecodable record log line");
            }
        }
    }
    Ok(store)
}

/// Append one record to the log.
pub fn append_log(path: &Path, record: &DocumentRecord) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, record)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Compact the log to exactly the store's current contents. Written to a
/// temp file and renamed so a crash never truncates the previous log.
pub fn rewrite_log(path: &Path, store: &DocumentStore) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        let mut records: Vec<&DocumentRecord> = store.all().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        for record in records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::stable_id;

    fn record(title: &str, url: &str) -> DocumentRecord {
        DocumentRecord {
            id: stable_id(title, url),
            title: title.into(),
            authors: vec![],
            author_links: vec![],
            year: None,
            url: url.into(),
            publication_type: String::new(),
            crawled_at: String::new(),
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut store = DocumentStore::new();
        let r = record("Governance of boards", "https://x/1");
        assert!(store.upsert(r.clone()));
        assert!(!store.upsert(r));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut store = DocumentStore::new();
        let mut r = record("Old", "https://x/1");
        let id = r.id.clone();
        store.upsert(r.clone());
        r.year = Some(2020);
        assert!(store.upsert(r));
        assert_eq!(store.count(), 1);
        assert_eq!(store.get(&id).unwrap().year, Some(2020));
    }

    #[test]
    fn log_roundtrip_dedupes_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let mut r = record("A title", "https://x/1");
        append_log(&path, &r).unwrap();
        r.year = Some(2019);
        append_log(&path, &r).unwrap();
        append_log(&path, &record("Another", "https://x/2")).unwrap();

        let store = load_log(&path).unwrap();
        assert_eq!(store.count(), 2);
        assert_eq!(store.get(&r.id).unwrap().year, Some(2019));
    }

    #[test]
    fn missing_log_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_log(&dir.path().join("absent.jsonl")).unwrap();
        assert_eq!(store.count(), 0);
    }
}
