use pubscout_core::document::Field;
use pubscout_core::segment::{self, SegmentPaths};
use pubscout_core::{DocumentRecord, Engine, Error, SearchConfig, SortKey};

fn record(title: &str, url: &str) -> DocumentRecord {
    DocumentRecord {
        id: pubscout_core::stable_id(title, url),
        title: title.into(),
        authors: vec!["E. F. Author".into()],
        author_links: vec!["https://portal.example/persons/author".into()],
        year: Some(2023),
        url: url.into(),
        publication_type: "Journal Article".into(),
        crawled_at: "2026-08-01T03:30:00Z".into(),
    }
}

#[test]
fn fresh_directory_reports_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), SearchConfig::default()).unwrap();
    let stats = engine.stats();
    assert!(!stats.ready);
    assert_eq!(stats.docs, 0);
    assert!(matches!(
        engine.search("anything", SortKey::Relevance),
        Err(Error::IndexUnavailable(_))
    ));
}

#[test]
fn ingest_twice_leaves_identical_segment_content() {
    let once = tempfile::tempdir().unwrap();
    let twice = tempfile::tempdir().unwrap();
    let r = record("Fiscal Policy and Market Volatility", "https://x/1");

    let a = Engine::open(once.path(), SearchConfig::default()).unwrap();
    a.ingest(r.clone()).unwrap();
    a.checkpoint().unwrap();

    let b = Engine::open(twice.path(), SearchConfig::default()).unwrap();
    b.ingest(r.clone()).unwrap();
    b.ingest(r.clone()).unwrap();
    b.checkpoint().unwrap();

    let (ia, _) = segment::load(&SegmentPaths::new(once.path().join("index"))).unwrap();
    let (ib, _) = segment::load(&SegmentPaths::new(twice.path().join("index"))).unwrap();
    for field in Field::ALL {
        assert_eq!(ia.field_stats(field), ib.field_stats(field));
        assert_eq!(ia.postings(field, "fiscal"), ib.postings(field, "fiscal"));
        assert_eq!(ia.postings(field, "volatil"), ib.postings(field, "volatil"));
    }
    assert_eq!(a.stats().docs, 1);
    assert_eq!(b.stats().docs, 1);
}

#[test]
fn reingest_with_new_title_purges_old_terms() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), SearchConfig::default()).unwrap();

    let mut r = record("Old Title", "https://x/1");
    let id = r.id.clone();
    engine.ingest(r.clone()).unwrap();
    r.title = "New Title".into();
    engine.ingest(r).unwrap();
    engine.checkpoint().unwrap();

    assert!(engine.search("old", SortKey::Relevance).unwrap().is_empty());
    let hits = engine.search("new", SortKey::Relevance).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, id);
    assert_eq!(hits[0].document.title, "New Title");
    assert_eq!(engine.stats().docs, 1);
}

#[test]
fn checkpoint_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), SearchConfig::default()).unwrap();
        engine.ingest(record("Governance of boards", "https://x/1")).unwrap();
        engine.ingest(record("Executive compensation", "https://x/2")).unwrap();
        engine.checkpoint().unwrap();
    }

    let engine = Engine::open(dir.path(), SearchConfig::default()).unwrap();
    let stats = engine.stats();
    assert!(stats.ready);
    assert_eq!(stats.docs, 2);
    let hits = engine.search("governance", SortKey::Relevance).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn malformed_record_is_rejected_without_aborting() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), SearchConfig::default()).unwrap();

    let mut bad = record("Unnamed", "https://x/1");
    bad.title = String::new();
    assert!(matches!(
        engine.ingest(bad),
        Err(Error::MalformedRecord(_))
    ));
    assert_eq!(engine.stats().docs, 0);

    engine.ingest(record("A fine record", "https://x/2")).unwrap();
    assert_eq!(engine.stats().docs, 1);
}

#[test]
fn corrupt_segment_fails_open_and_recover_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = Engine::open(dir.path(), SearchConfig::default()).unwrap();
        engine.ingest(record("Governance of boards", "https://x/1")).unwrap();
        engine.checkpoint().unwrap();
    }

    // clobber the committed index payload
    let index_dir = dir.path().join("index");
    let current = std::fs::read_to_string(index_dir.join("CURRENT")).unwrap();
    let generation: u64 = current.trim().parse().unwrap();
    std::fs::write(
        index_dir
            .join(format!("segment-{generation:06}"))
            .join("index.bin"),
        b"garbage",
    )
    .unwrap();

    assert!(matches!(
        Engine::open(dir.path(), SearchConfig::default()),
        Err(Error::CorruptSegment(_))
    ));

    let engine = Engine::recover(dir.path(), SearchConfig::default()).unwrap();
    assert!(engine.stats().ready);
    let hits = engine.search("governance", SortKey::Relevance).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn delete_removes_document_from_results() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), SearchConfig::default()).unwrap();
    let r = record("Governance of boards", "https://x/1");
    let id = r.id.clone();
    engine.ingest(r).unwrap();
    engine.ingest(record("Executive compensation", "https://x/2")).unwrap();
    engine.checkpoint().unwrap();

    assert!(engine.delete(&id));
    assert!(!engine.delete(&id));
    engine.checkpoint().unwrap();

    assert!(engine.search("governance", SortKey::Relevance).unwrap().is_empty());
    assert_eq!(engine.stats().docs, 1);

    // compacted log no longer resurrects the record
    let reopened = Engine::open(dir.path(), SearchConfig::default()).unwrap();
    assert_eq!(reopened.stats().docs, 1);
}
