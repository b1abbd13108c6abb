use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::SearchConfig;
use crate::document::{DocumentRecord, Field};
use crate::error::Error;
use crate::index::InvertedIndex;
use crate::store::DocumentStore;
use crate::tokenizer::tokenize;

/// Result ordering strategies exposed to the query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Descending BM25F score, ties broken by id ascending.
    Relevance,
    /// Descending year, missing years last, ties by score then id.
    Year,
    /// Descending crawl timestamp, unparseable timestamps last, ties by
    /// score then id.
    Recent,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "relevance" => Ok(SortKey::Relevance),
            "year" => Ok(SortKey::Year),
            "recent" => Ok(SortKey::Recent),
            other => Err(Error::InvalidArgument(format!("unknown sort key {other:?}"))),
        }
    }
}

/// One ranked hit: the stored record plus its BM25F score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub document: DocumentRecord,
    pub score: f32,
}

/// Run a keyword query over the index and return ranked results.
///
/// Query text goes through the same analyzer as indexed text, so a term
/// that would not survive indexing never matches. Candidates are the union
/// of postings across all searchable fields; documents without a single
/// matching (field, term) pair are never scored. Empty or all-stopword
/// queries yield an empty result list.
pub fn search(
    index: &InvertedIndex,
    store: &DocumentStore,
    config: &SearchConfig,
    query: &str,
    sort: SortKey,
) -> Vec<ScoredDocument> {
    let mut terms: Vec<String> = tokenize(query).collect();
    terms.sort_unstable();
    terms.dedup();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scores: HashMap<String, f32> = HashMap::new();
    for field in Field::ALL {
        let stats = index.field_stats(field);
        if stats.doc_count == 0 {
            continue;
        }
        let boost = config.boost(field);
        let n = stats.doc_count as f32;
        for term in &terms {
            let postings = index.postings(field, term);
            if postings.is_empty() {
                continue;
            }
            let df = postings.len() as f32;
            // Non-negative IDF; the unsmoothed form flips sign for terms in
            // more than half the field's documents.
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for posting in postings {
                let tf = posting.term_frequency as f32;
                let field_len = index.field_length(&posting.doc_id, field) as f32;
                let norm = 1.0 - config.b + config.b * field_len / stats.avg_length;
                let contribution =
                    boost * idf * tf * (config.k1 + 1.0) / (tf + config.k1 * norm);
                *scores.entry(posting.doc_id).or_insert(0.0) += contribution;
            }
        }
    }

    let mut results: Vec<ScoredDocument> = scores
        .into_iter()
        .filter_map(|(id, score)| {
            store.get(&id).map(|document| ScoredDocument {
                document: document.clone(),
                score,
            })
        })
        .collect();

    order(&mut results, sort);
    results
}

fn order(results: &mut Vec<ScoredDocument>, sort: SortKey) {
    match sort {
        SortKey::Relevance => results.sort_by(by_score_then_id),
        SortKey::Year => results.sort_by(|a, b| {
            newest_first(&a.document.year, &b.document.year).then_with(|| by_score_then_id(a, b))
        }),
        SortKey::Recent => {
            let mut keyed: Vec<(Option<OffsetDateTime>, ScoredDocument)> = std::mem::take(results)
                .into_iter()
                .map(|hit| (parse_timestamp(&hit.document.crawled_at), hit))
                .collect();
            keyed.sort_by(|(ta, a), (tb, b)| {
                newest_first(ta, tb).then_with(|| by_score_then_id(a, b))
            });
            *results = keyed.into_iter().map(|(_, hit)| hit).collect();
        }
    }
}

fn by_score_then_id(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.document.id.cmp(&b.document.id))
}

/// Descending on present values, `None` sorted after every `Some`.
fn newest_first<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}
