use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::document::Field;

pub type TermFrequency = u32;

/// One postings-list entry: a document and the term's frequency within that
/// document's field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: String,
    pub term_frequency: TermFrequency,
}

/// Aggregate per-field statistics required by BM25F.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldStats {
    /// Documents with at least one indexed term in this field.
    pub doc_count: u32,
    /// Sum of field lengths across those documents.
    pub total_length: u64,
    /// `total_length / doc_count`, 0 when the field is empty.
    pub avg_length: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FieldIndex {
    /// term -> document id -> term frequency
    postings: HashMap<String, HashMap<String, TermFrequency>>,
    /// document id -> token count of this field
    lengths: HashMap<String, u32>,
    total_length: u64,
}

impl FieldIndex {
    fn purge(&mut self, doc_id: &str, terms: &[String]) {
        for term in terms {
            if let Some(list) = self.postings.get_mut(term) {
                list.remove(doc_id);
                if list.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        if let Some(len) = self.lengths.remove(doc_id) {
            self.total_length -= u64::from(len);
        }
    }
}

/// Multi-field inverted index mapping (field, term) to postings lists, with
/// length statistics maintained in lockstep with every postings mutation.
///
/// Mutation is single-writer (`&mut self`); the engine wraps the index in a
/// lock so readers never observe a document half-purged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    fields: HashMap<Field, FieldIndex>,
    /// Distinct terms currently indexed per (document, field). Drives the
    /// purge on re-ingest so no posting of a superseded version survives.
    doc_terms: HashMap<String, HashMap<Field, Vec<String>>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `terms` for one (document, field). Any postings the document
    /// already had in this field are replaced, not merged, which makes
    /// re-indexing the same record idempotent.
    pub fn add_terms(&mut self, doc_id: &str, field: Field, terms: &[String]) {
        self.purge_field(doc_id, field);
        if terms.is_empty() {
            return;
        }

        let mut counts: HashMap<&String, TermFrequency> = HashMap::new();
        for term in terms {
            *counts.entry(term).or_insert(0) += 1;
        }

        let fx = self.fields.entry(field).or_default();
        let mut distinct: Vec<String> = Vec::with_capacity(counts.len());
        for (term, tf) in counts {
            fx.postings
                .entry(term.clone())
                .or_default()
                .insert(doc_id.to_string(), tf);
            distinct.push(term.clone());
        }
        distinct.sort_unstable();
        let length = terms.len() as u32;
        fx.lengths.insert(doc_id.to_string(), length);
        fx.total_length += u64::from(length);

        self.doc_terms
            .entry(doc_id.to_string())
            .or_default()
            .insert(field, distinct);
    }

    /// Purge every posting of `doc_id` across all fields, updating length
    /// statistics. Unknown ids are a no-op.
    pub fn remove_document(&mut self, doc_id: &str) {
        let Some(per_field) = self.doc_terms.remove(doc_id) else {
            return;
        };
        for (field, terms) in per_field {
            if let Some(fx) = self.fields.get_mut(&field) {
                fx.purge(doc_id, &terms);
            }
        }
    }

    fn purge_field(&mut self, doc_id: &str, field: Field) {
        let Some(per_field) = self.doc_terms.get_mut(doc_id) else {
            return;
        };
        if let Some(terms) = per_field.remove(&field) {
            if let Some(fx) = self.fields.get_mut(&field) {
                fx.purge(doc_id, &terms);
            }
            if per_field.is_empty() {
                self.doc_terms.remove(doc_id);
            }
        }
    }

    /// Current postings list for (field, term), sorted by document id for
    /// deterministic iteration. An absent term yields an empty list.
    pub fn postings(&self, field: Field, term: &str) -> Vec<Posting> {
        let Some(list) = self.fields.get(&field).and_then(|fx| fx.postings.get(term)) else {
            return Vec::new();
        };
        let mut out: Vec<Posting> = list
            .iter()
            .map(|(doc_id, tf)| Posting {
                doc_id: doc_id.clone(),
                term_frequency: *tf,
            })
            .collect();
        out.sort_unstable_by(|a, b| a.doc_id.cmp(&b.doc_id));
        out
    }

    pub fn field_stats(&self, field: Field) -> FieldStats {
        let Some(fx) = self.fields.get(&field) else {
            return FieldStats::default();
        };
        let doc_count = fx.lengths.len() as u32;
        let avg_length = if doc_count == 0 {
            0.0
        } else {
            fx.total_length as f32 / doc_count as f32
        };
        FieldStats {
            doc_count,
            total_length: fx.total_length,
            avg_length,
        }
    }

    /// Token count of one document's field, 0 if the document has no
    /// postings there.
    pub fn field_length(&self, doc_id: &str, field: Field) -> u32 {
        self.fields
            .get(&field)
            .and_then(|fx| fx.lengths.get(doc_id))
            .copied()
            .unwrap_or(0)
    }

    /// Documents with postings in at least one field.
    pub fn doc_count(&self) -> usize {
        self.doc_terms.len()
    }

    /// Structural self-check used when loading a persisted segment: length
    /// totals must match the per-document lengths, and the per-document term
    /// registry must agree with the postings.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        for (field, fx) in &self.fields {
            let summed: u64 = fx.lengths.values().map(|l| u64::from(*l)).sum();
            if summed != fx.total_length {
                return Err(format!(
                    "field {}: total_length {} != summed lengths {}",
                    field.as_str(),
                    fx.total_length,
                    summed
                ));
            }
            for (term, list) in &fx.postings {
                for doc_id in list.keys() {
                    let registered = self
                        .doc_terms
                        .get(doc_id)
                        .and_then(|per_field| per_field.get(field))
                        .map_or(false, |terms| terms.binary_search(term).is_ok());
                    if !registered {
                        return Err(format!(
                            "field {}: posting for term {:?} references unregistered doc {}",
                            field.as_str(),
                            term,
                            doc_id
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
