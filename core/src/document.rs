use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// One publication as emitted by the acquisition layer and stored verbatim.
///
/// `id`, `title` and `url` are required; everything else may be absent in the
/// source markup. Records sharing an `id` describe the same logical
/// publication and the later one supersedes the earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Profile URLs, index-aligned with `authors`; may be shorter or empty.
    #[serde(default)]
    pub author_links: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub url: String,
    #[serde(default)]
    pub publication_type: String,
    /// RFC 3339 timestamp of the crawl that produced this record.
    #[serde(default)]
    pub crawled_at: String,
}

impl DocumentRecord {
    /// Reject records missing a required field before they reach the index.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::MalformedRecord("missing id".into()));
        }
        if self.title.trim().is_empty() {
            return Err(Error::MalformedRecord(format!("missing title (id {})", self.id)));
        }
        if self.url.trim().is_empty() {
            return Err(Error::MalformedRecord(format!("missing url (id {})", self.id)));
        }
        Ok(())
    }

    /// Raw text of a searchable field, joined for multi-valued fields.
    pub fn field_text(&self, field: Field) -> String {
        match field {
            Field::Title => self.title.clone(),
            Field::Authors => self.authors.join(" "),
            Field::PublicationType => self.publication_type.clone(),
        }
    }
}

/// Deterministic document id: lowercase hex SHA-1 over `title + url`, so
/// re-crawling an unchanged source page maps to the same id.
pub fn stable_id(title: &str, url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(title.as_bytes());
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The full-text-scored fields of a record. `year`, `url`, `author_links`
/// and `crawled_at` are stored and sortable but never tokenized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Authors,
    PublicationType,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Title, Field::Authors, Field::PublicationType];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Authors => "authors",
            Field::PublicationType => "publication_type",
        }
    }
}
