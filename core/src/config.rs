use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::document::Field;
use crate::error::Result;

/// Multiplicative per-field weights applied to BM25F contributions.
/// Title matches outrank author matches, which outrank type matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldBoosts {
    pub title: f32,
    pub authors: f32,
    pub publication_type: f32,
}

impl Default for FieldBoosts {
    fn default() -> Self {
        FieldBoosts {
            title: 1.3,
            authors: 1.0,
            publication_type: 0.8,
        }
    }
}

/// Ranking parameters, tunable without code changes via a JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Field-length normalization strength.
    pub b: f32,
    pub boosts: FieldBoosts,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            k1: 1.2,
            b: 0.75,
            boosts: FieldBoosts::default(),
        }
    }
}

impl SearchConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn boost(&self, field: Field) -> f32 {
        match field {
            Field::Title => self.boosts.title,
            Field::Authors => self.boosts.authors,
            Field::PublicationType => self.boosts.publication_type,
        }
    }
}
