use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::MatchError;
use crate::accents::normalize;
use crate::authors::record_authors;
use crate::record::BibRecord;

/// Scoring metric used by the match selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    /// Character-level Levenshtein distance over every shared field.
    #[default]
    EditDistance,
    /// Sequence-similarity ratio over canonical author list and title.
    Ratio,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::EditDistance => "edit-distance",
            Metric::Ratio => "ratio",
        }
    }
}

// =============================================================================
// Edit-distance mode
// =============================================================================

/// Levenshtein distance counted in characters, not bytes.
pub fn levenshtein(a: &str, b: &str) -> usize {
    rapidfuzz::distance::levenshtein::distance(a.chars(), b.chars())
}

/// Per-field edit distances between two records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldDistances {
    pub per_field: BTreeMap<String, usize>,
    pub sum: usize,
}

impl FieldDistances {
    /// Number of fields present in both records and compared.
    pub fn n_compared(&self) -> usize {
        self.per_field.len()
    }

    /// Mean distance per compared field; `None` if nothing was comparable.
    pub fn average(&self) -> Option<f64> {
        match self.n_compared() {
            0 => None,
            n => Some(self.sum as f64 / n as f64),
        }
    }
}

/// Compare every field present in both records (restricted to `only`, if
/// given) by Levenshtein distance of the raw values.
pub fn edit_distances(old: &BibRecord, new: &BibRecord, only: Option<&[String]>) -> FieldDistances {
    let mut out = FieldDistances::default();
    for (name, old_value) in &old.fields {
        if only.is_some_and(|fields| !fields.iter().any(|f| f == name)) {
            continue;
        }
        let Some(new_value) = new.get(name) else {
            continue;
        };
        let d = levenshtein(old_value, new_value);
        out.sum += d;
        out.per_field.insert(name.clone(), d);
    }
    out
}

// =============================================================================
// Ratio mode
// =============================================================================

/// Similarity ratio in `[0, 1]` based on the longest common subsequence,
/// `2 * matches / (len(a) + len(b))`. Symmetric; two empty strings are
/// identical, an empty string against a non-empty one scores 0.
///
/// This is rapidfuzz's indel ratio, not a longest-matching-blocks ratio.
/// The two agree on identical and disjoint strings; on partial overlaps the
/// indel ratio can be higher, since matches need not form contiguous blocks.
pub fn ratio(a: &str, b: &str) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => rapidfuzz::fuzz::ratio(a.chars(), b.chars()),
    }
}

/// Text prepared for ratio comparison: accents normalized, braces dropped,
/// lower-cased, all whitespace removed.
pub fn comparison_text(text: &str) -> String {
    normalize(text)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '{' && *c != '}')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Author and title text of one record, prepared once and reused for every
/// pair the record takes part in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatioText {
    pub authors: Option<String>,
    pub title: Option<String>,
}

impl RatioText {
    pub fn from_record(record: &BibRecord) -> Result<Self, MatchError> {
        let names = record_authors(record)?;
        let authors = if names.is_empty() {
            None
        } else {
            Some(comparison_text(&names.join(",")))
        };
        let title = record.value("title").map(comparison_text);
        Ok(Self { authors, title })
    }
}

/// Author and title ratios for a pair; a field missing on either side is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatioScores {
    pub author: Option<f64>,
    pub title: Option<f64>,
}

impl RatioScores {
    pub fn between(old: &RatioText, new: &RatioText) -> Self {
        let pair = |a: &Option<String>, b: &Option<String>| match (a, b) {
            (Some(a), Some(b)) => Some(ratio(a, b)),
            _ => None,
        };
        Self {
            author: pair(&old.authors, &new.authors),
            title: pair(&old.title, &new.title),
        }
    }

    pub fn n_compared(&self) -> usize {
        self.author.is_some() as usize + self.title.is_some() as usize
    }

    /// `1 - mean(ratio)` over compared fields, so lower is better as in
    /// edit-distance mode.
    pub fn distance(&self) -> Option<f64> {
        let scores: Vec<f64> = self.author.into_iter().chain(self.title).collect();
        if scores.is_empty() {
            return None;
        }
        Some(1.0 - scores.iter().sum::<f64>() / scores.len() as f64)
    }
}
