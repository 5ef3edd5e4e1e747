use std::path::PathBuf;

use thiserror::Error;

pub mod accents;
pub mod authors;
pub mod config_file;
pub mod gate;
pub mod matching;
pub mod record;
pub mod similarity;

// Re-export for convenience
pub use accents::normalize;
pub use authors::{canonicalize, parse_author_list};
pub use gate::{GateDecision, comparable, gate, strip_doi_prefix};
pub use matching::{
    CandidatePair, MatchConfig, MatchMapping, MatchOutcome, MatchStats, PairScore,
    best_candidates, candidate_pairs, match_records, select, unmatched,
};
pub use record::{AuthorFormat, BibRecord, RecordSet};
pub use similarity::{FieldDistances, Metric, RatioScores, levenshtein, ratio};

/// Error kinds raised while loading and matching bibliographic records.
///
/// Variants carry structured context rather than pre-rendered messages so
/// callers can filter (e.g. skip `Structural` in non-strict scans) or format
/// them however they like.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// A note's front-matter does not have the expected shape.
    #[error(
        "invalid note {}, found {line:?}, expected {expected} on line {line_number}",
        .file.display()
    )]
    Structural {
        file: PathBuf,
        line: String,
        expected: String,
        line_number: usize,
    },
    /// Two sources resolve to the same citation key. `paths` lists the
    /// colliding note files when the records came from disk.
    #[error("duplicate citation key {key}")]
    DuplicateKey { key: String, paths: Vec<PathBuf> },
    /// An author list ends while a brace group is still open.
    #[error("unclosed brace group in author list {input:?}")]
    UnclosedGroup { input: String },
    /// A record lacks a field needed to take part in matching.
    #[error("record {key} has no {field} field")]
    MissingField { key: String, field: String },
}
