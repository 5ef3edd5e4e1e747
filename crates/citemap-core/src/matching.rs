//! Pairwise scoring of old (vault) records against new (bibliography)
//! records, and selection of one new key per old key.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::MatchError;
use crate::gate::gate;
use crate::record::{BibRecord, RecordSet};
use crate::similarity::{FieldDistances, Metric, RatioScores, RatioText, edit_distances};

/// Old citation key → chosen new citation key. Sorted by old key.
pub type MatchMapping = BTreeMap<String, String>;

/// Runtime configuration of a matching run.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub metric: Metric,
    /// Fields a new record must carry to be considered as a candidate at all.
    pub required_fields: Vec<String>,
    /// Restrict edit-distance mode to these fields (default: every shared field).
    pub compare_fields: Option<Vec<String>>,
    /// Worker threads for the pairwise pass; 1 runs on the calling thread.
    pub jobs: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            metric: Metric::EditDistance,
            required_fields: vec!["year".into(), "author".into(), "title".into()],
            compare_fields: None,
            jobs: 1,
        }
    }
}

/// Similarity of one (old, new) pair under the configured metric.
#[derive(Debug, Clone, PartialEq)]
pub enum PairScore {
    EditDistance(FieldDistances),
    Ratio(RatioScores),
}

impl PairScore {
    /// Aggregate distance used for selection; lower is better.
    pub fn distance(&self) -> f64 {
        match self {
            PairScore::EditDistance(d) => d.average().unwrap_or(f64::INFINITY),
            PairScore::Ratio(r) => r.distance().unwrap_or(f64::INFINITY),
        }
    }

    pub fn n_compared(&self) -> usize {
        match self {
            PairScore::EditDistance(d) => d.n_compared(),
            PairScore::Ratio(r) => r.n_compared(),
        }
    }
}

/// A pair that passed the identifier gate and had at least one comparable field.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub old_key: String,
    pub new_key: String,
    pub score: PairScore,
}

/// Counters describing a matching run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub old_total: usize,
    pub new_total: usize,
    /// New records dropped as candidates, by the first required field they lacked.
    pub new_missing_field: BTreeMap<String, usize>,
    /// Records whose author list could not be parsed (ratio mode).
    pub old_unparseable: usize,
    pub new_unparseable: usize,
    pub gate_rejections: usize,
    /// Gate-passing pairs with nothing to compare.
    pub incomparable: usize,
    pub pairs: usize,
    pub matched: usize,
}

impl MatchStats {
    pub fn unmatched(&self) -> usize {
        self.old_total - self.matched
    }
}

/// Everything a matching run produces.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub mapping: MatchMapping,
    pub pairs: Vec<CandidatePair>,
    pub stats: MatchStats,
}

/// A record ready to be scored, with any per-record preprocessing done.
struct Prepared<'a> {
    record: &'a BibRecord,
    ratio_text: Option<RatioText>,
}

fn prepare(record: &BibRecord, metric: Metric) -> Result<Prepared<'_>, MatchError> {
    let ratio_text = match metric {
        Metric::EditDistance => None,
        Metric::Ratio => Some(RatioText::from_record(record)?),
    };
    Ok(Prepared { record, ratio_text })
}

fn first_missing_field<'f>(record: &BibRecord, required: &'f [String]) -> Option<&'f str> {
    required
        .iter()
        .find(|f| !record.has(f))
        .map(String::as_str)
}

/// Per-old-record result of the pairwise pass.
#[derive(Default)]
struct Partial {
    pairs: Vec<CandidatePair>,
    gate_rejections: usize,
    incomparable: usize,
}

fn score_old(old: &Prepared<'_>, candidates: &[Prepared<'_>], config: &MatchConfig) -> Partial {
    let mut partial = Partial::default();
    for new in candidates {
        let decision = gate(old.record, new.record);
        if !decision.passes() {
            partial.gate_rejections += 1;
            tracing::trace!(
                old = %old.record.key,
                new = %new.record.key,
                rule = decision.as_str(),
                "rejected by identifier gate"
            );
            continue;
        }

        let score = match (&old.ratio_text, &new.ratio_text) {
            (Some(a), Some(b)) => PairScore::Ratio(RatioScores::between(a, b)),
            _ => PairScore::EditDistance(edit_distances(
                old.record,
                new.record,
                config.compare_fields.as_deref(),
            )),
        };
        if score.n_compared() == 0 {
            partial.incomparable += 1;
            continue;
        }

        partial.pairs.push(CandidatePair {
            old_key: old.record.key.clone(),
            new_key: new.record.key.clone(),
            score,
        });
    }
    partial
}

/// Build every candidate pair between `old` and `new`.
///
/// New records lacking a required field, and (in ratio mode) records whose
/// author list does not parse, are excluded before any pair is formed. Pairs
/// are returned grouped by old record, in old-record then new-record order;
/// the result does not depend on `config.jobs`.
pub fn candidate_pairs(
    old: &RecordSet,
    new: &RecordSet,
    config: &MatchConfig,
) -> (Vec<CandidatePair>, MatchStats) {
    let mut stats = MatchStats {
        old_total: old.len(),
        new_total: new.len(),
        ..Default::default()
    };

    let mut candidates = Vec::with_capacity(new.len());
    for record in new {
        if let Some(field) = first_missing_field(record, &config.required_fields) {
            let err = MatchError::MissingField {
                key: record.key.clone(),
                field: field.to_string(),
            };
            tracing::debug!(reason = %err, "skipping candidate");
            *stats.new_missing_field.entry(field.to_string()).or_default() += 1;
            continue;
        }
        match prepare(record, config.metric) {
            Ok(p) => candidates.push(p),
            Err(err) => {
                tracing::debug!(key = %record.key, reason = %err, "skipping candidate");
                stats.new_unparseable += 1;
            }
        }
    }

    let mut sources = Vec::with_capacity(old.len());
    for record in old {
        match prepare(record, config.metric) {
            Ok(p) => sources.push(p),
            Err(err) => {
                tracing::debug!(key = %record.key, reason = %err, "skipping old record");
                stats.old_unparseable += 1;
            }
        }
    }

    let partials = run_partitioned(&sources, &candidates, config);

    let mut pairs = Vec::new();
    for partial in partials {
        stats.gate_rejections += partial.gate_rejections;
        stats.incomparable += partial.incomparable;
        pairs.extend(partial.pairs);
    }
    stats.pairs = pairs.len();
    (pairs, stats)
}

fn run_partitioned(
    sources: &[Prepared<'_>],
    candidates: &[Prepared<'_>],
    config: &MatchConfig,
) -> Vec<Partial> {
    let serial = || {
        sources
            .iter()
            .map(|old| score_old(old, candidates, config))
            .collect::<Vec<_>>()
    };

    if config.jobs <= 1 {
        return serial();
    }

    match rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()
    {
        Ok(pool) => pool.install(|| {
            sources
                .par_iter()
                .map(|old| score_old(old, candidates, config))
                .collect()
        }),
        Err(e) => {
            tracing::warn!(error = %e, "failed to start worker pool, matching serially");
            serial()
        }
    }
}

/// Pick, for each old key, the candidate with the smallest distance.
///
/// Exact ties go to the lexicographically smallest new key, so the result is
/// independent of input order.
pub fn best_candidates(pairs: &[CandidatePair]) -> MatchMapping {
    let mut best: BTreeMap<&str, (&str, f64)> = BTreeMap::new();
    for pair in pairs {
        let distance = pair.score.distance();
        let entry = best
            .entry(pair.old_key.as_str())
            .or_insert((pair.new_key.as_str(), distance));
        let better = match distance.total_cmp(&entry.1) {
            Ordering::Less => true,
            Ordering::Equal => pair.new_key.as_str() < entry.0,
            Ordering::Greater => false,
        };
        if better {
            *entry = (pair.new_key.as_str(), distance);
        }
    }
    best.into_iter()
        .map(|(old, (new, _))| (old.to_string(), new.to_string()))
        .collect()
}

/// Score all pairs and select the best new key for each old key.
pub fn match_records(old: &RecordSet, new: &RecordSet, config: &MatchConfig) -> MatchOutcome {
    let (pairs, mut stats) = candidate_pairs(old, new, config);
    let mapping = best_candidates(&pairs);
    stats.matched = mapping.len();

    tracing::info!(
        old = stats.old_total,
        new = stats.new_total,
        pairs = stats.pairs,
        matched = stats.matched,
        gate_rejections = stats.gate_rejections,
        metric = config.metric.as_str(),
        "matching complete"
    );

    MatchOutcome {
        mapping,
        pairs,
        stats,
    }
}

/// Mapping only; old records without any surviving candidate are absent.
pub fn select(old: &RecordSet, new: &RecordSet, config: &MatchConfig) -> MatchMapping {
    match_records(old, new, config).mapping
}

/// Old keys that received no mapping, in old-record order.
pub fn unmatched<'a>(old: &'a RecordSet, mapping: &MatchMapping) -> Vec<&'a str> {
    old.keys().filter(|k| !mapping.contains_key(*k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuthorFormat;

    fn new_rec(key: &str, year: &str, author: &str, title: &str) -> BibRecord {
        BibRecord::new(key)
            .with_field("year", year)
            .with_field("author", author)
            .with_field("title", title)
    }

    fn old_rec(key: &str, year: &str, author: &str, title: &str) -> BibRecord {
        new_rec(key, year, author, title).with_author_format(AuthorFormat::Joined)
    }

    fn set(records: Vec<BibRecord>) -> RecordSet {
        RecordSet::from_records(records).unwrap()
    }

    fn ratio_config() -> MatchConfig {
        MatchConfig {
            metric: Metric::Ratio,
            ..MatchConfig::default()
        }
    }

    // =========================================================================
    // Selection
    // =========================================================================

    #[test]
    fn test_selects_closest_title() {
        let old = set(vec![old_rec("doe01", "2001", "Jane Doe", "A Study")]);
        let new = set(vec![
            new_rec("Doe2001b", "2001", "Doe, Jane", "Another Thing Entirely"),
            new_rec("Doe2001a", "2001", "Doe, Jane", "A Study"),
        ]);
        for config in [MatchConfig::default(), ratio_config()] {
            let mapping = select(&old, &new, &config);
            assert_eq!(mapping.get("doe01").map(String::as_str), Some("Doe2001a"));
        }
    }

    #[test]
    fn test_doi_match_overrides_text_similarity() {
        let old = set(vec![
            old_rec("doe01", "2001", "Jane Doe", "A Study").with_field("doi", "10.1/right"),
        ]);
        let new = set(vec![
            new_rec("Lookalike", "2001", "Doe, Jane", "A Study").with_field("doi", "10.1/wrong"),
            new_rec("Real", "2001", "Doe, Jane", "Completely Retitled Paper")
                .with_field("doi", "10.1/right"),
        ]);
        for config in [MatchConfig::default(), ratio_config()] {
            let outcome = match_records(&old, &new, &config);
            assert_eq!(outcome.mapping["doe01"], "Real");
            assert_eq!(outcome.pairs.len(), 1);
            assert_eq!(outcome.stats.gate_rejections, 1);
        }
    }

    #[test]
    fn test_no_candidate_means_absent() {
        let old = set(vec![
            old_rec("a", "2001", "Jane Doe", "A Study"),
            old_rec("b", "1990", "John Roe", "Old Work"),
        ]);
        let new = set(vec![new_rec("A", "2001", "Doe, Jane", "A Study")]);
        let outcome = match_records(&old, &new, &MatchConfig::default());
        assert_eq!(outcome.mapping.len(), 1);
        assert!(!outcome.mapping.contains_key("b"));
        assert_eq!(unmatched(&old, &outcome.mapping), vec!["b"]);
        assert_eq!(outcome.stats.unmatched(), 1);
    }

    #[test]
    fn test_tie_goes_to_smallest_key() {
        let old = set(vec![old_rec("a", "2001", "Jane Doe", "A Study")]);
        let forward = set(vec![
            new_rec("zeta", "2001", "Jane Doe", "A Study"),
            new_rec("alpha", "2001", "Jane Doe", "A Study"),
        ]);
        let backward = set(vec![
            new_rec("alpha", "2001", "Jane Doe", "A Study"),
            new_rec("zeta", "2001", "Jane Doe", "A Study"),
        ]);
        for config in [MatchConfig::default(), ratio_config()] {
            assert_eq!(select(&old, &forward, &config)["a"], "alpha");
            assert_eq!(select(&old, &backward, &config)["a"], "alpha");
        }
    }

    #[test]
    fn test_best_candidates_prefers_lower_distance() {
        let pair = |new: &str, sum: usize| {
            let mut d = FieldDistances::default();
            d.per_field.insert("title".into(), sum);
            d.sum = sum;
            CandidatePair {
                old_key: "o".into(),
                new_key: new.into(),
                score: PairScore::EditDistance(d),
            }
        };
        let mapping = best_candidates(&[pair("a", 5), pair("b", 1), pair("c", 3)]);
        assert_eq!(mapping["o"], "b");
    }

    // =========================================================================
    // Candidate filtering
    // =========================================================================

    #[test]
    fn test_missing_required_field_skips_candidate() {
        let old = set(vec![old_rec("a", "2001", "Jane Doe", "A Study")]);
        let new = set(vec![
            BibRecord::new("NoYear")
                .with_field("author", "Jane Doe")
                .with_field("title", "A Study"),
        ]);
        let outcome = match_records(&old, &new, &MatchConfig::default());
        assert!(outcome.mapping.is_empty());
        assert_eq!(outcome.stats.new_missing_field.get("year"), Some(&1));
    }

    #[test]
    fn test_unparseable_authors_excluded_in_ratio_mode() {
        let old = set(vec![old_rec("a", "2001", "Jane Doe", "A Study")]);
        let new = set(vec![
            new_rec("Broken", "2001", "{Unclosed and Jane Doe", "A Study"),
            new_rec("Fine", "2001", "Doe, Jane", "A Stdy"),
        ]);
        let outcome = match_records(&old, &new, &ratio_config());
        assert_eq!(outcome.mapping["a"], "Fine");
        assert_eq!(outcome.stats.new_unparseable, 1);
    }

    #[test]
    fn test_pairs_without_shared_fields_dropped() {
        let old = set(vec![BibRecord::new("a").with_field("tags", "x")]);
        let new = set(vec![new_rec("A", "2001", "Jane Doe", "A Study")]);
        let outcome = match_records(&old, &new, &MatchConfig::default());
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.stats.incomparable, 1);
    }

    #[test]
    fn test_every_pair_passed_gate() {
        let old = set(vec![
            old_rec("a", "2001", "Jane Doe", "A Study"),
            old_rec("b", "2002", "John Roe", "B Study"),
        ]);
        let new = set(vec![
            new_rec("A", "2001", "Jane Doe", "A Study"),
            new_rec("B", "2002", "John Roe", "B Study"),
            new_rec("C", "2002", "Jim Poe", "C Study"),
        ]);
        let (pairs, stats) = candidate_pairs(&old, &new, &MatchConfig::default());
        for p in &pairs {
            let o = old.get(&p.old_key).unwrap();
            let n = new.get(&p.new_key).unwrap();
            assert!(crate::gate::comparable(o, n));
        }
        assert_eq!(pairs.len(), 3);
        assert_eq!(stats.gate_rejections, 3);
    }

    // =========================================================================
    // Parallel run
    // =========================================================================

    #[test]
    fn test_parallel_matches_serial() {
        let old = set(
            (0..20)
                .map(|i| old_rec(&format!("o{i}"), "2001", "Jane Doe", &format!("Study {i}")))
                .collect(),
        );
        let new = set(
            (0..20)
                .map(|i| new_rec(&format!("n{i}"), "2001", "Doe, Jane", &format!("Study {i}")))
                .collect(),
        );
        let serial = match_records(&old, &new, &MatchConfig::default());
        let parallel = match_records(
            &old,
            &new,
            &MatchConfig {
                jobs: 4,
                ..MatchConfig::default()
            },
        );
        assert_eq!(serial.mapping, parallel.mapping);
        assert_eq!(serial.pairs, parallel.pairs);
        assert_eq!(serial.mapping["o7"], "n7");
    }
}
