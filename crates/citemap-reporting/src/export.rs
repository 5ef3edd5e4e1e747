use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use citemap_core::{CandidatePair, MatchMapping, Metric, PairScore};

use crate::ReportError;

/// Write the old -> new key mapping as an indented JSON object, keys sorted.
pub fn write_mapping(path: &Path, mapping: &MatchMapping) -> Result<(), ReportError> {
    let mut content = serde_json::to_string_pretty(mapping).map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    content.push('\n');
    write_file(path, &content)?;
    tracing::debug!(path = %path.display(), entries = mapping.len(), "wrote mapping");
    Ok(())
}

/// Read a mapping written by [`write_mapping`] (or any flat JSON object of strings).
pub fn read_mapping(path: &Path) -> Result<MatchMapping, ReportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Re-key both sides of `mapping` with the vault's citation-key prefix.
pub fn prefixed(mapping: &MatchMapping, prefix: &str) -> MatchMapping {
    mapping
        .iter()
        .map(|(old, new)| (format!("{prefix}{old}"), format!("{prefix}{new}")))
        .collect()
}

pub fn write_distance_table(
    path: &Path,
    pairs: &[CandidatePair],
    metric: Metric,
) -> Result<(), ReportError> {
    write_file(path, &distance_table_csv(pairs, metric))?;
    tracing::debug!(path = %path.display(), rows = pairs.len(), "wrote distance table");
    Ok(())
}

/// One CSV row per candidate pair, for review by hand instead of selection.
///
/// Edit-distance tables get one trailing column per field compared by any
/// pair; cells are empty where a pair did not compare that field.
pub fn distance_table_csv(pairs: &[CandidatePair], metric: Metric) -> String {
    match metric {
        Metric::EditDistance => edit_distance_csv(pairs),
        Metric::Ratio => ratio_csv(pairs),
    }
}

fn edit_distance_csv(pairs: &[CandidatePair]) -> String {
    let fields: BTreeSet<&str> = pairs
        .iter()
        .filter_map(|p| match &p.score {
            PairScore::EditDistance(d) => Some(d.per_field.keys().map(String::as_str)),
            PairScore::Ratio(_) => None,
        })
        .flatten()
        .collect();

    let mut out = String::from("old_key,new_key,n_compared,sum_distance,avg_distance");
    for field in &fields {
        out.push(',');
        out.push_str(&csv_escape(field));
    }
    out.push('\n');

    for pair in pairs {
        let PairScore::EditDistance(d) = &pair.score else {
            continue;
        };
        let _ = write!(
            out,
            "{},{},{},{},{}",
            csv_escape(&pair.old_key),
            csv_escape(&pair.new_key),
            d.n_compared(),
            d.sum,
            d.average().map(|a| format!("{a:.4}")).unwrap_or_default(),
        );
        for field in &fields {
            out.push(',');
            if let Some(dist) = d.per_field.get(*field) {
                let _ = write!(out, "{dist}");
            }
        }
        out.push('\n');
    }
    out
}

fn ratio_csv(pairs: &[CandidatePair]) -> String {
    let mut out = String::from("old_key,new_key,author_ratio,title_ratio,distance\n");
    let cell = |v: Option<f64>| v.map(|v| format!("{v:.4}")).unwrap_or_default();
    for pair in pairs {
        let PairScore::Ratio(r) = &pair.score else {
            continue;
        };
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            csv_escape(&pair.old_key),
            csv_escape(&pair.new_key),
            cell(r.author),
            cell(r.title),
            cell(r.distance()),
        );
    }
    out
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ReportError> {
    std::fs::write(path, content).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
