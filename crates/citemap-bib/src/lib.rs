use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use citemap_core::{AuthorFormat, BibRecord, RecordSet, strip_doi_prefix};

#[derive(Error, Debug)]
pub enum BibError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no BibTeX entries found")]
    NoEntries,
}

/// Fields whose braces are delimiters only, never case protection.
const VERBATIM_FIELDS: &[&str] = &["doi", "eprint", "file", "pdf", "url", "urlraw"];

/// Load the entries of a .bib file as records keyed by citation key.
pub fn load_bib(path: &Path) -> Result<RecordSet, BibError> {
    let content = std::fs::read_to_string(path)?;
    parse_bib_str(&content)
}

/// Parse .bib content from a string.
///
/// Uses the `biblatex` crate. If the whole file does not parse, each `@entry`
/// is parsed on its own and the ones that fail are skipped.
pub fn parse_bib_str(content: &str) -> Result<RecordSet, BibError> {
    let records = match biblatex::Bibliography::parse(content) {
        Ok(bibliography) => bibliography.iter().map(entry_to_record).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "bibliography did not parse as a whole, parsing entries one by one");
            parse_entries_individually(content)
        }
    };

    if records.is_empty() {
        return Err(BibError::NoEntries);
    }
    Ok(collect_unique(records))
}

/// Split .bib content at `@type` lines and parse each chunk separately.
fn parse_entries_individually(content: &str) -> Vec<BibRecord> {
    static ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^@[a-zA-Z]").unwrap());

    let positions: Vec<usize> = ENTRY_RE.find_iter(content).map(|m| m.start()).collect();
    let mut records = Vec::new();

    for (i, &start) in positions.iter().enumerate() {
        let end = positions.get(i + 1).copied().unwrap_or(content.len());
        let chunk = &content[start..end];

        match biblatex::Bibliography::parse(chunk) {
            Ok(bib) => records.extend(bib.iter().map(entry_to_record)),
            Err(e) => {
                let head = chunk.lines().next().unwrap_or_default();
                tracing::warn!(entry = head, error = %e, "skipping unparseable entry");
            }
        }
    }
    records
}

/// Keep the first record for each key; later duplicates are dropped.
fn collect_unique(records: Vec<BibRecord>) -> RecordSet {
    let mut set = RecordSet::new();
    for record in records {
        let key = record.key.clone();
        if set.insert(record).is_err() {
            tracing::warn!(key = %key, "duplicate key in bibliography, keeping first entry");
        }
    }
    set
}

fn entry_to_record(entry: &biblatex::Entry) -> BibRecord {
    let mut record = BibRecord::new(entry.key.clone()).with_author_format(AuthorFormat::BibTeX);
    for (name, chunks) in &entry.fields {
        let name = name.to_lowercase();
        let verbatim = VERBATIM_FIELDS.contains(&name.as_str());
        let mut value = chunks_to_raw(chunks, verbatim);
        if name == "doi" {
            value = strip_doi_prefix(&value).to_string();
        }
        record.insert(&name, value);
    }
    record
}

/// Rebuild field text from biblatex chunks.
///
/// Brace-protected chunks get their braces back so the author parser can
/// still see `{Barnes and Noble}` as one group. Fields in `VERBATIM_FIELDS`
/// are joined as-is.
fn chunks_to_raw(chunks: &[biblatex::Spanned<biblatex::Chunk>], verbatim: bool) -> String {
    let mut out = String::new();
    for c in chunks {
        match &c.v {
            biblatex::Chunk::Normal(s) => out.push_str(s),
            biblatex::Chunk::Verbatim(s) if verbatim => out.push_str(s),
            biblatex::Chunk::Verbatim(s) => {
                out.push('{');
                out.push_str(s);
                out.push('}');
            }
            biblatex::Chunk::Math(s) => {
                out.push('$');
                out.push_str(s);
                out.push('$');
            }
        }
    }
    out
}
