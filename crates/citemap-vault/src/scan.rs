use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use citemap_core::{AuthorFormat, BibRecord, MatchError, RecordSet, strip_doi_prefix};

use crate::VaultError;
use crate::frontmatter::{FrontMatter, read_front_matter};

/// Which files count as literature notes and how their headers are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Marker starting every literature-note file name.
    pub key_prefix: String,
    /// Note file extension, without the dot.
    pub note_extension: String,
    /// Header field renames, e.g. `authors` -> `author`.
    pub field_aliases: BTreeMap<String, String>,
    /// Abort on the first malformed header instead of skipping the note.
    pub strict: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        let mut field_aliases = BTreeMap::new();
        field_aliases.insert("authors".to_string(), "author".to_string());
        Self {
            key_prefix: "@".to_string(),
            note_extension: "md".to_string(),
            field_aliases,
            strict: false,
        }
    }
}

/// Result of scanning a vault for literature notes.
#[derive(Debug, Default)]
pub struct VaultScan {
    /// Old records keyed by citation key (file stem without the prefix).
    pub records: RecordSet,
    /// Note file backing each key.
    pub paths: BTreeMap<String, PathBuf>,
    /// Notes skipped because their header was malformed.
    pub skipped: Vec<MatchError>,
}

/// Walk `dir` recursively and load every literature note's header as a record.
///
/// Two notes with the same key abort the scan. Malformed headers are logged
/// and skipped unless `options.strict` is set.
pub fn scan_vault(dir: &Path, options: &ScanOptions) -> Result<VaultScan, VaultError> {
    let mut notes = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(key) = note_key(entry.path(), options) {
            notes.push((key, entry.into_path()));
        }
    }
    tracing::debug!(dir = %dir.display(), notes = notes.len(), "found literature notes");

    let loaded: Vec<(String, PathBuf, Result<FrontMatter, VaultError>)> = notes
        .into_par_iter()
        .map(|(key, path)| {
            let header = read_front_matter(&path);
            (key, path, header)
        })
        .collect();

    let mut scan = VaultScan::default();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    for (key, path, header) in loaded {
        if let Some(first) = seen.get(&key) {
            return Err(MatchError::DuplicateKey {
                key,
                paths: vec![first.clone(), path],
            }
            .into());
        }
        seen.insert(key.clone(), path.clone());

        let header = match header {
            Ok(h) => h,
            Err(VaultError::Match(e @ MatchError::Structural { .. })) if !options.strict => {
                tracing::warn!(path = %path.display(), error = %e, "skipping note with malformed header");
                scan.skipped.push(e);
                continue;
            }
            Err(e) => return Err(e),
        };

        scan.records.insert(note_record(&key, header, options))?;
        scan.paths.insert(key, path);
    }

    tracing::info!(
        loaded = scan.records.len(),
        skipped = scan.skipped.len(),
        "vault scan complete"
    );
    Ok(scan)
}

/// Citation key for a note path, or `None` if the file is not a literature note.
fn note_key(path: &Path, options: &ScanOptions) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if ext != options.note_extension {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let key = stem.strip_prefix(options.key_prefix.as_str())?;
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

fn note_record(key: &str, header: FrontMatter, options: &ScanOptions) -> BibRecord {
    let mut record = BibRecord::new(key).with_author_format(AuthorFormat::Joined);
    for (name, value) in header {
        let name = name.to_lowercase();
        let name = options.field_aliases.get(&name).cloned().unwrap_or(name);
        if name == "doi" {
            record.insert(&name, strip_doi_prefix(&value));
        } else {
            record.insert(&name, value);
        }
    }
    record
}
