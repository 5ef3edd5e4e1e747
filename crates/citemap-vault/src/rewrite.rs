use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use walkdir::WalkDir;

use citemap_core::MatchMapping;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("vault walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("rename target {} already exists", .0.display())]
    TargetExists(PathBuf),
}

/// `[[target]]`, `[[target|alias]]` or `[[target#heading]]`; group 2 keeps
/// the alias/heading suffix.
static WIKI_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]|#\n]+)((?:[|#][^\[\]\n]*)?)\]\]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Only files with this extension are scanned and renamed.
    pub note_extension: String,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            note_extension: "md".to_string(),
        }
    }
}

/// One rewritten link. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEdit {
    pub line: usize,
    pub from: String,
    pub to: String,
}

/// Pending changes to a single note file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    /// New file content, present when at least one link changed.
    pub content: Option<String>,
    pub edits: Vec<LinkEdit>,
    pub rename: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewritePlan {
    pub changes: Vec<FileChange>,
    pub files_scanned: usize,
}

impl RewritePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn link_count(&self) -> usize {
        self.changes.iter().map(|c| c.edits.len()).sum()
    }

    pub fn rename_count(&self) -> usize {
        self.changes.iter().filter(|c| c.rename.is_some()).count()
    }
}

/// What `apply_plan` actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub files_written: usize,
    pub links_rewritten: usize,
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Renames skipped because their target was taken.
    pub conflicts: Vec<(PathBuf, PathBuf)>,
}

/// Rewrite every wiki-link whose target is a key of `mapping`.
///
/// `mapping` must already carry the vault prefix on both sides
/// (`@old -> @new`). Returns the new text and the edits in file order.
pub fn rewrite_links(content: &str, mapping: &MatchMapping) -> (String, Vec<LinkEdit>) {
    let mut out = String::with_capacity(content.len());
    let mut edits = Vec::new();

    for (i, line) in content.split_inclusive('\n').enumerate() {
        let rewritten = WIKI_LINK_RE.replace_all(line, |caps: &Captures| match mapping.get(&caps[1]) {
            Some(new) => {
                edits.push(LinkEdit {
                    line: i + 1,
                    from: caps[1].to_string(),
                    to: new.clone(),
                });
                format!("[[{new}{}]]", &caps[2])
            }
            None => caps[0].to_string(),
        });
        out.push_str(&rewritten);
    }
    (out, edits)
}

/// Scan every note under `vault_dir` and collect the link rewrites and
/// renames `mapping` implies, without touching the filesystem.
///
/// Entries that map a key to itself are ignored.
pub fn plan_rewrite(
    vault_dir: &Path,
    mapping: &MatchMapping,
    options: &RewriteOptions,
) -> Result<RewritePlan, RewriteError> {
    let mapping: MatchMapping = mapping
        .iter()
        .filter(|(old, new)| old != new)
        .map(|(old, new)| (old.clone(), new.clone()))
        .collect();
    let mut plan = RewritePlan::default();

    for entry in WalkDir::new(vault_dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(options.note_extension.as_str())
        {
            continue;
        }
        plan.files_scanned += 1;

        let text = std::fs::read_to_string(path).map_err(|source| RewriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (new_text, edits) = rewrite_links(&text, &mapping);

        let rename = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| mapping.get(stem))
            .map(|new| path.with_file_name(format!("{new}.{}", options.note_extension)))
            .filter(|target| target.as_path() != path);

        if edits.is_empty() && rename.is_none() {
            continue;
        }
        plan.changes.push(FileChange {
            path: path.to_path_buf(),
            content: (!edits.is_empty()).then_some(new_text),
            edits,
            rename,
        });
    }

    tracing::debug!(
        scanned = plan.files_scanned,
        links = plan.link_count(),
        renames = plan.rename_count(),
        "rewrite planned"
    );
    Ok(plan)
}

/// Write rewritten contents, then perform renames.
///
/// Renames may chain (`@a -> @b`, `@b -> @c`) or swap; every moving note is
/// staged under a temporary name first, so a target that is itself being
/// renamed away is free by the time it is needed. A rename onto a file that
/// stays in place, or onto a target already claimed by an earlier rename, is
/// skipped and listed in `RewriteReport::conflicts`, and so is anything
/// whose target is held by a skipped rename.
pub fn apply_plan(plan: &RewritePlan) -> Result<RewriteReport, RewriteError> {
    let mut report = RewriteReport::default();

    for change in &plan.changes {
        let Some(content) = &change.content else {
            continue;
        };
        std::fs::write(&change.path, content).map_err(|source| RewriteError::Io {
            path: change.path.clone(),
            source,
        })?;
        report.files_written += 1;
        report.links_rewritten += change.edits.len();
    }

    let renames: Vec<(PathBuf, PathBuf)> = plan
        .changes
        .iter()
        .filter_map(|c| c.rename.clone().map(|to| (c.path.clone(), to)))
        .collect();
    let (ready, blocked) = resolve_renames(renames);

    for (from, to) in blocked {
        tracing::warn!(from = %from.display(), to = %to.display(), "rename target taken, skipping");
        report.conflicts.push((from, to));
    }

    let mut staged = Vec::with_capacity(ready.len());
    for (from, to) in ready {
        let temp = staging_path(&from);
        rename_note(&from, &temp)?;
        staged.push((from, temp, to));
    }

    for (from, temp, to) in staged {
        match rename_note(&temp, &to) {
            Ok(()) => {
                tracing::debug!(from = %from.display(), to = %to.display(), "renamed note");
                report.renamed.push((from, to));
            }
            Err(RewriteError::TargetExists(existing)) => {
                rename_note(&temp, &from)?;
                tracing::warn!(from = %from.display(), to = %existing.display(), "rename target exists, skipping");
                report.conflicts.push((from, existing));
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        written = report.files_written,
        links = report.links_rewritten,
        renamed = report.renamed.len(),
        conflicts = report.conflicts.len(),
        "rewrite applied"
    );
    Ok(report)
}

/// Split renames into `(ready, blocked)`.
///
/// A rename is blocked when its target exists and is not moving away, or
/// when an earlier rename already claims the same target. Blocking one
/// rename keeps its source in place, which can block others in turn, so
/// this repeats until nothing changes.
fn resolve_renames(
    renames: Vec<(PathBuf, PathBuf)>,
) -> (Vec<(PathBuf, PathBuf)>, Vec<(PathBuf, PathBuf)>) {
    let mut pending = renames;
    let mut blocked = Vec::new();
    loop {
        let hit = {
            let moving: HashSet<&Path> = pending.iter().map(|(from, _)| from.as_path()).collect();
            let mut claimed: HashSet<&Path> = HashSet::new();
            pending.iter().position(|(_, to)| {
                !claimed.insert(to.as_path()) || (to.exists() && !moving.contains(to.as_path()))
            })
        };
        match hit {
            Some(i) => blocked.push(pending.remove(i)),
            None => return (pending, blocked),
        }
    }
}

/// Unused sibling path for parking `path` during a rename.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (0u32..)
        .map(|n| path.with_file_name(format!(".{name}.{n}.citemap-rename")))
        .find(|p| !p.exists())
        .unwrap_or_else(|| path.with_extension("citemap-rename"))
}

fn rename_note(from: &Path, to: &Path) -> Result<(), RewriteError> {
    if to.exists() {
        return Err(RewriteError::TargetExists(to.to_path_buf()));
    }
    std::fs::rename(from, to).map_err(|source| RewriteError::Io {
        path: from.to_path_buf(),
        source,
    })
}
