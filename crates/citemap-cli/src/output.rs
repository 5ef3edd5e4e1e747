use std::io::Write;
use std::path::Path;

use citemap_core::{MatchError, MatchStats};
use citemap_vault::{RewritePlan, RewriteReport};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Notes whose header could not be read.
pub fn print_skipped_notes(
    w: &mut dyn Write,
    skipped: &[MatchError],
    color: ColorMode,
) -> std::io::Result<()> {
    for err in skipped {
        if color.enabled() {
            writeln!(w, "{} {}", "SKIPPED:".yellow(), err)?;
        } else {
            writeln!(w, "SKIPPED: {}", err)?;
        }
    }
    Ok(())
}

/// Print the counters of a matching run.
pub fn print_match_summary(
    w: &mut dyn Write,
    stats: &MatchStats,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Loaded {} notes and {} bibliography entries", stats.old_total, stats.new_total)?;

    let missing: usize = stats.new_missing_field.values().sum();
    if missing > 0 {
        let detail: Vec<String> = stats
            .new_missing_field
            .iter()
            .map(|(field, n)| format!("{n} without {field}"))
            .collect();
        let line = format!("(Ignored {} entries: {})", missing, detail.join(", "));
        if color.enabled() {
            writeln!(w, "{}", line.dimmed())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    if stats.old_unparseable + stats.new_unparseable > 0 {
        writeln!(
            w,
            "Unparseable author lists: {} notes, {} entries",
            stats.old_unparseable, stats.new_unparseable
        )?;
    }
    writeln!(
        w,
        "Compared {} pairs ({} ruled out by identifiers)",
        stats.pairs, stats.gate_rejections
    )?;

    let matched = format!("{} matched", stats.matched);
    let unmatched = format!("{} unmatched", stats.unmatched());
    if color.enabled() {
        if stats.unmatched() > 0 {
            writeln!(w, "{}, {}", matched.green(), unmatched.yellow())?;
        } else {
            writeln!(w, "{}, {}", matched.green(), unmatched)?;
        }
    } else {
        writeln!(w, "{}, {}", matched, unmatched)?;
    }
    Ok(())
}

/// List the old keys that got no mapping.
pub fn print_unmatched(w: &mut dyn Write, keys: &[&str], color: ColorMode) -> std::io::Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "No candidate found for:".bold())?;
    } else {
        writeln!(w, "No candidate found for:")?;
    }
    for key in keys {
        writeln!(w, "  {}", key)?;
    }
    Ok(())
}

/// Print every pending link edit and rename in `plan`.
pub fn print_rewrite_plan(
    w: &mut dyn Write,
    plan: &RewritePlan,
    vault: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    for change in &plan.changes {
        let shown = change.path.strip_prefix(vault).unwrap_or(&change.path);
        if color.enabled() {
            writeln!(w, "{}", shown.display().bold())?;
        } else {
            writeln!(w, "{}", shown.display())?;
        }
        for edit in &change.edits {
            if color.enabled() {
                writeln!(
                    w,
                    "  line {}: [[{}]] -> [[{}]]",
                    edit.line,
                    edit.from.red(),
                    edit.to.green()
                )?;
            } else {
                writeln!(w, "  line {}: [[{}]] -> [[{}]]", edit.line, edit.from, edit.to)?;
            }
        }
        if let Some(target) = &change.rename {
            let target = target.strip_prefix(vault).unwrap_or(target);
            if color.enabled() {
                writeln!(w, "  rename -> {}", target.display().cyan())?;
            } else {
                writeln!(w, "  rename -> {}", target.display())?;
            }
        }
    }
    writeln!(
        w,
        "{} links in {} files, {} renames ({} files scanned)",
        plan.link_count(),
        plan.changes.iter().filter(|c| c.content.is_some()).count(),
        plan.rename_count(),
        plan.files_scanned
    )?;
    Ok(())
}

pub fn print_rewrite_report(
    w: &mut dyn Write,
    report: &RewriteReport,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(
        w,
        "Rewrote {} links in {} files, renamed {} notes",
        report.links_rewritten,
        report.files_written,
        report.renamed.len()
    )?;
    for (from, to) in &report.conflicts {
        let msg = format!(
            "Not renamed: {} -> {} (target taken)",
            from.display(),
            to.display()
        );
        if color.enabled() {
            writeln!(w, "{}", msg.red())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    Ok(())
}
