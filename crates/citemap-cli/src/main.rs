use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use citemap_core::config_file::{self, ConfigFile};
use citemap_core::{MatchConfig, MatchMapping, Metric, RecordSet};
use citemap_vault::{RewriteOptions, ScanOptions, VaultScan};

mod output;

use output::ColorMode;

/// Citemap - Move literature notes over to the citation keys of a new bibliography export
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log matching decisions at debug level
    #[arg(long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Config file applied over the platform and working-directory configs
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match vault notes to bibliography entries and write the key mapping
    Match {
        /// Vault directory holding the literature notes
        vault: PathBuf,
        /// New .bib export
        bib: PathBuf,
        /// Where to write the mapping JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum)]
        metric: Option<MetricArg>,
        /// Worker threads for scoring
        #[arg(long)]
        jobs: Option<usize>,
        /// Stop at the first note with a malformed header
        #[arg(long)]
        strict: bool,
    },

    /// Write every candidate pair and its distances to CSV instead of selecting
    Table {
        vault: PathBuf,
        bib: PathBuf,
        #[arg(short, long, default_value = "distances.csv")]
        output: PathBuf,
        #[arg(long, value_enum)]
        metric: Option<MetricArg>,
    },

    /// Rewrite links and rename notes using a mapping JSON
    Rewrite {
        vault: PathBuf,
        mapping: PathBuf,
        /// Print the changes without touching any file
        #[arg(long)]
        dry_run: bool,
    },

    /// Match, write the mapping, then rewrite the vault with it
    Migrate {
        vault: PathBuf,
        bib: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum)]
        metric: Option<MetricArg>,
        #[arg(long)]
        jobs: Option<usize>,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum MetricArg {
    /// Per-field Levenshtein distance averaged over shared fields
    EditDistance,
    /// Normalized author and title similarity ratios
    Ratio,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::EditDistance => Metric::EditDistance,
            MetricArg::Ratio => Metric::Ratio,
        }
    }
}

/// Configuration after applying CLI flags > config files > defaults.
struct Settings {
    matching: MatchConfig,
    scan: ScanOptions,
    mapping_path: PathBuf,
    color: ColorMode,
    verbose: bool,
}

impl Settings {
    fn resolve(file: &ConfigFile, cli: &Cli) -> Self {
        let vault = file.vault.clone().unwrap_or_default();
        let out = file.output.clone().unwrap_or_default();
        let defaults = ScanOptions::default();

        let scan = ScanOptions {
            key_prefix: vault.key_prefix.unwrap_or(defaults.key_prefix),
            note_extension: vault.note_extension.unwrap_or(defaults.note_extension),
            field_aliases: vault.field_aliases.unwrap_or(defaults.field_aliases),
            strict: vault.strict.unwrap_or(defaults.strict),
        };

        Self {
            matching: file.match_config(),
            scan,
            mapping_path: out
                .mapping_path
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("mapping.json")),
            color: ColorMode(
                !cli.no_color && out.color.unwrap_or(true) && std::io::stdout().is_terminal(),
            ),
            verbose: cli.verbose,
        }
    }

    fn with_overrides(mut self, metric: Option<MetricArg>, jobs: Option<usize>, strict: bool) -> Self {
        if let Some(metric) = metric {
            self.matching.metric = metric.into();
        }
        if let Some(jobs) = jobs {
            self.matching.jobs = jobs.max(1);
        }
        self.scan.strict |= strict;
        self
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CITEMAP_CONFIG").ok().map(PathBuf::from));
    let file_config = load_file_config(config_path.as_deref())?;
    let settings = Settings::resolve(&file_config, &cli);

    match cli.command {
        Command::Match {
            vault,
            bib,
            output,
            metric,
            jobs,
            strict,
        } => {
            let settings = settings.with_overrides(metric, jobs, strict);
            let mapping_path = output.unwrap_or_else(|| settings.mapping_path.clone());
            match_vault(&settings, &vault, &bib, &mapping_path).map(|_| ())
        }
        Command::Table {
            vault,
            bib,
            output,
            metric,
        } => {
            let settings = settings.with_overrides(metric, None, false);
            distance_table(&settings, &vault, &bib, &output)
        }
        Command::Rewrite {
            vault,
            mapping,
            dry_run,
        } => {
            let mapping = citemap_reporting::read_mapping(&mapping)?;
            rewrite_vault(&settings, &vault, &mapping, dry_run)
        }
        Command::Migrate {
            vault,
            bib,
            output,
            metric,
            jobs,
            strict,
            dry_run,
        } => {
            let settings = settings.with_overrides(metric, jobs, strict);
            let mapping_path = output.unwrap_or_else(|| settings.mapping_path.clone());
            let mapping = match_vault(&settings, &vault, &bib, &mapping_path)?;
            println!();
            rewrite_vault(&settings, &vault, &mapping, dry_run)
        }
    }
}

/// Logs go to stderr, and to `log_file` too when given. `RUST_LOG` wins over
/// the `--verbose` default.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let default_directives = if verbose {
        "warn,citemap=debug,citemap_core=debug,citemap_bib=debug,citemap_vault=debug,citemap_reporting=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(directory)
                .with_context(|| format!("creating log directory {}", directory.display()))?;
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file path {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("failed to init tracing subscriber")?;

    Ok(guard)
}

/// Platform config, then `.citemap.toml` in the working directory, then the
/// `--config` (or `CITEMAP_CONFIG`) file; later files win.
fn load_file_config(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let base = config_file::load_config();
    let Some(path) = explicit else {
        return Ok(base);
    };
    if !path.exists() {
        anyhow::bail!("Config file not found at {}", path.display());
    }
    let overlay = config_file::load_from_path(path)
        .ok_or_else(|| anyhow::anyhow!("Could not parse config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "applied config file");
    Ok(config_file::merge(base, overlay))
}

fn load_inputs(settings: &Settings, vault: &Path, bib: &Path) -> anyhow::Result<(VaultScan, RecordSet)> {
    let scan = citemap_vault::scan_vault(vault, &settings.scan)
        .with_context(|| format!("scanning vault {}", vault.display()))?;
    let new = citemap_bib::load_bib(bib).with_context(|| format!("loading {}", bib.display()))?;
    Ok((scan, new))
}

fn match_vault(
    settings: &Settings,
    vault: &Path,
    bib: &Path,
    mapping_path: &Path,
) -> anyhow::Result<MatchMapping> {
    let (scan, new) = load_inputs(settings, vault, bib)?;
    let outcome = citemap_core::match_records(&scan.records, &new, &settings.matching);

    citemap_reporting::write_mapping(mapping_path, &outcome.mapping)?;

    let mut out = std::io::stdout().lock();
    output::print_skipped_notes(&mut out, &scan.skipped, settings.color)?;
    output::print_match_summary(&mut out, &outcome.stats, settings.color)?;
    let unmatched = citemap_core::unmatched(&scan.records, &outcome.mapping);
    output::print_unmatched(&mut out, &unmatched, settings.color)?;
    writeln!(out, "\nMapping written to {}", mapping_path.display())?;

    Ok(outcome.mapping)
}

fn distance_table(settings: &Settings, vault: &Path, bib: &Path, path: &Path) -> anyhow::Result<()> {
    let (scan, new) = load_inputs(settings, vault, bib)?;
    let (pairs, stats) = citemap_core::candidate_pairs(&scan.records, &new, &settings.matching);

    citemap_reporting::write_distance_table(path, &pairs, settings.matching.metric)?;

    let mut out = std::io::stdout().lock();
    output::print_skipped_notes(&mut out, &scan.skipped, settings.color)?;
    writeln!(
        out,
        "Wrote {} candidate pairs for {} notes to {}",
        stats.pairs,
        stats.old_total,
        path.display()
    )?;
    Ok(())
}

fn rewrite_vault(
    settings: &Settings,
    vault: &Path,
    mapping: &MatchMapping,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mapping = citemap_reporting::prefixed(mapping, &settings.scan.key_prefix);
    let options = RewriteOptions {
        note_extension: settings.scan.note_extension.clone(),
    };
    let plan = citemap_vault::plan_rewrite(vault, &mapping, &options)
        .with_context(|| format!("scanning vault {}", vault.display()))?;

    let mut out = std::io::stdout().lock();
    if dry_run || settings.verbose {
        output::print_rewrite_plan(&mut out, &plan, vault, settings.color)?;
    }
    if dry_run {
        writeln!(out, "Dry run: no files changed")?;
        return Ok(());
    }

    let report = citemap_vault::apply_plan(&plan)?;
    output::print_rewrite_report(&mut out, &report, settings.color)?;
    Ok(())
}
