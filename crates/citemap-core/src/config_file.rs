use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::matching::MatchConfig;
use crate::similarity::Metric;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub matching: Option<MatchingConfig>,
    pub vault: Option<VaultConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub metric: Option<Metric>,
    pub required_fields: Option<Vec<String>>,
    pub compare_fields: Option<Vec<String>>,
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Marker that starts literature-note file names and wiki-link targets.
    pub key_prefix: Option<String>,
    pub note_extension: Option<String>,
    /// Front-matter field renames applied on load, e.g. `authors = "author"`.
    pub field_aliases: Option<BTreeMap<String, String>>,
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub mapping_path: Option<String>,
    pub color: Option<bool>,
}

impl ConfigFile {
    /// Matcher configuration with file values applied over the defaults.
    pub fn match_config(&self) -> MatchConfig {
        let defaults = MatchConfig::default();
        let Some(m) = &self.matching else {
            return defaults;
        };
        MatchConfig {
            metric: m.metric.unwrap_or(defaults.metric),
            required_fields: m
                .required_fields
                .clone()
                .unwrap_or(defaults.required_fields),
            compare_fields: m.compare_fields.clone().or(defaults.compare_fields),
            jobs: m.jobs.unwrap_or(defaults.jobs).max(1),
        }
    }
}

/// Platform config directory path: `<config_dir>/citemap/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citemap").join("config.toml"))
}

/// Load config by cascading CWD `.citemap.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citemap.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let bm = base.matching.unwrap_or_default();
    let om = overlay.matching.unwrap_or_default();
    let bv = base.vault.unwrap_or_default();
    let ov = overlay.vault.unwrap_or_default();
    let bo = base.output.unwrap_or_default();
    let oo = overlay.output.unwrap_or_default();

    ConfigFile {
        matching: Some(MatchingConfig {
            metric: om.metric.or(bm.metric),
            required_fields: om.required_fields.or(bm.required_fields),
            compare_fields: om.compare_fields.or(bm.compare_fields),
            jobs: om.jobs.or(bm.jobs),
        }),
        vault: Some(VaultConfig {
            key_prefix: ov.key_prefix.or(bv.key_prefix),
            note_extension: ov.note_extension.or(bv.note_extension),
            field_aliases: ov.field_aliases.or(bv.field_aliases),
            strict: ov.strict.or(bv.strict),
        }),
        output: Some(OutputConfig {
            mapping_path: oo.mapping_path.or(bo.mapping_path),
            color: oo.color.or(bo.color),
        }),
    }
}
