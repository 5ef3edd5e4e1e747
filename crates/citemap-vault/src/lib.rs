use std::path::PathBuf;

use thiserror::Error;

use citemap_core::MatchError;

pub mod frontmatter;
pub mod rewrite;
pub mod scan;

pub use frontmatter::{FrontMatter, parse_front_matter, read_front_matter};
pub use rewrite::{
    FileChange, LinkEdit, RewriteError, RewriteOptions, RewritePlan, RewriteReport, apply_plan,
    plan_rewrite, rewrite_links,
};
pub use scan::{ScanOptions, VaultScan, scan_vault};

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("vault walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Match(#[from] MatchError),
}
