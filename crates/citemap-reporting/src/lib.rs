use std::path::PathBuf;

use thiserror::Error;

pub mod export;

pub use export::{
    distance_table_csv, prefixed, read_mapping, write_distance_table, write_mapping,
};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid mapping file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
