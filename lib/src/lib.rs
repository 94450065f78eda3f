//! graphstore: an RDF dataset of one default graph and any number of named graphs,
//! with transactional writes, pattern lookup, bulk loading and SPARQL, on top of
//! oxigraph.

extern crate derive_builder;

pub mod config;
pub mod consts;
pub mod convert;
pub mod dataset;
pub mod errors;
pub mod graph;
pub mod io;
pub mod model;
pub mod options;
pub mod pattern;
pub mod query;
pub mod transaction;
pub mod util;

pub use dataset::{Dataset, Graphs};
pub use errors::DatasetError;
pub use graph::GraphView;
pub use query::{QueryOutcome, Solution};

use crate::consts::CONFIG_FILE;
use std::path::{Path, PathBuf};

pub fn init_logging() {
    // Allow GRAPHSTORE_LOG to override RUST_LOG for consistent CLI defaults.
    if let Ok(log_level) = std::env::var("GRAPHSTORE_LOG") {
        std::env::set_var("RUST_LOG", log_level);
    }
}

/// Searches `start_dir` and then its parents for a directory holding a saved dataset
/// configuration.
pub fn find_dataset_root_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current_dir = Some(start_dir);
    while let Some(dir) = current_dir {
        if dir.join(CONFIG_FILE).is_file() {
            return Some(dir.to_path_buf());
        }
        current_dir = dir.parent();
    }
    None
}

/// Like `find_dataset_root_from`, starting at the current directory.
pub fn find_dataset_root() -> Option<PathBuf> {
    let start_dir = std::env::current_dir().ok()?;
    find_dataset_root_from(&start_dir)
}
