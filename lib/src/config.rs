//! Defines the configuration of a dataset: where it lives, which storage engine backs it
//! and how named graphs are opened by default.

use crate::consts::{CONFIG_FILE, STORE_DIR};
use crate::options::{Backend, UnionWithDefault};
use anyhow::Result;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct Config {
    /// Directory holding the dataset; created on open if missing.
    pub root: PathBuf,
    /// Storage engine backing the dataset
    #[builder(default)]
    #[serde(default)]
    pub backend: Backend,
    // if true, nothing is written to disk and the dataset disappears on close
    #[builder(default)]
    #[serde(default)]
    pub temporary: bool,
    /// Union flag used by `Dataset::graph` when the caller does not pick one.
    #[builder(default)]
    #[serde(default)]
    pub union_default_graph: UnionWithDefault,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Configuration for a throwaway in-memory dataset rooted at `root`.
    pub fn temporary_at(root: impl Into<PathBuf>) -> Self {
        Config {
            root: root.into(),
            backend: Backend::Persistent,
            temporary: true,
            union_default_graph: UnionWithDefault::Disabled,
        }
    }

    /// Path of the storage engine's files for this dataset
    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    /// Path the configuration is persisted to
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let file = std::fs::File::open(file)?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Prints out the current Config in a clear and readable way for command line output.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  Root: {}", self.root.display());
        println!("  Backend: {}", self.backend);
        println!("  Temporary: {}", self.temporary);
        println!(
            "  Union With Default Graph: {}",
            self.union_default_graph.is_enabled()
        );
    }
}
