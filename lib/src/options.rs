//! Shared option types that replace boolean flag parameters in the Rust API.

use serde::{Deserialize, Serialize};

/// Controls whether reads through a named graph also see the default graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnionWithDefault {
    /// Reads see the named graph merged with the default graph; writes still
    /// target the named graph alone.
    Enabled,
    /// Reads and writes see only the named graph.
    #[default]
    Disabled,
}

impl UnionWithDefault {
    pub fn is_enabled(self) -> bool {
        matches!(self, UnionWithDefault::Enabled)
    }
}

impl From<bool> for UnionWithDefault {
    fn from(value: bool) -> Self {
        if value {
            UnionWithDefault::Enabled
        } else {
            UnionWithDefault::Disabled
        }
    }
}

impl From<UnionWithDefault> for bool {
    fn from(value: UnionWithDefault) -> Self {
        value.is_enabled()
    }
}

/// Selects the storage engine backing a dataset. Chosen once per dataset; a
/// dataset never switches backend while open.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Transactional oxigraph store, on disk unless the config is temporary.
    #[default]
    Persistent,
    /// Non-transactional in-memory quad set.
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Backend::Persistent => write!(f, "persistent"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persistent" => Ok(Backend::Persistent),
            "memory" => Ok(Backend::Memory),
            other => Err(anyhow::anyhow!("unknown backend '{}'", other)),
        }
    }
}
