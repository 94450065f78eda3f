// Dataset error taxonomy

use std::fmt;
use std::path::PathBuf;

/// Structural failures surfaced to callers. Conversion failures are not errors: the
/// converter reports them as `None` and the dataset turns them into `false` or a no-op.
#[derive(Debug)]
pub enum DatasetError {
    GraphNotFound(String),
    GraphAlreadyExists(String),
    IoFailure {
        path: PathBuf,
        source: anyhow::Error,
    },
    ReadOnlyTransaction,
    TransactionsUnsupported,
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatasetError::GraphNotFound(name) => {
                write!(f, "graph does not exist for '{}'", name)
            }
            DatasetError::GraphAlreadyExists(name) => {
                write!(f, "graph already exists for '{}'", name)
            }
            DatasetError::IoFailure { path, source } => {
                write!(f, "failed to load RDF from {}: {}", path.display(), source)
            }
            DatasetError::ReadOnlyTransaction => {
                write!(f, "cannot write inside a read transaction")
            }
            DatasetError::TransactionsUnsupported => {
                write!(f, "store does not support transactions")
            }
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::IoFailure { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

impl DatasetError {
    /// Returns the typed error behind an `anyhow::Error`, if there is one.
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&DatasetError> {
        err.downcast_ref::<DatasetError>()
    }
}
