use std::path::PathBuf;

/// Result type for simulation, configuration and output operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors surfaced by the simulator.
///
/// Numerical divergence has no variant: NaN/Inf propagate through the core
/// and are only reported by [`crate::observer`].
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Hemispheric coupling needs an even node count, got {0}")]
    OddNodeCount(usize),

    #[error("Filter design failed: {0}")]
    FilterDesign(String),

    #[error("Signal too short for zero-phase filtering: {len} samples, need more than {padlen}")]
    SignalTooShort { len: usize, padlen: usize },

    #[error("Malformed matrix file {path:?} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("JSON error in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SimError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
