use std::path::PathBuf;

use thiserror::Error;

use crate::logging::LogError;

/// Everything that can abort a generation run.
/// None of these are recoverable: each one points at a configuration defect that must be fixed before regenerating.
#[derive(Error, Debug)]
pub enum DatagenError {
    /// A required key is missing, out of range, or conflicts with another key.
    #[error("Invalid configuration for `{key}`: {reason}")]
    Config { key: String, reason: String },

    /// A stride, address or region size is not a multiple of the required granularity.
    #[error("{what}: {value} is not a multiple of {granularity} bytes")]
    Alignment {
        what: String,
        value: i64,
        granularity: u64,
    },

    /// The loop bounds of a descriptor do not cover the tensor they describe.
    #[error("{what}: expected {expected} elements but the loop bounds cover {actual}")]
    ShapeMismatch {
        what: String,
        expected: u64,
        actual: u64,
    },

    /// A golden tensor produced by the external simulator is absent.
    #[error(
        "Missing golden data {path:?}: {source}. Did you run the golden simulator and is the data directory correct?"
    )]
    MissingGoldenData {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A golden tensor file contains a line that is not an integer.
    #[error("Malformed golden data {path:?} at line {line}: {content:?}")]
    GoldenParse {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// The allocated regions do not fit the declared memory.
    #[error("Memory capacity exceeded: requested {requested} bytes but only {available} are available")]
    CapacityExceeded { requested: u64, available: u64 },

    /// A configuration file could not be read or parsed.
    #[error("Could not load configuration {path:?}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error(transparent)]
    Log(#[from] LogError),
}

impl DatagenError {
    pub(crate) fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        DatagenError::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = DatagenError> = std::result::Result<T, E>;
