use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::cluster::Cluster;

/// Errors raised while loading or validating a `TargetConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration value for `{key}`: {message}")]
    Invalid { key: String, message: String },
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid { key: key.into(), message: message.into() }
    }
}

/// Failures that abort the analysis of a single well.
///
/// These never cross the plate boundary: the well pipeline turns them into a
/// [`WellFailure`] stored on the well's result.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("insufficient data: {valid} valid droplets ({dropped} dropped), need at least {required}")]
    InsufficientData { valid: usize, dropped: usize, required: usize },
    #[error("clustering failed: found {found} clusters, need at least {required}")]
    ClusteringFailed { found: usize, required: usize, clusters: Vec<Cluster> },
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::InsufficientData { .. } => FailureKind::InsufficientData,
            AnalysisError::ClusteringFailed { .. } => FailureKind::ClusteringFailed,
            AnalysisError::InvalidConfig(_) => FailureKind::InvalidConfiguration,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    InsufficientData,
    ClusteringFailed,
    InvalidConfiguration,
}

/// Why a well produced no copy-number results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WellFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&AnalysisError> for WellFailure {
    fn from(err: &AnalysisError) -> Self {
        WellFailure { kind: err.kind(), message: err.to_string() }
    }
}

/// Non-fatal findings recorded on a well while it is analyzed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Several clusters fit one target equally well; the larger one was kept.
    AmbiguousAssignment { target: String, chosen: u32, alternatives: Vec<u32> },
    /// No cluster fits the target's signature region.
    MissingTarget { target: String },
    /// Rows removed by the preprocessor.
    DroppedDroplets { count: usize },
}
