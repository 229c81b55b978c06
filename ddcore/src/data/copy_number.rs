use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QcStatus {
    Normal,
    Aberrant,
    /// ratio sits in the buffer zone between two copy-number levels
    Indeterminate,
    InsufficientDroplets,
}

impl Display for QcStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QcStatus::Normal => write!(f, "Normal"),
            QcStatus::Aberrant => write!(f, "Aberrant"),
            QcStatus::Indeterminate => write!(f, "Indeterminate"),
            QcStatus::InsufficientDroplets => write!(f, "InsufficientDroplets"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aberration {
    Gain,
    Loss,
}

/// Copy-number estimate of one target in one well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CopyNumberResult {
    pub target: String,
    /// ploidy * ratio
    pub copy_number: f64,
    /// target droplets / baseline
    pub ratio: f64,
    pub target_droplets: usize,
    pub reference_droplets: usize,
    /// denominator of `ratio`; the reference count unless a median baseline is used
    pub baseline: f64,
    /// ratio minus the target's expected euploid ratio
    pub deviation: f64,
    pub qc: QcStatus,
    pub aberration: Option<Aberration>,
}

impl CopyNumberResult {
    pub fn is_aberrant(&self) -> bool {
        self.qc == QcStatus::Aberrant
    }
}
