use std::fmt;
use std::fmt::{Display, Formatter};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::data::well::WellId;

/// One amplitude row as delivered by the ingestion layer.
///
/// Missing cells are expected to arrive as `NaN`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDroplet {
    pub ch1: f64,
    pub ch2: f64,
}

impl RawDroplet {
    pub fn new(ch1: f64, ch2: f64) -> Self {
        RawDroplet { ch1, ch2 }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.ch1.is_finite() && self.ch2.is_finite()
    }
}

impl From<(f64, f64)> for RawDroplet {
    fn from((ch1, ch2): (f64, f64)) -> Self {
        RawDroplet { ch1, ch2 }
    }
}

/// Cluster membership of a droplet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClusterLabel {
    #[default]
    Noise,
    Cluster(u32),
}

impl ClusterLabel {
    pub fn cluster_id(&self) -> Option<u32> {
        match self {
            ClusterLabel::Cluster(id) => Some(*id),
            ClusterLabel::Noise => None,
        }
    }

    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterLabel::Noise)
    }
}

impl Display for ClusterLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClusterLabel::Noise => write!(f, "noise"),
            ClusterLabel::Cluster(id) => write!(f, "{}", id),
        }
    }
}

/// A validated droplet reading of one well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Droplet {
    pub well: WellId,
    /// row of the raw input this droplet was read from
    pub source_index: usize,
    pub ch1: f64,
    pub ch2: f64,
    pub label: ClusterLabel,
}

impl Droplet {
    pub fn new(well: WellId, source_index: usize, ch1: f64, ch2: f64) -> Self {
        Droplet { well, source_index, ch1, ch2, label: ClusterLabel::Noise }
    }

    #[inline]
    pub fn amplitudes(&self) -> Vector2<f64> {
        Vector2::new(self.ch1, self.ch2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_defaults_to_noise() {
        assert_eq!(ClusterLabel::default(), ClusterLabel::Noise);
        assert_eq!(ClusterLabel::Cluster(3).cluster_id(), Some(3));
        assert_eq!(ClusterLabel::Noise.to_string(), "noise");
        assert!(!RawDroplet::new(f64::NAN, 1.0).is_finite());
    }
}
