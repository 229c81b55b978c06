use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::data::cluster::Centroid;

/// What a cluster was identified as, or an expected target nobody matched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assignment {
    /// empty (negative) droplets
    Empty,
    Reference(String),
    Target(String),
    /// a cluster that fits no expected signature
    Unmatched,
    /// an expected target with no cluster
    Missing(String),
}

impl Assignment {
    pub fn target_name(&self) -> Option<&str> {
        match self {
            Assignment::Reference(name) | Assignment::Target(name) | Assignment::Missing(name) => Some(name),
            Assignment::Empty | Assignment::Unmatched => None,
        }
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Assignment::Empty => write!(f, "empty"),
            Assignment::Reference(name) => write!(f, "reference:{}", name),
            Assignment::Target(name) => write!(f, "{}", name),
            Assignment::Unmatched => write!(f, "unmatched"),
            Assignment::Missing(name) => write!(f, "missing:{}", name),
        }
    }
}

/// Result of the matching step for one cluster (or one missing target).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetAssignment {
    /// `None` only for `Assignment::Missing`
    pub cluster: Option<u32>,
    pub centroid: Option<Centroid>,
    pub droplet_count: usize,
    /// distance from the (drift-corrected) expected centroid
    pub distance: Option<f64>,
    pub assignment: Assignment,
}

impl TargetAssignment {
    pub fn missing(name: &str) -> Self {
        TargetAssignment {
            cluster: None,
            centroid: None,
            droplet_count: 0,
            distance: None,
            assignment: Assignment::Missing(name.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.assignment, Assignment::Missing(_))
    }
}
