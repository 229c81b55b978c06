use std::cmp::Ordering;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::data::droplet::Droplet;

/// Mean (ch1, ch2) amplitude of a droplet population.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub ch1: f64,
    pub ch2: f64,
}

impl Centroid {
    pub fn new(ch1: f64, ch2: f64) -> Self {
        Centroid { ch1, ch2 }
    }

    #[inline]
    pub fn as_vector(&self) -> Vector2<f64> {
        Vector2::new(self.ch1, self.ch2)
    }

    #[inline]
    pub fn distance(&self, other: &Centroid) -> f64 {
        (self.as_vector() - other.as_vector()).norm()
    }

    /// Total order on (ch1, ch2); used to number clusters reproducibly.
    pub fn geometric_cmp(&self, other: &Centroid) -> Ordering {
        self.ch1.total_cmp(&other.ch1).then(self.ch2.total_cmp(&other.ch2))
    }
}

impl From<[f64; 2]> for Centroid {
    fn from(v: [f64; 2]) -> Self {
        Centroid { ch1: v[0], ch2: v[1] }
    }
}

impl From<Vector2<f64>> for Centroid {
    fn from(v: Vector2<f64>) -> Self {
        Centroid { ch1: v.x, ch2: v.y }
    }
}

/// A droplet population found by the clusterer.
///
/// Members are indices into the owning well's droplet vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub label: u32,
    pub centroid: Centroid,
    pub droplet_count: usize,
    pub members: Vec<usize>,
    /// excess-of-mass stability from the condensed tree
    pub stability: f64,
}

impl Cluster {
    pub fn from_members(label: u32, droplets: &[Droplet], members: Vec<usize>, stability: f64) -> Self {
        let sum = members
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f64>, &i| acc + droplets[i].amplitudes());
        let centroid = if members.is_empty() {
            Centroid::new(f64::NAN, f64::NAN)
        } else {
            Centroid::from(sum / members.len() as f64)
        };
        Cluster { label, centroid, droplet_count: members.len(), members, stability }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::well::WellId;

    #[test]
    fn test_centroid_from_members() {
        let well: WellId = "A01".parse().unwrap();
        let droplets = vec![
            Droplet::new(well, 0, 100.0, 200.0),
            Droplet::new(well, 1, 300.0, 400.0),
            Droplet::new(well, 2, 5000.0, 5000.0),
        ];
        let c = Cluster::from_members(0, &droplets, vec![0, 1], 1.0);
        assert_eq!(c.droplet_count, 2);
        assert!((c.centroid.ch1 - 200.0).abs() < 1e-9);
        assert!((c.centroid.ch2 - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_and_order() {
        let a = Centroid::new(0.0, 0.0);
        let b = Centroid::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.geometric_cmp(&b), Ordering::Less);
        assert_eq!(Centroid::new(1.0, 2.0).geometric_cmp(&Centroid::new(1.0, 1.0)), Ordering::Greater);
    }
}
