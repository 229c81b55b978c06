use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

use crate::data::copy_number::CopyNumberResult;

/// Distribution of one target's copy numbers across a plate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetStatistics {
    pub target: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl TargetStatistics {
    pub fn from_values(target: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(TargetStatistics {
            target: target.to_string(),
            count: values.len(),
            mean: values.mean(),
            median: Data::new(values.to_vec()).median(),
            std_dev: values.population_std_dev(),
            min: values.min(),
            max: values.max(),
        })
    }
}

/// Per-target copy-number statistics, in first-seen target order.
///
/// Results with a non-finite copy number are skipped.
pub fn target_statistics<'a, I>(results: I) -> Vec<TargetStatistics>
where
    I: IntoIterator<Item = &'a CopyNumberResult>,
{
    let mut order: Vec<&str> = Vec::new();
    let mut by_target: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for r in results.into_iter().filter(|r| r.copy_number.is_finite()) {
        if !by_target.contains_key(r.target.as_str()) {
            order.push(r.target.as_str());
        }
        by_target.entry(r.target.as_str()).or_default().push(r.copy_number);
    }

    order
        .into_iter()
        .filter_map(|t| TargetStatistics::from_values(t, &by_target[t]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::copy_number::QcStatus;

    fn result(target: &str, copy_number: f64) -> CopyNumberResult {
        CopyNumberResult {
            target: target.to_string(),
            copy_number,
            ratio: copy_number / 2.0,
            target_droplets: 0,
            reference_droplets: 0,
            baseline: 0.0,
            deviation: 0.0,
            qc: QcStatus::Normal,
            aberration: None,
        }
    }

    #[test]
    fn test_from_values() {
        let s = TargetStatistics::from_values("Chrom2", &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(s.count, 4);
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!((s.median - 2.5).abs() < 1e-12);
        assert!((s.std_dev - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert!(TargetStatistics::from_values("x", &[]).is_none());
    }

    #[test]
    fn test_grouping_keeps_order() {
        let results = vec![
            result("Chrom3", 2.0),
            result("Chrom2", 2.0),
            result("Chrom3", 3.0),
            result("Chrom2", f64::NAN),
        ];
        let stats = target_statistics(&results);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].target, "Chrom3");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[1].count, 1);
    }
}
