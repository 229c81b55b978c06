use log::warn;
use statrs::statistics::{Data, Median, Statistics};

use crate::config::{BaselineMode, QcThresholds, TargetConfig};
use crate::data::copy_number::{Aberration, CopyNumberResult, QcStatus};

/// Droplet count of one non-reference target; `None` when it was not matched.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetCount<'a> {
    pub name: &'a str,
    pub droplets: Option<usize>,
    pub expected_ratio: f64,
}

/// Robust baseline over several disomic counts.
///
/// Median of the non-zero counts; if at least `baseline_min_targets` counts lie
/// within `baseline_deviation` of it, their mean is used instead.
pub fn median_baseline(counts: &[usize], qc: &QcThresholds) -> Option<f64> {
    let values: Vec<f64> = counts.iter().filter(|&&c| c > 0).map(|&c| c as f64).collect();
    if values.is_empty() {
        return None;
    }

    let median = Data::new(values.clone()).median();
    let close: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (v - median).abs() / median < qc.baseline_deviation)
        .collect();

    if close.len() >= qc.baseline_min_targets {
        Some(close.iter().mean())
    } else {
        Some(median)
    }
}

/// Aneuploid ratio levels for a target whose euploid ratio is `expected_ratio`.
///
/// Configured `aneuploidy_targets` sit at `expected_ratio + (target - 1)`;
/// without them level `k` sits at `expected_ratio + (k / ploidy - 1)` for every
/// `k != ploidy` up to `max_copy_number`.
pub fn aneuploidy_levels(expected_ratio: f64, ploidy: f64, qc: &QcThresholds) -> Vec<f64> {
    match &qc.aneuploidy_targets {
        Some(targets) => targets.iter().map(|t| expected_ratio + (t - 1.0)).collect(),
        None => (0..=qc.max_copy_number)
            .map(|k| k as f64)
            .filter(|copies| (copies - ploidy).abs() >= 1e-9)
            .map(|copies| expected_ratio + (copies / ploidy - 1.0))
            .collect(),
    }
}

/// Places a ratio into the euploid band, an aneuploid band or the buffer zone
/// between them. Band widths are relative to the level.
pub fn classify_ratio(ratio: f64, expected_ratio: f64, ploidy: f64, qc: &QcThresholds) -> (QcStatus, Option<Aberration>) {
    if (ratio - expected_ratio).abs() <= qc.euploid_tolerance * expected_ratio {
        return (QcStatus::Normal, None);
    }

    let direction = |level: f64| if level > expected_ratio { Aberration::Gain } else { Aberration::Loss };
    let levels = aneuploidy_levels(expected_ratio, ploidy, qc);

    if let Some(&level) = levels
        .iter()
        .find(|&&level| (ratio - level).abs() <= qc.aneuploidy_tolerance * level.abs())
    {
        return (QcStatus::Aberrant, Some(direction(level)));
    }

    let highest = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if highest > expected_ratio && ratio > highest {
        return (QcStatus::Aberrant, Some(Aberration::Gain));
    }

    (QcStatus::Indeterminate, None)
}

/// Copy-number estimate of one target against a given baseline.
///
/// `InsufficientDroplets` when the target, the reference or the baseline falls
/// below `min_droplets`; a missing reference is passed as 0.
pub fn estimate_copy_number(
    target: &str,
    target_droplets: usize,
    reference_droplets: usize,
    baseline: f64,
    expected_ratio: f64,
    ploidy: f64,
    qc: &QcThresholds,
) -> CopyNumberResult {
    let ratio = if baseline > 0.0 { target_droplets as f64 / baseline } else { f64::NAN };
    let copy_number = ploidy * ratio;

    let (status, aberration) = if target_droplets < qc.min_droplets
        || reference_droplets < qc.min_droplets
        || baseline < qc.min_droplets as f64
        || !ratio.is_finite()
    {
        (QcStatus::InsufficientDroplets, None)
    } else {
        classify_ratio(ratio, expected_ratio, ploidy, qc)
    };

    CopyNumberResult {
        target: target.to_string(),
        copy_number,
        ratio,
        target_droplets,
        reference_droplets,
        baseline,
        deviation: ratio - expected_ratio,
        qc: status,
        aberration,
    }
}

/// Copy numbers of every matched target of a well.
///
/// Targets with `droplets == None` produce no result. Without a usable
/// baseline nothing can be estimated and the result is empty. A missing
/// reference counts as 0 droplets, so every result is `InsufficientDroplets`.
pub fn estimate_copy_numbers(
    reference_droplets: Option<usize>,
    targets: &[TargetCount],
    config: &TargetConfig,
) -> Vec<CopyNumberResult> {
    let baseline = match config.baseline {
        BaselineMode::Reference => reference_droplets.filter(|&c| c > 0).map(|c| c as f64),
        BaselineMode::TargetMedian => {
            let counts: Vec<usize> = reference_droplets
                .into_iter()
                .chain(targets.iter().filter_map(|t| t.droplets))
                .collect();
            median_baseline(&counts, &config.qc)
        }
    };

    let Some(baseline) = baseline else {
        warn!("no baseline available, skipping copy-number estimation");
        return Vec::new();
    };

    targets
        .iter()
        .filter_map(|t| {
            t.droplets.map(|count| {
                estimate_copy_number(
                    t.name,
                    count,
                    reference_droplets.unwrap_or(0),
                    baseline,
                    t.expected_ratio,
                    config.ploidy,
                    &config.qc,
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(reference: usize, target: usize) -> CopyNumberResult {
        estimate_copy_number("T", target, reference, reference as f64, 1.0, 2.0, &QcThresholds::default())
    }

    #[test]
    fn test_hemizygous_loss() {
        let r = estimate(1000, 500);
        assert!((r.ratio - 0.5).abs() < 1e-12);
        assert!((r.copy_number - 1.0).abs() < 1e-12);
        assert_eq!(r.qc, QcStatus::Aberrant);
        assert_eq!(r.aberration, Some(Aberration::Loss));
    }

    #[test]
    fn test_normal_ploidy() {
        let r = estimate(1000, 1000);
        assert!((r.ratio - 1.0).abs() < 1e-12);
        assert!((r.copy_number - 2.0).abs() < 1e-12);
        assert_eq!(r.qc, QcStatus::Normal);
        assert_eq!(r.aberration, None);
    }

    #[test]
    fn test_trisomy() {
        let r = estimate(1000, 1500);
        assert!((r.ratio - 1.5).abs() < 1e-12);
        assert!((r.copy_number - 3.0).abs() < 1e-12);
        assert_eq!(r.qc, QcStatus::Aberrant);
        assert_eq!(r.aberration, Some(Aberration::Gain));
    }

    #[test]
    fn test_insufficient_droplets() {
        let r = estimate(1000, 8);
        assert_eq!(r.qc, QcStatus::InsufficientDroplets);
        assert!((r.ratio - 0.008).abs() < 1e-12);

        let r = estimate(5, 5);
        assert_eq!(r.qc, QcStatus::InsufficientDroplets);
    }

    #[test]
    fn test_buffer_zone() {
        let qc = QcThresholds::default();
        assert_eq!(classify_ratio(1.25, 1.0, 2.0, &qc).0, QcStatus::Indeterminate);
        assert_eq!(classify_ratio(0.72, 1.0, 2.0, &qc).0, QcStatus::Indeterminate);
        assert_eq!(classify_ratio(1.14, 1.0, 2.0, &qc).0, QcStatus::Normal);
        assert_eq!(classify_ratio(2.0, 1.0, 2.0, &qc), (QcStatus::Aberrant, Some(Aberration::Gain)));
        assert_eq!(classify_ratio(5.0, 1.0, 2.0, &qc), (QcStatus::Aberrant, Some(Aberration::Gain)));
    }

    #[test]
    fn test_expected_ratio_shifts_levels() {
        let qc = QcThresholds::default();
        // euploid at 0.8 for this assay, trisomy level moves to 1.3
        assert_eq!(classify_ratio(0.8, 0.8, 2.0, &qc).0, QcStatus::Normal);
        assert_eq!(classify_ratio(1.3, 0.8, 2.0, &qc), (QcStatus::Aberrant, Some(Aberration::Gain)));
    }

    #[test]
    fn test_median_baseline() {
        let qc = QcThresholds::default();
        // 1000, 1020, 980 are within 15% of the median -> their mean
        let b = median_baseline(&[1000, 1020, 980, 1500, 0], &qc).unwrap();
        assert!((b - 1000.0).abs() < 1e-9);
        // too few close counts -> median
        let b = median_baseline(&[100, 1000, 3000], &qc).unwrap();
        assert!((b - 1000.0).abs() < 1e-9);
        assert!(median_baseline(&[0, 0], &qc).is_none());
    }

    #[test]
    fn test_missing_target_has_no_result() {
        let config = TargetConfig::default();
        let targets = vec![
            TargetCount { name: "Chrom2", droplets: Some(1000), expected_ratio: 1.0 },
            TargetCount { name: "Chrom3", droplets: None, expected_ratio: 1.0 },
        ];
        let results = estimate_copy_numbers(Some(1000), &targets, &config);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target, "Chrom2");
        assert!(estimate_copy_numbers(None, &targets, &config).is_empty());
    }

    #[test]
    fn test_configured_aneuploidy_targets() {
        let qc = QcThresholds { aneuploidy_targets: Some(vec![0.75, 1.25]), ..Default::default() };
        // duplication level at 1.03 + 0.25, deletion at 1.03 - 0.25
        assert_eq!(classify_ratio(1.28, 1.03, 2.0, &qc), (QcStatus::Aberrant, Some(Aberration::Gain)));
        assert_eq!(classify_ratio(0.78, 1.03, 2.0, &qc), (QcStatus::Aberrant, Some(Aberration::Loss)));
        assert_eq!(classify_ratio(1.03, 1.03, 2.0, &qc).0, QcStatus::Normal);
        assert_eq!(classify_ratio(1.70, 1.03, 2.0, &qc), (QcStatus::Aberrant, Some(Aberration::Gain)));

        // the ploidy levels put trisomy at 1.53, leaving 1.28 in the buffer zone
        let default_qc = QcThresholds::default();
        assert_eq!(classify_ratio(1.28, 1.03, 2.0, &default_qc).0, QcStatus::Indeterminate);

        let levels = aneuploidy_levels(1.03, 2.0, &qc);
        assert!((levels[0] - 0.78).abs() < 1e-12);
        assert!((levels[1] - 1.28).abs() < 1e-12);

        let r = estimate_copy_number("Chrom3", 1280, 1000, 1000.0, 1.03, 2.0, &qc);
        assert!((r.copy_number - 2.56).abs() < 1e-12);
        assert_eq!(r.aberration, Some(Aberration::Gain));
    }

    #[test]
    fn test_low_reference_with_median_baseline() {
        let mut config = TargetConfig::default();
        config.baseline = BaselineMode::TargetMedian;
        let targets = vec![
            TargetCount { name: "Chrom2", droplets: Some(1000), expected_ratio: 1.0 },
            TargetCount { name: "Chrom3", droplets: Some(1000), expected_ratio: 1.0 },
            TargetCount { name: "Chrom4", droplets: Some(1000), expected_ratio: 1.0 },
        ];

        let results = estimate_copy_numbers(Some(5), &targets, &config);
        assert_eq!(results.len(), 3);
        assert!((results[0].baseline - 1000.0).abs() < 1e-9);
        assert!(results.iter().all(|r| r.qc == QcStatus::InsufficientDroplets));
        assert!(results.iter().all(|r| r.reference_droplets == 5));

        let results = estimate_copy_numbers(None, &targets, &config);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.qc == QcStatus::InsufficientDroplets && r.reference_droplets == 0));
    }

    #[test]
    fn test_target_median_mode() {
        let mut config = TargetConfig::default();
        config.baseline = BaselineMode::TargetMedian;
        let targets = vec![
            TargetCount { name: "Chrom2", droplets: Some(1000), expected_ratio: 1.0 },
            TargetCount { name: "Chrom3", droplets: Some(1000), expected_ratio: 1.0 },
            TargetCount { name: "Chrom4", droplets: Some(1500), expected_ratio: 1.0 },
        ];
        let results = estimate_copy_numbers(Some(1000), &targets, &config);
        assert_eq!(results.len(), 3);
        assert!((results[2].baseline - 1000.0).abs() < 1e-9);
        assert_eq!(results[2].qc, QcStatus::Aberrant);
        assert_eq!(results[0].qc, QcStatus::Normal);
    }
}
