use ddcore::algorithm::copy_number::{estimate_copy_numbers, TargetCount};
use ddcore::algorithm::preprocess::preprocess;
use ddcore::config::TargetConfig;
use ddcore::data::assignment::TargetAssignment;
use ddcore::data::cluster::Cluster;
use ddcore::data::copy_number::{CopyNumberResult, QcStatus};
use ddcore::data::droplet::{Droplet, RawDroplet};
use ddcore::data::well::WellId;
use ddcore::error::{AnalysisError, Diagnostic, WellFailure};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cluster::clusterer::cluster_droplets;
use crate::cluster::matching::match_clusters;

/// Overall verdict of a well, most severe first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WellStatus {
    Failed,
    Aberrant,
    Indeterminate,
    Normal,
}

/// Everything produced for one well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WellResult {
    pub well: WellId,
    pub droplets: Vec<Droplet>,
    pub dropped_droplets: usize,
    pub clusters: Vec<Cluster>,
    pub noise_count: usize,
    pub assignments: Vec<TargetAssignment>,
    pub copy_numbers: Vec<CopyNumberResult>,
    pub diagnostics: Vec<Diagnostic>,
    /// tolerance multiplier used by the matcher
    pub scale_factor: Option<f64>,
    pub failure: Option<WellFailure>,
}

impl WellResult {
    fn new(well: WellId) -> Self {
        WellResult {
            well,
            droplets: Vec::new(),
            dropped_droplets: 0,
            clusters: Vec::new(),
            noise_count: 0,
            assignments: Vec::new(),
            copy_numbers: Vec::new(),
            diagnostics: Vec::new(),
            scale_factor: None,
            failure: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn has_aberration(&self) -> bool {
        self.copy_numbers.iter().any(|c| c.qc == QcStatus::Aberrant)
    }

    pub fn has_indeterminate(&self) -> bool {
        self.copy_numbers.iter().any(|c| c.qc == QcStatus::Indeterminate)
    }

    pub fn copy_number_for(&self, target: &str) -> Option<&CopyNumberResult> {
        self.copy_numbers.iter().find(|c| c.target == target)
    }

    pub fn status(&self) -> WellStatus {
        if self.is_failed() {
            WellStatus::Failed
        } else if self.has_aberration() {
            WellStatus::Aberrant
        } else if self.has_indeterminate() {
            WellStatus::Indeterminate
        } else {
            WellStatus::Normal
        }
    }
}

fn run(result: &mut WellResult, raw: &[RawDroplet], config: &TargetConfig) -> Result<(), AnalysisError> {
    config.validate()?;

    let pre = preprocess(result.well, raw, &config.preprocess)?;
    result.dropped_droplets = pre.dropped;
    if pre.dropped > 0 {
        result.diagnostics.push(Diagnostic::DroppedDroplets { count: pre.dropped });
    }
    result.droplets = pre.droplets;

    let clustering = cluster_droplets(&mut result.droplets, &config.clustering);
    result.noise_count = result.droplets.iter().filter(|d| d.label.is_noise()).count();
    result.clusters = clustering?.clusters;

    let outcome = match_clusters(&result.clusters, &result.droplets, config);
    let counts: Vec<TargetCount> = config
        .targets
        .iter()
        .map(|t| TargetCount {
            name: &t.name,
            droplets: outcome.count_for(&t.name),
            expected_ratio: t.expected_ratio,
        })
        .collect();

    result.copy_numbers = estimate_copy_numbers(outcome.count_for(&config.reference.name), &counts, config);
    result.scale_factor = Some(outcome.scale_factor);
    result.assignments = outcome.assignments;
    result.diagnostics.extend(outcome.diagnostics);
    Ok(())
}

/// Preprocess, cluster, match and estimate one well.
///
/// Never panics on data: a failing stage is recorded on the returned result
/// and the stages after it are skipped.
pub fn analyze_well(well: WellId, raw: &[RawDroplet], config: &TargetConfig) -> WellResult {
    let mut result = WellResult::new(well);

    if let Err(err) = run(&mut result, raw, config) {
        let failure = WellFailure::from(&err);
        warn!("{}: {}", well, failure.message);
        match err {
            AnalysisError::InsufficientData { dropped, .. } => result.dropped_droplets = dropped,
            AnalysisError::ClusteringFailed { clusters, .. } => result.clusters = clusters,
            AnalysisError::InvalidConfig(_) => {}
        }
        result.failure = Some(failure);
    } else {
        debug!(
            "{}: {} clusters, {} copy-number results, status {:?}",
            well,
            result.clusters.len(),
            result.copy_numbers.len(),
            result.status()
        );
    }

    result
}
