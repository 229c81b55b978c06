//! Assay configuration.
//!
//! A `TargetConfig` describes the expected droplet populations of a multiplex
//! assay together with every tunable of the pipeline. It is passed explicitly
//! into each analysis call; nothing is read from process-wide state.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::cluster::Centroid;
use crate::error::ConfigError;

/// Expected fluorescence state of one channel relative to the empty droplets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Positive,
    Negative,
    #[default]
    Any,
}

/// Quadrant constraint of a target over the two channel axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSignature {
    pub ch1: Polarity,
    pub ch2: Polarity,
}

impl ChannelSignature {
    pub fn new(ch1: Polarity, ch2: Polarity) -> Self {
        ChannelSignature { ch1, ch2 }
    }
}

fn default_expected_ratio() -> f64 {
    1.0
}

/// An expected droplet population and its amplitude signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    /// expected (ch1, ch2) centroid
    pub expected_centroid: [f64; 2],
    /// matching radius; falls back to `MatchingParams::base_tolerance`
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub signature: Option<ChannelSignature>,
    /// euploid target/baseline ratio of this assay
    #[serde(default = "default_expected_ratio")]
    pub expected_ratio: f64,
}

impl TargetSpec {
    pub fn new(name: &str, ch1: f64, ch2: f64) -> Self {
        TargetSpec {
            name: name.to_string(),
            expected_centroid: [ch1, ch2],
            tolerance: None,
            signature: None,
            expected_ratio: 1.0,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_signature(mut self, signature: ChannelSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_expected_ratio(mut self, expected_ratio: f64) -> Self {
        self.expected_ratio = expected_ratio;
        self
    }

    pub fn expected(&self) -> Centroid {
        Centroid::from(self.expected_centroid)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// fewer valid droplets than this fails the well
    pub min_valid_droplets: usize,
    pub ch1_scale: f64,
    pub ch2_scale: f64,
    pub min_amplitude: Option<f64>,
    pub max_amplitude: Option<f64>,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            min_valid_droplets: 50,
            ch1_scale: 1.0,
            ch2_scale: 1.0,
            min_amplitude: None,
            max_amplitude: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMethod {
    ExcessOfMass,
    Leaf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    /// in standardized amplitude units
    pub cluster_selection_epsilon: f64,
    pub selection_method: SelectionMethod,
    pub allow_single_cluster: bool,
    /// z-score each channel before clustering
    pub standardize: bool,
    /// fewer non-noise clusters than this fails the well
    pub min_clusters: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 4,
            min_samples: 70,
            cluster_selection_epsilon: 0.06,
            selection_method: SelectionMethod::ExcessOfMass,
            allow_single_cluster: false,
            standardize: true,
            min_clusters: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingParams {
    pub base_tolerance: f64,
    // adaptive tolerance: scale = clamp(sqrt(range_ch1 * range_ch2 / reference_area))
    pub scale_factor_min: f64,
    pub scale_factor_max: f64,
    pub reference_area: f64,
    /// shift expected centroids by the offset of the empty cluster
    pub drift_correction: bool,
    /// amplitude above the empty cluster that counts as channel-positive
    pub polarity_margin: f64,
    /// relative distance within which two candidates are tied
    pub tie_margin: f64,
}

impl Default for MatchingParams {
    fn default() -> Self {
        Self {
            base_tolerance: 500.0,
            scale_factor_min: 0.5,
            scale_factor_max: 1.0,
            reference_area: 5.0e6,
            drift_correction: true,
            polarity_margin: 300.0,
            tie_margin: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcThresholds {
    /// minimum droplets in both reference and target cluster
    pub min_droplets: usize,
    /// relative half-width of the euploid band
    pub euploid_tolerance: f64,
    /// relative half-width of the band around each aneuploid level
    pub aneuploidy_tolerance: f64,
    /// highest copy-number level considered
    pub max_copy_number: u32,
    /// deletion/duplication ratios (e.g. `[0.75, 1.25]`), placed at
    /// `expected_ratio + (target - 1)`; replaces the `k / ploidy` levels
    pub aneuploidy_targets: Option<Vec<f64>>,
    // median baseline
    pub baseline_deviation: f64,
    pub baseline_min_targets: usize,
}

impl Default for QcThresholds {
    fn default() -> Self {
        Self {
            min_droplets: 10,
            euploid_tolerance: 0.15,
            aneuploidy_tolerance: 0.15,
            max_copy_number: 4,
            aneuploidy_targets: None,
            baseline_deviation: 0.15,
            baseline_min_targets: 3,
        }
    }
}

/// Denominator of the copy-number ratio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineMode {
    /// droplet count of the reference cluster
    #[default]
    Reference,
    /// robust median over reference and target counts
    TargetMedian,
}

fn default_ploidy() -> f64 {
    2.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// empty (negative) droplet population
    pub empty: TargetSpec,
    pub reference: TargetSpec,
    pub targets: Vec<TargetSpec>,
    #[serde(default = "default_ploidy")]
    pub ploidy: f64,
    #[serde(default)]
    pub baseline: BaselineMode,
    #[serde(default)]
    pub preprocess: PreprocessParams,
    #[serde(default)]
    pub clustering: ClusteringParams,
    #[serde(default)]
    pub matching: MatchingParams,
    #[serde(default)]
    pub qc: QcThresholds,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            empty: TargetSpec::new("Negative", 900.0, 700.0),
            reference: TargetSpec::new("Chrom1", 900.0, 2300.0),
            targets: vec![
                // euploid ratios calibrated on the five-plex assay
                TargetSpec::new("Chrom2", 1700.0, 2000.0).with_expected_ratio(1.0066),
                TargetSpec::new("Chrom3", 2400.0, 1750.0).with_expected_ratio(1.0300),
                TargetSpec::new("Chrom4", 2900.0, 1250.0).with_expected_ratio(0.9890),
                TargetSpec::new("Chrom5", 3400.0, 700.0).with_expected_ratio(1.0056),
            ],
            ploidy: default_ploidy(),
            baseline: BaselineMode::default(),
            preprocess: PreprocessParams::default(),
            clustering: ClusteringParams::default(),
            matching: MatchingParams::default(),
            qc: QcThresholds::default(),
        }
    }
}

impl TargetConfig {
    pub fn new(empty: TargetSpec, reference: TargetSpec, targets: Vec<TargetSpec>) -> Self {
        Self { empty, reference, targets, ..Default::default() }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TargetConfig = serde_json::from_str(json)?;
        config.validate()?;
        debug!(
            "loaded target config: reference {}, {} targets",
            config.reference.name,
            config.targets.len()
        );
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reference first, then targets in configured order.
    pub fn named_targets(&self) -> impl Iterator<Item = &TargetSpec> {
        std::iter::once(&self.reference).chain(self.targets.iter())
    }

    pub fn find_target(&self, name: &str) -> Option<&TargetSpec> {
        self.named_targets().find(|t| t.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for spec in std::iter::once(&self.empty).chain(self.named_targets()) {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::invalid("targets.name", "target names must not be empty"));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::invalid("targets.name", format!("duplicate target name {}", spec.name)));
            }
            if !spec.expected_centroid.iter().all(|v| v.is_finite()) {
                return Err(ConfigError::invalid(
                    "targets.expected_centroid",
                    format!("non-finite centroid for {}", spec.name),
                ));
            }
            if let Some(tol) = spec.tolerance {
                if !(tol.is_finite() && tol > 0.0) {
                    return Err(ConfigError::invalid("targets.tolerance", format!("tolerance of {} must be positive", spec.name)));
                }
            }
            if !(spec.expected_ratio.is_finite() && spec.expected_ratio > 0.0) {
                return Err(ConfigError::invalid(
                    "targets.expected_ratio",
                    format!("expected ratio of {} must be positive", spec.name),
                ));
            }
        }

        if !(self.ploidy.is_finite() && self.ploidy > 0.0) {
            return Err(ConfigError::invalid("ploidy", "must be positive"));
        }

        let p = &self.preprocess;
        if !(p.ch1_scale.is_finite() && p.ch1_scale > 0.0 && p.ch2_scale.is_finite() && p.ch2_scale > 0.0) {
            return Err(ConfigError::invalid("preprocess.scale", "channel scales must be positive"));
        }
        if let (Some(lo), Some(hi)) = (p.min_amplitude, p.max_amplitude) {
            if lo > hi {
                return Err(ConfigError::invalid("preprocess.min_amplitude", "exceeds max_amplitude"));
            }
        }

        let c = &self.clustering;
        if c.min_cluster_size < 2 {
            return Err(ConfigError::invalid("clustering.min_cluster_size", "must be at least 2"));
        }
        if c.min_samples < 1 {
            return Err(ConfigError::invalid("clustering.min_samples", "must be at least 1"));
        }
        if !(c.cluster_selection_epsilon >= 0.0) {
            return Err(ConfigError::invalid("clustering.cluster_selection_epsilon", "must be non-negative"));
        }
        if c.min_clusters < 1 {
            return Err(ConfigError::invalid("clustering.min_clusters", "must be at least 1"));
        }

        let m = &self.matching;
        if !(m.base_tolerance > 0.0) {
            return Err(ConfigError::invalid("matching.base_tolerance", "must be positive"));
        }
        if !(m.scale_factor_min > 0.0 && m.scale_factor_min <= m.scale_factor_max) {
            return Err(ConfigError::invalid("matching.scale_factor_min", "must be positive and not exceed scale_factor_max"));
        }
        if !(m.reference_area > 0.0) {
            return Err(ConfigError::invalid("matching.reference_area", "must be positive"));
        }
        if !(m.polarity_margin >= 0.0 && m.tie_margin >= 0.0) {
            return Err(ConfigError::invalid("matching.tie_margin", "margins must be non-negative"));
        }

        let q = &self.qc;
        if !(q.euploid_tolerance >= 0.0 && q.aneuploidy_tolerance >= 0.0 && q.baseline_deviation >= 0.0) {
            return Err(ConfigError::invalid("qc.tolerance", "tolerances must be non-negative"));
        }
        if (q.max_copy_number as f64) <= self.ploidy {
            return Err(ConfigError::invalid("qc.max_copy_number", "must exceed the ploidy baseline"));
        }
        if let Some(targets) = &q.aneuploidy_targets {
            if targets.is_empty() || !targets.iter().all(|t| t.is_finite() && *t >= 0.0 && (t - 1.0).abs() > 1e-9) {
                return Err(ConfigError::invalid(
                    "qc.aneuploidy_targets",
                    "needs at least one finite, non-negative ratio other than 1",
                ));
            }
        }
        if q.baseline_min_targets < 1 {
            return Err(ConfigError::invalid("qc.baseline_min_targets", "must be at least 1"));
        }

        Ok(())
    }
}
