use std::cmp::Reverse;

use ddcore::config::{MatchingParams, Polarity, TargetConfig, TargetSpec};
use ddcore::data::assignment::{Assignment, TargetAssignment};
use ddcore::data::cluster::{Centroid, Cluster};
use ddcore::data::droplet::Droplet;
use ddcore::error::Diagnostic;
use itertools::Itertools;
use log::{debug, warn};
use nalgebra::Vector2;
use ordered_float::OrderedFloat;

/// Result of mapping one well's clusters onto the configured targets.
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    /// one entry per cluster in label order, then one per missing target
    pub assignments: Vec<TargetAssignment>,
    pub diagnostics: Vec<Diagnostic>,
    pub scale_factor: f64,
    /// offset of the empty cluster from its expected centroid
    pub drift: Vector2<f64>,
}

impl MatchOutcome {
    /// Droplet count of the cluster matched to `name`.
    pub fn count_for(&self, name: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| !a.is_missing() && a.assignment.target_name() == Some(name))
            .map(|a| a.droplet_count)
    }

    pub fn empty_cluster(&self) -> Option<&TargetAssignment> {
        self.assignments.iter().find(|a| a.assignment == Assignment::Empty)
    }
}

/// Tolerance multiplier from the spread of the well's amplitudes.
pub fn scale_factor(droplets: &[Droplet], params: &MatchingParams) -> f64 {
    if droplets.is_empty() {
        return params.scale_factor_max;
    }
    let (lo1, hi1) = droplets.iter().map(|d| d.ch1).minmax_by(|a, b| a.total_cmp(b)).into_option().unwrap_or((0.0, 0.0));
    let (lo2, hi2) = droplets.iter().map(|d| d.ch2).minmax_by(|a, b| a.total_cmp(b)).into_option().unwrap_or((0.0, 0.0));

    let raw = ((hi1 - lo1) * (hi2 - lo2) / params.reference_area).sqrt();
    if raw.is_finite() {
        raw.clamp(params.scale_factor_min, params.scale_factor_max)
    } else {
        params.scale_factor_max
    }
}

#[inline]
fn channel_ok(value: f64, empty: f64, polarity: Polarity, margin: f64) -> bool {
    match polarity {
        Polarity::Positive => value > empty + margin,
        Polarity::Negative => value <= empty + margin,
        Polarity::Any => true,
    }
}

struct Winner {
    index: usize,
    distance: f64,
    alternatives: Vec<u32>,
}

/// Best candidate by distance; candidates within the tie margin of the best
/// are decided by larger droplet count, then lower label.
fn pick(candidates: &[(usize, f64)], clusters: &[Cluster], tie_margin: f64) -> Option<Winner> {
    let best = candidates.iter().map(|&(_, d)| OrderedFloat(d)).min()?.0;
    let limit = best * (1.0 + tie_margin) + f64::EPSILON;

    let tied: Vec<(usize, f64)> = candidates
        .iter()
        .copied()
        .filter(|&(_, d)| d <= limit)
        .sorted_by_key(|&(i, _)| (Reverse(clusters[i].droplet_count), clusters[i].label))
        .collect();

    let (index, distance) = tied[0];
    Some(Winner {
        index,
        distance,
        alternatives: tied[1..].iter().map(|&(i, _)| clusters[i].label).collect(),
    })
}

struct Matcher<'a> {
    clusters: &'a [Cluster],
    params: &'a MatchingParams,
    scale: f64,
    drift: Vector2<f64>,
    empty_reference: Centroid,
    used: Vec<bool>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Matcher<'a> {
    fn expected(&self, spec: &TargetSpec) -> Vector2<f64> {
        spec.expected().as_vector() + self.drift
    }

    fn tolerance(&self, spec: &TargetSpec) -> f64 {
        spec.tolerance.unwrap_or(self.params.base_tolerance) * self.scale
    }

    fn fits_signature(&self, spec: &TargetSpec, c: &Centroid) -> bool {
        spec.signature.map_or(true, |s| {
            let margin = self.params.polarity_margin;
            channel_ok(c.ch1, self.empty_reference.ch1, s.ch1, margin)
                && channel_ok(c.ch2, self.empty_reference.ch2, s.ch2, margin)
        })
    }

    fn candidates(&self, spec: &TargetSpec) -> Vec<(usize, f64)> {
        let expected = self.expected(spec);
        let tolerance = self.tolerance(spec);
        self.clusters
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.used[*i])
            .map(|(i, c)| (i, (c.centroid.as_vector() - expected).norm()))
            .filter(|&(i, d)| d <= tolerance && self.fits_signature(spec, &self.clusters[i].centroid))
            .collect()
    }

    fn take(&mut self, spec: &TargetSpec, candidates: &[(usize, f64)]) -> Option<(usize, f64)> {
        let winner = pick(candidates, self.clusters, self.params.tie_margin)?;
        if !winner.alternatives.is_empty() {
            warn!(
                "ambiguous match for {}: cluster {} chosen over {:?}",
                spec.name, self.clusters[winner.index].label, winner.alternatives
            );
            self.diagnostics.push(Diagnostic::AmbiguousAssignment {
                target: spec.name.clone(),
                chosen: self.clusters[winner.index].label,
                alternatives: winner.alternatives,
            });
        }
        self.used[winner.index] = true;
        Some((winner.index, winner.distance))
    }
}

/// Maps clusters onto the empty population, the reference and the targets.
///
/// The empty population is matched first and (optionally) anchors a drift
/// correction for every other expected centroid. The reference is matched
/// next, then the remaining targets greedily by ascending distance. A target
/// without a candidate is recorded as missing; the well itself still
/// succeeds.
pub fn match_clusters(clusters: &[Cluster], droplets: &[Droplet], config: &TargetConfig) -> MatchOutcome {
    let params = &config.matching;
    let scale = scale_factor(droplets, params);

    let mut m = Matcher {
        clusters,
        params,
        scale,
        drift: Vector2::zeros(),
        empty_reference: config.empty.expected(),
        used: vec![false; clusters.len()],
        diagnostics: Vec::new(),
    };

    // slot per cluster position: (assignment, distance)
    let mut slots: Vec<Option<(Assignment, f64)>> = vec![None; clusters.len()];
    let mut missing: Vec<&TargetSpec> = Vec::new();

    let empty_candidates = m.candidates(&config.empty);
    match m.take(&config.empty, &empty_candidates) {
        Some((i, d)) => {
            slots[i] = Some((Assignment::Empty, d));
            if params.drift_correction {
                m.drift = clusters[i].centroid.as_vector() - config.empty.expected().as_vector();
            }
            m.empty_reference = clusters[i].centroid;
        }
        None => missing.push(&config.empty),
    }
    debug!("scale factor {:.3}, drift ({:.1}, {:.1})", scale, m.drift.x, m.drift.y);

    let reference_candidates = m.candidates(&config.reference);
    match m.take(&config.reference, &reference_candidates) {
        Some((i, d)) => slots[i] = Some((Assignment::Reference(config.reference.name.clone()), d)),
        None => missing.push(&config.reference),
    }

    let pairs: Vec<(f64, usize, usize)> = config
        .targets
        .iter()
        .enumerate()
        .flat_map(|(t, spec)| m.candidates(spec).into_iter().map(move |(i, d)| (d, t, i)))
        .sorted_by_key(|&(d, t, i)| (OrderedFloat(d), t, i))
        .collect();

    let mut done = vec![false; config.targets.len()];
    for &(_, t, i) in &pairs {
        if done[t] || m.used[i] {
            continue;
        }
        let spec = &config.targets[t];
        let candidates = m.candidates(spec);
        if let Some((winner, d)) = m.take(spec, &candidates) {
            slots[winner] = Some((Assignment::Target(spec.name.clone()), d));
            done[t] = true;
        }
    }
    missing.extend(config.targets.iter().zip(&done).filter(|(_, d)| !**d).map(|(s, _)| s));

    let mut assignments: Vec<TargetAssignment> = clusters
        .iter()
        .zip(slots)
        .map(|(c, slot)| {
            let (assignment, distance) = match slot {
                Some((a, d)) => (a, Some(d)),
                None => (Assignment::Unmatched, None),
            };
            TargetAssignment {
                cluster: Some(c.label),
                centroid: Some(c.centroid),
                droplet_count: c.droplet_count,
                distance,
                assignment,
            }
        })
        .collect();

    for spec in missing {
        warn!("no cluster matches {}", spec.name);
        m.diagnostics.push(Diagnostic::MissingTarget { target: spec.name.clone() });
        assignments.push(TargetAssignment::missing(&spec.name));
    }

    MatchOutcome { assignments, diagnostics: m.diagnostics, scale_factor: scale, drift: m.drift }
}
