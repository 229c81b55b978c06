use std::collections::BTreeMap;

use ddcore::algorithm::statistics::{target_statistics, TargetStatistics};
use ddcore::config::TargetConfig;
use ddcore::data::droplet::RawDroplet;
use ddcore::data::well::WellId;
use ddcore::error::FailureKind;
use log::{info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::pipeline::well::{analyze_well, WellResult};

/// Counts over all wells of a plate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlateDiagnostics {
    pub total_wells: usize,
    pub analyzed_wells: usize,
    pub failed_wells: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    /// wells with at least one aberrant target
    pub aberrant_wells: usize,
    /// wells with at least one target in the buffer zone
    pub indeterminate_wells: usize,
}

impl PlateDiagnostics {
    fn from_wells(wells: &[WellResult]) -> Self {
        let mut diagnostics = PlateDiagnostics { total_wells: wells.len(), ..Default::default() };
        for w in wells {
            match &w.failure {
                Some(f) => {
                    diagnostics.failed_wells += 1;
                    *diagnostics.failures_by_kind.entry(f.kind).or_insert(0) += 1;
                }
                None => {
                    diagnostics.analyzed_wells += 1;
                    diagnostics.aberrant_wells += w.has_aberration() as usize;
                    diagnostics.indeterminate_wells += w.has_indeterminate() as usize;
                }
            }
        }
        diagnostics
    }
}

/// All well results of a plate in row-major order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlateSummary {
    pub wells: Vec<WellResult>,
    pub diagnostics: PlateDiagnostics,
    /// copy-number distribution per target over the analyzed wells
    pub target_statistics: Vec<TargetStatistics>,
}

impl PlateSummary {
    pub fn from_wells(wells: Vec<WellResult>) -> Self {
        let diagnostics = PlateDiagnostics::from_wells(&wells);
        let target_statistics = target_statistics(
            wells
                .iter()
                .filter(|w| !w.is_failed())
                .flat_map(|w| w.copy_numbers.iter()),
        );
        PlateSummary { wells, diagnostics, target_statistics }
    }

    pub fn well(&self, id: WellId) -> Option<&WellResult> {
        self.wells.iter().find(|w| w.well == id)
    }

    pub fn failed_wells(&self) -> impl Iterator<Item = &WellResult> {
        self.wells.iter().filter(|w| w.is_failed())
    }
}

/// Analyzes every well on the global rayon pool.
pub fn analyze_plate(wells: &BTreeMap<WellId, Vec<RawDroplet>>, config: &TargetConfig) -> PlateSummary {
    analyze_plate_with_threads(wells, config, 0)
}

/// Analyzes every well; `num_threads == 0` uses the global rayon pool.
///
/// A failing well never stops the plate: its result carries the failure and
/// is counted in the diagnostics.
pub fn analyze_plate_with_threads(
    wells: &BTreeMap<WellId, Vec<RawDroplet>>,
    config: &TargetConfig,
    num_threads: usize,
) -> PlateSummary {
    let build = || -> Vec<WellResult> {
        // BTreeMap iteration is row-major and indexed collect keeps it
        let entries: Vec<(&WellId, &Vec<RawDroplet>)> = wells.iter().collect();
        entries
            .par_iter()
            .map(|(well, raw)| analyze_well(**well, raw, config))
            .collect()
    };

    let results = if num_threads == 0 {
        build()
    } else {
        match ThreadPoolBuilder::new().num_threads(num_threads).build() {
            Ok(pool) => pool.install(build),
            Err(e) => {
                warn!("could not build a pool of {} threads ({}), using the global pool", num_threads, e);
                build()
            }
        }
    };

    let summary = PlateSummary::from_wells(results);
    let d = &summary.diagnostics;
    for w in summary.failed_wells() {
        if let Some(f) = &w.failure {
            warn!("well {} failed: {:?}", w.well, f.kind);
        }
    }
    info!(
        "plate analyzed: {} wells, {} analyzed, {} failed, {} aberrant, {} indeterminate",
        d.total_wells, d.analyzed_wells, d.failed_wells, d.aberrant_wells, d.indeterminate_wells
    );
    summary
}
