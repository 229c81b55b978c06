use ddcore::config::ClusteringParams;
use ddcore::data::cluster::Cluster;
use ddcore::data::droplet::{ClusterLabel, Droplet};
use ddcore::error::AnalysisError;
use itertools::Itertools;
use log::debug;

use crate::cluster::hdbscan::Hdbscan;
use crate::cluster::scaling::StandardScaler;

/// Clusters of one well, numbered by ascending centroid.
#[derive(Clone, Debug, Default)]
pub struct Clustering {
    pub clusters: Vec<Cluster>,
    pub noise_count: usize,
}

/// Labels every droplet with a cluster or noise and returns the clusters.
///
/// Labels are written into `droplets` even when too few clusters are found,
/// so a failed well still carries its partial partition.
pub fn cluster_droplets(droplets: &mut [Droplet], params: &ClusteringParams) -> Result<Clustering, AnalysisError> {
    let raw: Vec<[f64; 2]> = droplets.iter().map(|d| [d.ch1, d.ch2]).collect();
    let points = if params.standardize {
        StandardScaler::fit_transform(&raw).1
    } else {
        raw
    };

    let result = Hdbscan::from(params).fit(&points);

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); result.n_clusters()];
    for (i, label) in result.labels.iter().enumerate() {
        if let Some(c) = label {
            groups[*c].push(i);
        }
    }

    let clusters: Vec<Cluster> = groups
        .into_iter()
        .zip(result.stabilities.iter().copied())
        .filter(|(members, _)| members.len() >= params.min_cluster_size)
        .map(|(members, stability)| Cluster::from_members(0, droplets, members, stability))
        .sorted_by(|a, b| a.centroid.geometric_cmp(&b.centroid))
        .enumerate()
        .map(|(i, mut c)| {
            c.label = i as u32;
            c
        })
        .collect();

    for d in droplets.iter_mut() {
        d.label = ClusterLabel::Noise;
    }
    for c in &clusters {
        for &i in &c.members {
            droplets[i].label = ClusterLabel::Cluster(c.label);
        }
    }

    let clustered: usize = clusters.iter().map(|c| c.droplet_count).sum();
    let noise_count = droplets.len() - clustered;
    debug!("{} clusters, {} noise droplets", clusters.len(), noise_count);

    if clusters.len() < params.min_clusters {
        return Err(AnalysisError::ClusteringFailed {
            found: clusters.len(),
            required: params.min_clusters,
            clusters,
        });
    }

    Ok(Clustering { clusters, noise_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddcore::data::well::WellId;

    fn blob(well: WellId, start: usize, cx: f64, cy: f64) -> Vec<Droplet> {
        (0..36)
            .map(|k| {
                let (i, j) = (k / 6, k % 6);
                Droplet::new(well, start + k, cx + i as f64 * 10.0, cy + j as f64 * 10.0)
            })
            .collect()
    }

    fn params() -> ClusteringParams {
        ClusteringParams {
            min_cluster_size: 10,
            min_samples: 5,
            cluster_selection_epsilon: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_and_ordering() {
        let well: WellId = "A01".parse().unwrap();
        // listed out of geometric order on purpose
        let mut droplets = blob(well, 0, 3000.0, 1000.0);
        droplets.extend(blob(well, 36, 900.0, 700.0));
        droplets.extend(blob(well, 72, 900.0, 2300.0));

        let clustering = cluster_droplets(&mut droplets, &params()).unwrap();
        assert_eq!(clustering.clusters.len(), 3);
        assert_eq!(clustering.noise_count, 0);

        let c = &clustering.clusters;
        assert!(c[0].centroid.ch1 < 1000.0 && c[0].centroid.ch2 < 1000.0);
        assert!(c[1].centroid.ch1 < 1000.0 && c[1].centroid.ch2 > 2000.0);
        assert!(c[2].centroid.ch1 > 2500.0);

        let total: usize = c.iter().map(|c| c.droplet_count).sum();
        assert_eq!(total + clustering.noise_count, droplets.len());
        for cl in c {
            assert!(cl.members.iter().all(|&i| droplets[i].label == ClusterLabel::Cluster(cl.label)));
        }
    }

    #[test]
    fn test_too_few_clusters() {
        let well: WellId = "A01".parse().unwrap();
        let mut droplets = blob(well, 0, 900.0, 700.0);
        let p = ClusteringParams { allow_single_cluster: true, ..params() };

        match cluster_droplets(&mut droplets, &p) {
            Err(AnalysisError::ClusteringFailed { found, required, clusters }) => {
                assert_eq!(found, 1);
                assert_eq!(required, 2);
                assert_eq!(clusters.len(), 1);
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.clusters.len())),
        }
    }
}
