//! HDBSCAN over two-dimensional amplitude points.
//!
//! 1. core distance: distance to the `min_samples`-th nearest other point
//! 2. mutual reachability: max(core_a, core_b, d(a, b))
//! 3. minimum spanning tree (dense Prim, O(n) memory)
//! 4. single-linkage tree via union-find over sorted MST edges
//! 5. condensed tree (splits smaller than `min_cluster_size` are fall-outs)
//! 6. cluster selection: excess of mass or leaf, then epsilon merging
//!
//! Every step breaks ties by point index, so labels are a pure function of the
//! input order.

use std::collections::{BTreeSet, VecDeque};

use ddcore::config::{ClusteringParams, SelectionMethod};
use rayon::prelude::*;

#[inline]
fn euclidean(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

#[inline]
fn lambda_of(distance: f64) -> f64 {
    1.0 / distance.max(1e-12)
}

/// One merge of the single-linkage tree; node ids `>= n` are merges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// Edge of the condensed tree. `child < n` is a point falling out of
/// `parent`; otherwise `child` is a cluster born at `lambda`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CondensedEdge {
    pub parent: usize,
    pub child: usize,
    pub lambda: f64,
    pub size: usize,
}

#[derive(Clone, Debug, Default)]
pub struct HdbscanResult {
    /// cluster index per point, `None` for noise
    pub labels: Vec<Option<usize>>,
    /// stability per cluster index
    pub stabilities: Vec<f64>,
}

impl HdbscanResult {
    fn all_noise(n: usize) -> Self {
        HdbscanResult { labels: vec![None; n], stabilities: Vec::new() }
    }

    pub fn n_clusters(&self) -> usize {
        self.stabilities.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hdbscan {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub cluster_selection_epsilon: f64,
    pub selection_method: SelectionMethod,
    pub allow_single_cluster: bool,
}

impl Default for Hdbscan {
    fn default() -> Self {
        Hdbscan::from(&ClusteringParams::default())
    }
}

impl From<&ClusteringParams> for Hdbscan {
    fn from(p: &ClusteringParams) -> Self {
        Hdbscan {
            min_cluster_size: p.min_cluster_size.max(2),
            min_samples: p.min_samples.max(1),
            cluster_selection_epsilon: p.cluster_selection_epsilon,
            selection_method: p.selection_method,
            allow_single_cluster: p.allow_single_cluster,
        }
    }
}

impl Hdbscan {
    pub fn new(min_cluster_size: usize, min_samples: usize) -> Self {
        Hdbscan {
            min_cluster_size: min_cluster_size.max(2),
            min_samples: min_samples.max(1),
            cluster_selection_epsilon: 0.0,
            ..Default::default()
        }
    }

    pub fn fit(&self, points: &[[f64; 2]]) -> HdbscanResult {
        let n = points.len();
        if n < 2 || n < self.min_cluster_size {
            return HdbscanResult::all_noise(n);
        }

        let core = core_distances(points, self.min_samples);
        let mut mst = minimum_spanning_tree(points, &core);
        mst.sort_by(|a, b| a.2.total_cmp(&b.2));
        let merges = single_linkage(&mst, n);
        let condensed = condense_tree(&merges, n, self.min_cluster_size);
        self.extract(&condensed, n)
    }

    fn extract(&self, condensed: &[CondensedEdge], n: usize) -> HdbscanResult {
        let tree = ClusterTree::new(condensed, n);
        if tree.len() == 0 {
            return HdbscanResult::all_noise(n);
        }

        let mut selected = match self.selection_method {
            SelectionMethod::ExcessOfMass => tree.select_eom(self.allow_single_cluster),
            SelectionMethod::Leaf => tree.select_leaves(self.allow_single_cluster),
        };
        if self.cluster_selection_epsilon > 0.0 {
            selected = tree.merge_below_epsilon(&selected, self.cluster_selection_epsilon, self.allow_single_cluster);
        }

        // selected ancestor-or-self; parents always carry smaller ids
        let mut owner: Vec<Option<usize>> = vec![None; tree.len()];
        for c in 0..tree.len() {
            owner[c] = if selected.contains(&c) {
                Some(c)
            } else if c == 0 {
                None
            } else {
                owner[tree.parent[c]]
            };
        }

        let index_of: Vec<Option<usize>> = {
            let mut idx = vec![None; tree.len()];
            for (i, &c) in selected.iter().enumerate() {
                idx[c] = Some(i);
            }
            idx
        };

        let mut labels = vec![None; n];
        for e in condensed.iter().filter(|e| e.child < n) {
            labels[e.child] = owner[e.parent - n].and_then(|c| index_of[c]);
        }

        HdbscanResult {
            labels,
            stabilities: selected.iter().map(|&c| tree.stability[c]).collect(),
        }
    }
}

/// Distance to the `min_samples`-th nearest other point.
pub fn core_distances(points: &[[f64; 2]], min_samples: usize) -> Vec<f64> {
    let n = points.len();
    let k = min_samples.min(n.saturating_sub(1));
    if k == 0 {
        return vec![0.0; n];
    }

    points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut d: Vec<f64> = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| euclidean(p, q))
                .collect();
            let (_, kth, _) = d.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
            *kth
        })
        .collect()
}

/// Prim's algorithm over the implicit mutual-reachability graph.
pub fn minimum_spanning_tree(points: &[[f64; 2]], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0usize;
    in_tree[current] = true;

    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_d = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = euclidean(&points[current], &points[j]).max(core[current]).max(core[j]);
            if d < best[j] {
                best[j] = d;
                from[j] = current;
            }
            if best[j] < next_d || next == usize::MAX {
                next_d = best[j];
                next = j;
            }
        }
        in_tree[next] = true;
        edges.push((from[next], next, next_d));
        current = next;
    }

    edges
}

/// Builds the single-linkage dendrogram from MST edges sorted by weight.
pub fn single_linkage(sorted_edges: &[(usize, usize, f64)], n: usize) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n).collect();
    let mut size = vec![1usize; 2 * n];
    let mut next = n;

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut merges = Vec::with_capacity(n.saturating_sub(1));
    for &(a, b, distance) in sorted_edges {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra == rb {
            continue;
        }
        let merged = size[ra] + size[rb];
        merges.push(Merge { left: ra, right: rb, distance, size: merged });
        parent[ra] = next;
        parent[rb] = next;
        size[next] = merged;
        next += 1;
    }
    merges
}

fn subtree_points(merges: &[Merge], n: usize, node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(x) = stack.pop() {
        if x < n {
            out.push(x);
        } else {
            let m = &merges[x - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    out
}

/// Condenses the dendrogram top-down. Cluster ids start at `n` (the root)
/// and are assigned breadth-first, so a parent id is always smaller than its
/// children's.
pub fn condense_tree(merges: &[Merge], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    if merges.len() + 1 != n {
        // disconnected input cannot happen with a complete MST
        return Vec::new();
    }

    let size_of = |node: usize| if node < n { 1 } else { merges[node - n].size };
    let root = 2 * n - 2;
    let mut relabel = vec![0usize; 2 * n - 1];
    relabel[root] = n;
    let mut next_label = n + 1;

    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        if node < n {
            continue;
        }
        let m = merges[node - n];
        let lambda = lambda_of(m.distance);
        let parent = relabel[node];
        let (ls, rs) = (size_of(m.left), size_of(m.right));

        match (ls >= min_cluster_size, rs >= min_cluster_size) {
            (true, true) => {
                for (child, size) in [(m.left, ls), (m.right, rs)] {
                    relabel[child] = next_label;
                    out.push(CondensedEdge { parent, child: next_label, lambda, size });
                    next_label += 1;
                    queue.push_back(child);
                }
            }
            (false, false) => {
                for p in subtree_points(merges, n, m.left).into_iter().chain(subtree_points(merges, n, m.right)) {
                    out.push(CondensedEdge { parent, child: p, lambda, size: 1 });
                }
            }
            (keep_left, _) => {
                let (big, small) = if keep_left { (m.left, m.right) } else { (m.right, m.left) };
                relabel[big] = parent;
                for p in subtree_points(merges, n, small) {
                    out.push(CondensedEdge { parent, child: p, lambda, size: 1 });
                }
                queue.push_back(big);
            }
        }
    }
    out
}

/// Cluster-only view of the condensed tree, indexed by `id - n`.
struct ClusterTree {
    parent: Vec<usize>,
    children: Vec<Vec<usize>>,
    birth: Vec<f64>,
    stability: Vec<f64>,
}

impl ClusterTree {
    fn new(condensed: &[CondensedEdge], n: usize) -> Self {
        let k = condensed
            .iter()
            .map(|e| e.parent.max(if e.child >= n { e.child } else { 0 }))
            .max()
            .map_or(0, |m| m + 1 - n);

        let mut parent = vec![0usize; k];
        let mut children = vec![Vec::new(); k];
        let mut birth = vec![0.0f64; k];
        for e in condensed.iter().filter(|e| e.child >= n) {
            let (c, p) = (e.child - n, e.parent - n);
            parent[c] = p;
            children[p].push(c);
            birth[c] = e.lambda;
        }

        let mut stability = vec![0.0f64; k];
        for e in condensed {
            let p = e.parent - n;
            stability[p] += (e.lambda - birth[p]) * e.size as f64;
        }

        ClusterTree { parent, children, birth, stability }
    }

    fn len(&self) -> usize {
        self.parent.len()
    }

    fn descendants(&self, c: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = self.children[c].clone();
        while let Some(x) = stack.pop() {
            out.push(x);
            stack.extend(self.children[x].iter().copied());
        }
        out
    }

    fn select_eom(&self, allow_single_cluster: bool) -> BTreeSet<usize> {
        let mut stab = self.stability.clone();
        let mut is_cluster = vec![true; self.len()];
        if !allow_single_cluster {
            is_cluster[0] = false;
        }

        for c in (0..self.len()).rev() {
            if c == 0 && !allow_single_cluster {
                continue;
            }
            let subtree: f64 = self.children[c].iter().map(|&ch| stab[ch]).sum();
            if subtree > stab[c] {
                is_cluster[c] = false;
                stab[c] = subtree;
            } else {
                for d in self.descendants(c) {
                    is_cluster[d] = false;
                }
            }
        }

        (0..self.len()).filter(|&c| is_cluster[c]).collect()
    }

    fn select_leaves(&self, allow_single_cluster: bool) -> BTreeSet<usize> {
        (0..self.len())
            .filter(|&c| self.children[c].is_empty() && (c != 0 || allow_single_cluster))
            .collect()
    }

    /// Replaces clusters born below `epsilon` (in distance) by the first
    /// ancestor born above it.
    fn merge_below_epsilon(&self, selected: &BTreeSet<usize>, epsilon: f64, allow_single_cluster: bool) -> BTreeSet<usize> {
        let mut chosen = BTreeSet::new();
        for &c in selected {
            if c == 0 || 1.0 / self.birth[c] >= epsilon {
                chosen.insert(c);
                continue;
            }
            let mut node = c;
            loop {
                let p = self.parent[node];
                if p == 0 {
                    chosen.insert(if allow_single_cluster { 0 } else { node });
                    break;
                }
                if 1.0 / self.birth[p] > epsilon {
                    chosen.insert(p);
                    break;
                }
                node = p;
            }
        }

        let nested: BTreeSet<usize> = chosen.iter().flat_map(|&c| self.descendants(c)).collect();
        chosen.difference(&nested).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_blob(cx: f64, cy: f64, side: usize, step: f64) -> Vec<[f64; 2]> {
        let mut out = Vec::new();
        for i in 0..side {
            for j in 0..side {
                out.push([cx + i as f64 * step, cy + j as f64 * step]);
            }
        }
        out
    }

    fn three_blobs() -> Vec<[f64; 2]> {
        let mut points = grid_blob(0.0, 0.0, 5, 0.1);
        points.extend(grid_blob(10.0, 0.0, 5, 0.1));
        points.extend(grid_blob(0.0, 10.0, 5, 0.1));
        points
    }

    #[test]
    fn test_three_separated_blobs() {
        let points = three_blobs();
        let result = Hdbscan::new(5, 3).fit(&points);

        assert_eq!(result.n_clusters(), 3);
        assert!(result.labels.iter().all(|l| l.is_some()));
        for blob in 0..3 {
            let first = result.labels[blob * 25];
            assert!(result.labels[blob * 25..(blob + 1) * 25].iter().all(|l| *l == first));
        }
        assert_ne!(result.labels[0], result.labels[25]);
        assert_ne!(result.labels[25], result.labels[50]);
    }

    #[test]
    fn test_outlier_is_noise() {
        let mut points = three_blobs();
        points.push([100.0, 100.0]);
        let result = Hdbscan::new(5, 3).fit(&points);
        assert_eq!(result.labels[75], None);
        assert_eq!(result.n_clusters(), 3);
    }

    #[test]
    fn test_deterministic() {
        let points = three_blobs();
        let h = Hdbscan::new(5, 3);
        assert_eq!(h.fit(&points).labels, h.fit(&points).labels);
    }

    #[test]
    fn test_small_and_empty_input() {
        let h = Hdbscan::new(5, 5);
        assert!(h.fit(&[]).labels.is_empty());
        let result = h.fit(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(result.labels.iter().all(|l| l.is_none()));
        assert_eq!(result.n_clusters(), 0);
    }

    #[test]
    fn test_single_blob_with_allow_single() {
        let points = grid_blob(0.0, 0.0, 6, 0.1);
        let h = Hdbscan { allow_single_cluster: true, ..Hdbscan::new(5, 3) };
        let result = h.fit(&points);
        assert_eq!(result.n_clusters(), 1);
        assert!(result.labels.iter().all(|l| *l == Some(0)));
    }

    #[test]
    fn test_core_distances() {
        let points: Vec<[f64; 2]> = (0..5).map(|i| [i as f64, 0.0]).collect();
        let core = core_distances(&points, 2);
        // ends reach their 2nd neighbour at distance 2, inner points at 1
        assert_eq!(core, vec![2.0, 1.0, 1.0, 1.0, 2.0]);
        assert_eq!(core_distances(&points, 0), vec![0.0; 5]);
    }

    #[test]
    fn test_mst_and_linkage() {
        let points = vec![[0.0, 0.0], [1.0, 0.0], [3.0, 0.0]];
        let core = vec![0.0; 3];
        let mut mst = minimum_spanning_tree(&points, &core);
        assert_eq!(mst.len(), 2);
        mst.sort_by(|a, b| a.2.total_cmp(&b.2));
        let merges = single_linkage(&mst, 3);
        assert_eq!(merges.len(), 2);
        assert_eq!(merges[0].distance, 1.0);
        assert_eq!(merges[1].distance, 2.0);
        assert_eq!(merges[1].size, 3);
    }

    #[test]
    fn test_epsilon_merges_close_clusters() {
        // two blobs 1.0 apart plus a distant third one
        let mut points = grid_blob(0.0, 0.0, 5, 0.1);
        points.extend(grid_blob(1.4, 0.0, 5, 0.1));
        points.extend(grid_blob(20.0, 0.0, 5, 0.1));

        let h = Hdbscan::new(5, 3);
        assert_eq!(h.fit(&points).n_clusters(), 3);

        let merged = Hdbscan { cluster_selection_epsilon: 2.0, ..h }.fit(&points);
        assert_eq!(merged.n_clusters(), 2);
        assert_eq!(merged.labels[0], merged.labels[25]);
        assert_ne!(merged.labels[0], merged.labels[50]);
    }
}
