//! Hierarchical k-means tree index.
//!
//! The dataset is recursively partitioned with k-means: every internal
//! node holds exactly `branching` children, each child owning a contiguous
//! slice of the index permutation. Queries either traverse the whole tree
//! exactly or run a best-bin-first descent bounded by a checks budget,
//! backtracking through a priority queue of unexplored branches.
//!
//! Algorithm:
//! - Seed `branching` centers (random / Gonzales / k-means++)
//! - Lloyd iterations with empty-cluster repair
//! - Partition the permutation in place, recurse per cluster
//!
//! # References
//!
//! - Muja & Lowe (2009): "Fast approximate nearest neighbors with
//!   automatic algorithm configuration"
//! - Fukunaga & Narendra (1975): "A branch and bound algorithm for
//!   computing k-nearest neighbors"

mod clusters;
mod node;
mod persist;
mod search;
mod seeding;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::Dataset;
use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};
use node::{Node, NodeKind};

pub use seeding::CentersInit;

/// Checks budget for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checks {
    /// No budget: traverse the whole tree exactly.
    Unlimited,
    /// Stop scoring new leaves once this many dataset points were checked
    /// (the result set is still filled to capacity first).
    Budget(usize),
}

/// Construction parameters for [`KMeansTreeIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansTreeParams {
    /// Children per internal node. Build fails if < 2.
    pub branching: usize,
    /// Lloyd iteration cap per node; negative means unlimited.
    pub iterations: i32,
    /// Strategy for the initial cluster centers.
    pub centers_init: CentersInit,
    /// Cluster-boundary weight applied to branch priorities during
    /// best-bin-first search. Larger values favor wider clusters.
    pub cb_index: f32,
    /// Deterministic seed for center selection. `None` draws one from
    /// entropy.
    pub seed: Option<u64>,
}

impl Default for KMeansTreeParams {
    fn default() -> Self {
        Self {
            branching: 32,
            iterations: 11,
            centers_init: CentersInit::default(),
            cb_index: 0.4,
            seed: None,
        }
    }
}

impl KMeansTreeParams {
    /// Configure a deterministic seed for center selection.
    ///
    /// When set, repeated builds on the same dataset produce identical
    /// trees.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Hierarchical k-means tree index over a [`Dataset`].
pub struct KMeansTreeIndex {
    pub(crate) dataset: Dataset,
    pub(crate) metric: DistanceMetric,
    params: KMeansTreeParams,
    pub(crate) branching: usize,
    pub(crate) max_iter: usize,
    pub(crate) cb_index: f32,
    /// Permutation of `0..rows`; every leaf references a contiguous slice.
    pub(crate) perm: Vec<u32>,
    pub(crate) root: Option<Node>,
    pub(crate) memory_counter: usize,
}

impl KMeansTreeIndex {
    /// Create an unbuilt index with the default (squared L2) metric.
    pub fn new(dataset: Dataset, params: KMeansTreeParams) -> Result<Self> {
        Self::with_metric(dataset, params, DistanceMetric::default())
    }

    /// Create an unbuilt index with an explicit metric.
    pub fn with_metric(
        dataset: Dataset,
        params: KMeansTreeParams,
        metric: DistanceMetric,
    ) -> Result<Self> {
        if dataset.cols() == 0 && !dataset.is_empty() {
            return Err(IndexError::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        let max_iter = if params.iterations < 0 {
            usize::MAX
        } else {
            params.iterations as usize
        };
        Ok(Self {
            branching: params.branching,
            max_iter,
            cb_index: params.cb_index,
            perm: Vec::new(),
            root: None,
            memory_counter: 0,
            dataset,
            metric,
            params,
        })
    }

    /// Build the tree. Must be called exactly once before any query.
    pub fn build(&mut self) -> Result<()> {
        if self.root.is_some() {
            return Err(IndexError::InvalidParameter(
                "build may only be called once".to_string(),
            ));
        }
        if self.branching < 2 {
            return Err(IndexError::InvalidParameter(
                "branching factor must be at least 2".to_string(),
            ));
        }

        let n = self.dataset.rows();
        info!(
            "building k-means tree over {} points ({} dims, branching {})",
            n,
            self.dataset.cols(),
            self.branching
        );

        self.perm = (0..n as u32).collect();

        let seed = self.params.seed.unwrap_or_else(|| rand::rng().random());
        let mut builder = TreeBuilder {
            dataset: &self.dataset,
            metric: self.metric,
            branching: self.branching,
            max_iter: self.max_iter,
            centers_init: self.params.centers_init,
            rng: StdRng::seed_from_u64(seed),
            memory_counter: 0,
        };

        let (pivot, radius, variance) = builder.node_statistics(&self.perm);
        let mut perm = std::mem::take(&mut self.perm);
        let root = builder.build_node(&mut perm, 0, 0, pivot, radius, variance, 0.0);
        self.perm = perm;
        self.memory_counter += builder.memory_counter;
        self.root = Some(root);

        info!("k-means tree built, {} bytes of pivots", self.memory_counter);
        Ok(())
    }

    /// Number of indexed points.
    pub fn size(&self) -> usize {
        self.dataset.rows()
    }

    /// Dimensionality of the indexed points.
    pub fn veclen(&self) -> usize {
        self.dataset.cols()
    }

    /// Advisory count of bytes held in pivot vectors.
    pub fn used_memory(&self) -> usize {
        self.memory_counter
    }

    /// Whether `build` (or `load`) has produced a tree.
    pub fn is_built(&self) -> bool {
        self.root.is_some()
    }

    /// Construction parameters.
    pub fn params(&self) -> &KMeansTreeParams {
        &self.params
    }

    /// Distance metric the tree was built with.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Adjust the cluster-boundary weight used by best-bin-first search.
    pub fn set_cb_index(&mut self, cb_index: f32) {
        self.cb_index = cb_index;
    }

    pub(crate) fn built_root(&self) -> Result<&Node> {
        self.root.as_ref().ok_or_else(|| {
            IndexError::InvalidParameter("index has not been built".to_string())
        })
    }
}

/// Build-time state: borrowed dataset, working RNG and the pivot byte
/// counter. Kept apart from the index so the recursion can reorder the
/// permutation while nodes are being created.
struct TreeBuilder<'a> {
    dataset: &'a Dataset,
    metric: DistanceMetric,
    branching: usize,
    max_iter: usize,
    centers_init: CentersInit,
    rng: StdRng,
    memory_counter: usize,
}

impl TreeBuilder<'_> {
    /// Mean, bounding radius and variance for a point set.
    fn node_statistics(&mut self, ids: &[u32]) -> (Vec<f32>, f32, f32) {
        let dim = self.dataset.cols();
        let m = ids.len() as f64;

        let mut mean = vec![0.0_f64; dim];
        let mut variance = 0.0_f64;
        for &id in ids {
            let v = self.dataset.point(id as usize);
            for (j, &x) in v.iter().enumerate() {
                mean[j] += f64::from(x);
            }
            variance += f64::from(self.metric.zero_distance(v));
        }
        let pivot: Vec<f32> = mean.iter().map(|&s| (s / m) as f32).collect();
        let variance = variance / m - f64::from(self.metric.zero_distance(&pivot));
        self.memory_counter += dim * std::mem::size_of::<f32>();

        let mut radius = 0.0_f32;
        for &id in ids {
            let dist = self.metric.distance(&pivot, self.dataset.point(id as usize));
            if dist > radius {
                radius = dist;
            }
        }
        (pivot, radius, variance as f32)
    }

    /// Recursively cluster `slice` (a window of the permutation starting at
    /// absolute offset `offset`) into a node at `level`.
    fn build_node(
        &mut self,
        slice: &mut [u32],
        offset: usize,
        level: usize,
        pivot: Vec<f32>,
        radius: f32,
        variance: f32,
        mean_radius: f32,
    ) -> Node {
        let m = slice.len();
        let branching = self.branching;

        if m < branching {
            slice.sort_unstable();
            return Node {
                pivot,
                radius,
                mean_radius,
                variance,
                size: m,
                level,
                kind: NodeKind::Leaf { offset },
            };
        }

        let centers_idx =
            self.centers_init
                .choose(branching, slice, self.dataset, self.metric, &mut self.rng);
        if centers_idx.len() < branching {
            // Not enough distinct centers to split; keep the points here.
            slice.sort_unstable();
            return Node {
                pivot,
                radius,
                mean_radius,
                variance,
                size: m,
                level,
                kind: NodeKind::Leaf { offset },
            };
        }

        // Working centers in double precision for the Lloyd iterations.
        let mut dcenters: Vec<Vec<f64>> = centers_idx
            .iter()
            .map(|&c| {
                self.dataset
                    .point(c as usize)
                    .iter()
                    .map(|&x| f64::from(x))
                    .collect()
            })
            .collect();

        let mut radiuses = vec![0.0_f32; branching];
        let mut count = vec![0_usize; branching];
        let mut belongs_to = vec![0_usize; m];

        // Initial assignment; ties go to the lowest cluster index.
        for i in 0..m {
            let point = self.dataset.point(slice[i] as usize);
            let mut sq_dist = self.metric.distance_to_center(point, &dcenters[0]);
            belongs_to[i] = 0;
            for (j, center) in dcenters.iter().enumerate().skip(1) {
                let new_sq = self.metric.distance_to_center(point, center);
                if sq_dist > new_sq {
                    belongs_to[i] = j;
                    sq_dist = new_sq;
                }
            }
            let sq = sq_dist as f32;
            if sq > radiuses[belongs_to[i]] {
                radiuses[belongs_to[i]] = sq;
            }
            count[belongs_to[i]] += 1;
        }

        let mut converged = false;
        let mut iteration = 0_usize;
        while !converged && iteration < self.max_iter {
            converged = true;
            iteration += 1;

            // Recompute cluster centers; radiuses repopulate during the
            // reassignment pass below.
            for (center, r) in dcenters.iter_mut().zip(radiuses.iter_mut()) {
                center.iter_mut().for_each(|v| *v = 0.0);
                *r = 0.0;
            }
            for i in 0..m {
                let point = self.dataset.point(slice[i] as usize);
                let center = &mut dcenters[belongs_to[i]];
                for (k, &x) in point.iter().enumerate() {
                    center[k] += f64::from(x);
                }
            }
            for (center, &cnt) in dcenters.iter_mut().zip(count.iter()) {
                let cnt = cnt as f64;
                center.iter_mut().for_each(|v| *v /= cnt);
            }

            // Reassign points.
            for i in 0..m {
                let point = self.dataset.point(slice[i] as usize);
                let mut sq_dist = self.metric.distance_to_center(point, &dcenters[0]);
                let mut new_centroid = 0;
                for (j, center) in dcenters.iter().enumerate().skip(1) {
                    let new_sq = self.metric.distance_to_center(point, center);
                    if sq_dist > new_sq {
                        new_centroid = j;
                        sq_dist = new_sq;
                    }
                }
                let sq = sq_dist as f32;
                if sq > radiuses[new_centroid] {
                    radiuses[new_centroid] = sq;
                }
                if new_centroid != belongs_to[i] {
                    count[belongs_to[i]] -= 1;
                    count[new_centroid] += 1;
                    belongs_to[i] = new_centroid;
                    converged = false;
                }
            }

            // Empty-cluster repair: pull one point out of the next cluster
            // that can spare one.
            for i in 0..branching {
                if count[i] == 0 {
                    let mut j = (i + 1) % branching;
                    while count[j] <= 1 {
                        j = (j + 1) % branching;
                    }
                    for k in 0..m {
                        if belongs_to[k] == j {
                            belongs_to[k] = i;
                            count[j] -= 1;
                            count[i] += 1;
                            break;
                        }
                    }
                    converged = false;
                }
            }
        }

        let centers: Vec<Vec<f32>> = dcenters
            .iter()
            .map(|c| c.iter().map(|&x| x as f32).collect())
            .collect();
        self.memory_counter += branching * self.dataset.cols() * std::mem::size_of::<f32>();

        // Partition the slice so each cluster occupies a contiguous range,
        // accumulating per-child variance and mean radius along the walk.
        let mut children = Vec::with_capacity(branching);
        let mut start = 0_usize;
        let mut end = 0_usize;
        for (c, center) in centers.into_iter().enumerate() {
            let s = count[c] as f64;
            let mut child_variance = 0.0_f64;
            let mut child_mean_radius = 0.0_f64;
            for i in 0..m {
                if belongs_to[i] == c {
                    let dz =
                        f64::from(self.metric.zero_distance(self.dataset.point(slice[i] as usize)));
                    child_variance += dz;
                    child_mean_radius += dz.sqrt();
                    slice.swap(i, end);
                    belongs_to.swap(i, end);
                    end += 1;
                }
            }
            let child_variance =
                (child_variance / s - f64::from(self.metric.zero_distance(&center))) as f32;
            let child_mean_radius = (child_mean_radius / s) as f32;

            let child = self.build_node(
                &mut slice[start..end],
                offset + start,
                level + 1,
                center,
                radiuses[c],
                child_variance,
                child_mean_radius,
            );
            children.push(child);
            start = end;
        }

        Node {
            pivot,
            radius,
            mean_radius,
            variance,
            size: m,
            level,
            kind: NodeKind::Internal { children },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn grid_dataset(n: usize) -> Dataset {
        let rows: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32, (i * i) as f32]).collect();
        Dataset::from_rows(&rows).unwrap()
    }

    fn walk<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
        out.push(node);
        for child in node.children() {
            walk(child, out);
        }
    }

    #[test]
    fn build_rejects_branching_below_two() {
        let mut index = KMeansTreeIndex::new(
            grid_dataset(10),
            KMeansTreeParams {
                branching: 1,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            index.build(),
            Err(IndexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn build_twice_is_an_error() {
        let mut index =
            KMeansTreeIndex::new(grid_dataset(10), KMeansTreeParams::default().with_seed(1))
                .unwrap();
        index.build().unwrap();
        assert!(index.build().is_err());
    }

    #[test]
    fn small_dataset_becomes_sorted_root_leaf() {
        let mut index = KMeansTreeIndex::new(
            grid_dataset(5),
            KMeansTreeParams {
                branching: 8,
                ..KMeansTreeParams::default().with_seed(1)
            },
        )
        .unwrap();
        index.build().unwrap();
        let root = index.root.as_ref().unwrap();
        assert!(matches!(root.kind, NodeKind::Leaf { .. }));
        assert_eq!(root.size, 5);
        assert_eq!(index.perm, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn perm_stays_a_permutation() {
        let mut index = KMeansTreeIndex::new(
            grid_dataset(257),
            KMeansTreeParams {
                branching: 4,
                ..KMeansTreeParams::default().with_seed(42)
            },
        )
        .unwrap();
        index.build().unwrap();
        let mut perm = index.perm.clone();
        perm.sort_unstable();
        let expected: Vec<u32> = (0..257).collect();
        assert_eq!(perm, expected);
    }

    #[test]
    fn subtree_sizes_are_consistent() {
        let mut index = KMeansTreeIndex::new(
            grid_dataset(300),
            KMeansTreeParams {
                branching: 5,
                ..KMeansTreeParams::default().with_seed(9)
            },
        )
        .unwrap();
        index.build().unwrap();

        let mut nodes = Vec::new();
        walk(index.root.as_ref().unwrap(), &mut nodes);
        for node in nodes {
            match &node.kind {
                NodeKind::Internal { children } => {
                    assert_eq!(children.len(), 5);
                    let total: usize = children.iter().map(|c| c.size).sum();
                    assert_eq!(total, node.size);
                }
                NodeKind::Leaf { offset } => {
                    let slice = &index.perm[*offset..*offset + node.size];
                    assert!(slice.windows(2).all(|w| w[0] < w[1]), "leaf not sorted");
                }
            }
        }
    }

    #[test]
    fn leaf_members_lie_within_radius() {
        // Well-separated groups so Lloyd converges inside the iteration
        // cap at every node.
        let rows: Vec<Vec<f32>> = (0..200)
            .map(|i| {
                let group = (i / 50) as f32;
                vec![group * 100.0 + (i % 7) as f32, (i % 50) as f32]
            })
            .collect();
        let mut index = KMeansTreeIndex::new(
            Dataset::from_rows(&rows).unwrap(),
            KMeansTreeParams {
                branching: 4,
                ..KMeansTreeParams::default().with_seed(5)
            },
        )
        .unwrap();
        index.build().unwrap();

        let mut nodes = Vec::new();
        walk(index.root.as_ref().unwrap(), &mut nodes);
        for node in nodes {
            if let NodeKind::Leaf { offset } = &node.kind {
                for &id in &index.perm[*offset..*offset + node.size] {
                    let d = index
                        .metric
                        .distance(index.dataset.point(id as usize), &node.pivot);
                    assert!(
                        d <= node.radius * 1.001 + 1e-3,
                        "member {} at {} exceeds radius {}",
                        id,
                        d,
                        node.radius
                    );
                }
            }
        }
    }

    #[test]
    fn zero_iterations_still_partitions() {
        let mut index = KMeansTreeIndex::new(
            grid_dataset(100),
            KMeansTreeParams {
                branching: 4,
                iterations: 0,
                ..KMeansTreeParams::default().with_seed(17)
            },
        )
        .unwrap();
        index.build().unwrap();
        let mut perm = index.perm.clone();
        perm.sort_unstable();
        assert_eq!(perm, (0..100).collect::<Vec<u32>>());
        assert_eq!(index.root.as_ref().unwrap().size, 100);
    }

    #[test]
    fn params_serde_round_trip() {
        let params = KMeansTreeParams {
            branching: 16,
            iterations: 7,
            centers_init: CentersInit::KMeansPP,
            cb_index: 0.2,
            seed: Some(3),
        };
        let json = serde_json::to_string(&params).unwrap();
        let parsed: KMeansTreeParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, params);
    }
}
