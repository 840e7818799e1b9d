//! Auxiliary cluster queries over a built tree.
//!
//! The variance-minimizing cut walks down from the root, always splitting
//! the cluster whose replacement by its children most reduces the weighted
//! variance sum. Level-L labeling assigns every indexed point the id of
//! its ancestor on a fixed tree level, using breadth-first ids of a
//! hypothetical complete tree so no parent pointers are needed.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{IndexError, Result};

use super::node::{Node, NodeKind};
use super::KMeansTreeIndex;

impl KMeansTreeIndex {
    /// Take a cut through the tree with up to `num_clusters` clusters,
    /// minimizing the weighted variance sum, and return the cluster
    /// centers.
    ///
    /// Fewer than `num_clusters` centers come back when the tree cannot
    /// support the requested count (all cut members are leaves, or one
    /// more split would overshoot).
    pub fn cluster_centers(&self, num_clusters: usize) -> Result<Vec<Vec<f32>>> {
        if num_clusters < 1 {
            return Err(IndexError::InvalidParameter(
                "number of clusters must be at least 1".to_string(),
            ));
        }
        let root = self.built_root()?;
        let (clusters, variance) = self.min_variance_clusters(root, num_clusters);
        debug!(
            "cluster cut: requested {}, returning {} (variance {})",
            num_clusters,
            clusters.len(),
            variance
        );
        Ok(clusters.iter().map(|node| node.pivot.clone()).collect())
    }

    /// Greedy cut: repeatedly replace the cluster whose split yields the
    /// smallest weighted variance sum. Returns the cut and the final mean
    /// variance.
    fn min_variance_clusters<'a>(
        &self,
        root: &'a Node,
        max_clusters: usize,
    ) -> (Vec<&'a Node>, f32) {
        let mut clusters: Vec<&Node> = vec![root];
        let mut mean_variance = root.variance * root.size as f32;

        while clusters.len() < max_clusters {
            let mut min_variance = f32::MAX;
            let mut split_index = None;

            for (i, cluster) in clusters.iter().enumerate() {
                if let NodeKind::Internal { children } = &cluster.kind {
                    let mut variance = mean_variance - cluster.variance * cluster.size as f32;
                    for child in children {
                        variance += child.variance * child.size as f32;
                    }
                    if variance < min_variance {
                        min_variance = variance;
                        split_index = Some(i);
                    }
                }
            }

            let Some(split) = split_index else { break };
            if self.branching + clusters.len() - 1 > max_clusters {
                break;
            }

            mean_variance = min_variance;
            let to_split: &'a Node = clusters[split];
            let NodeKind::Internal { children } = &to_split.kind else {
                unreachable!("split candidate is internal");
            };
            clusters[split] = &children[0];
            clusters.extend(children[1..].iter());
        }

        (clusters, mean_variance / root.size as f32)
    }

    /// Label every indexed point with the id of its ancestor cluster on
    /// tree level `level` (0 is the root). Labels are dense ids among the
    /// `branching^level` nominal slots of that level.
    ///
    /// Returns the maximum level of the tree, or `-2` if the index has not
    /// been built.
    ///
    /// # Panics
    ///
    /// Panics if `cluster_ids.len()` differs from [`size`](Self::size).
    pub fn cluster_centers_on_level(&self, level: usize, cluster_ids: &mut [i32]) -> i32 {
        let Some(root) = self.root.as_ref() else {
            return -2;
        };
        assert_eq!(
            cluster_ids.len(),
            self.size(),
            "label buffer must hold one slot per indexed point"
        );

        let mut max_level = 0_usize;
        let mut fifo: VecDeque<&Node> = VecDeque::new();
        fifo.push_back(root);
        while let Some(node) = fifo.pop_front() {
            max_level = max_level.max(node.level);
            for child in node.children() {
                fifo.push_back(child);
            }
        }

        let branching = self.branching as i64;
        // Nodes of a complete tree on levels strictly above `level`.
        let mut nodes_before = 0_i64;
        let mut mult = 1_i64;
        for _ in 0..level {
            nodes_before += mult;
            mult *= branching;
        }
        debug!(
            "labeling on level {}: {} complete-tree nodes above, max level {}",
            level, nodes_before, max_level
        );

        // Second pass: breadth-first with implicit complete-tree ids. The
        // i-th child of id p sits at p * branching + i + 1.
        let mut fifo: VecDeque<(&Node, i64)> = VecDeque::new();
        fifo.push_back((root, 0));
        while let Some((node, bid)) = fifo.pop_front() {
            match &node.kind {
                NodeKind::Internal { children } => {
                    for (i, child) in children.iter().enumerate() {
                        fifo.push_back((child, bid * branching + i as i64 + 1));
                    }
                }
                NodeKind::Leaf { offset } => {
                    let target = level as i64;
                    let mut id = bid;
                    let mut current = node.level as i64;
                    while current < target {
                        id = id * branching + 1;
                        current += 1;
                    }
                    while current > target {
                        id = (id - 1) / branching;
                        current -= 1;
                    }
                    // Unbalanced subtree that never reached the target
                    // level: take the first slot of its level-L subtree.
                    if current < target {
                        id = id * branching + 1;
                    }

                    let label = (id - nodes_before) as i32;
                    for &p in &self.perm[*offset..*offset + node.size] {
                        cluster_ids[p as usize] = label;
                    }
                }
            }
        }

        max_level as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::kmeans_tree::{KMeansTreeParams, KMeansTreeIndex};

    fn clustered_index(n: usize, branching: usize, seed: u64) -> KMeansTreeIndex {
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                let group = (i / 25) as f32;
                vec![group * 50.0 + (i % 5) as f32, (i % 25) as f32]
            })
            .collect();
        let mut index = KMeansTreeIndex::new(
            Dataset::from_rows(&rows).unwrap(),
            KMeansTreeParams {
                branching,
                ..KMeansTreeParams::default().with_seed(seed)
            },
        )
        .unwrap();
        index.build().unwrap();
        index
    }

    fn collect_members(index: &KMeansTreeIndex, node: &Node, out: &mut Vec<u32>) {
        match &node.kind {
            NodeKind::Internal { children } => {
                for child in children {
                    collect_members(index, child, out);
                }
            }
            NodeKind::Leaf { offset } => {
                out.extend_from_slice(&index.perm[*offset..*offset + node.size]);
            }
        }
    }

    #[test]
    fn cut_partitions_the_dataset() {
        let index = clustered_index(200, 4, 3);
        let root = index.root.as_ref().unwrap();
        let (clusters, _) = index.min_variance_clusters(root, 10);
        assert!(!clusters.is_empty() && clusters.len() <= 10);

        let mut all: Vec<u32> = Vec::new();
        let mut total = 0_usize;
        for cluster in &clusters {
            total += cluster.size;
            collect_members(&index, cluster, &mut all);
        }
        assert_eq!(total, 200);
        all.sort_unstable();
        assert_eq!(all, (0..200).collect::<Vec<u32>>());
    }

    #[test]
    fn weighted_variance_never_increases_with_deeper_cuts() {
        let index = clustered_index(200, 4, 7);
        let root = index.root.as_ref().unwrap();
        let mut last = f32::INFINITY;
        for k in [1, 4, 7, 10, 16, 25] {
            let (_, variance) = index.min_variance_clusters(root, k);
            assert!(
                variance <= last * 1.0001 + 1e-3,
                "variance rose from {} to {} at k={}",
                last,
                variance,
                k
            );
            last = variance;
        }
    }

    #[test]
    fn cluster_centers_respects_bounds() {
        let index = clustered_index(200, 4, 11);
        assert!(index.cluster_centers(0).is_err());
        let centers = index.cluster_centers(7).unwrap();
        assert!(!centers.is_empty() && centers.len() <= 7);
        for center in &centers {
            assert_eq!(center.len(), index.veclen());
        }
    }

    #[test]
    fn unbuilt_index_reports_minus_two() {
        let index = KMeansTreeIndex::new(
            Dataset::from_rows(&[vec![0.0_f32, 1.0]]).unwrap(),
            KMeansTreeParams::default(),
        )
        .unwrap();
        let mut labels = vec![0_i32; 1];
        assert_eq!(index.cluster_centers_on_level(1, &mut labels), -2);
    }

    #[test]
    fn labels_agree_with_level_ancestors() {
        let index = clustered_index(200, 4, 13);
        let mut labels = vec![-1_i32; 200];
        let max_level = index.cluster_centers_on_level(1, &mut labels);
        assert!(max_level >= 1);

        // Points under the same level-1 child share a label; labels of
        // distinct children differ and stay inside [0, branching).
        let root = index.root.as_ref().unwrap();
        let mut seen = Vec::new();
        for child in root.children() {
            let mut members = Vec::new();
            collect_members(&index, child, &mut members);
            let label = labels[members[0] as usize];
            assert!((0..4).contains(&label), "label {} out of range", label);
            for &m in &members {
                assert_eq!(labels[m as usize], label);
            }
            seen.push(label);
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), root.children().len());
    }

    #[test]
    fn level_zero_labels_everything_zero() {
        let index = clustered_index(120, 4, 19);
        let mut labels = vec![-1_i32; 120];
        index.cluster_centers_on_level(0, &mut labels);
        assert!(labels.iter().all(|&l| l == 0));
    }
}
