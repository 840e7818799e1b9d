//! Tree traversal: exact search and best-bin-first search.
//!
//! Both traversals share a cluster pruning test. For a node with pivot
//! distance `b`, radius `r` and current worst result distance `w` (all in
//! squared-metric units), the node cannot improve the result set when
//! `b - r - w > 0` and `(b - r - w)^2 > 4 r w`; together these are
//! equivalent to `sqrt(b) > sqrt(r) + sqrt(w)`, i.e. the query ball and
//! the cluster ball are disjoint. Ties keep exploring.

use std::collections::BinaryHeap;

use smallvec::SmallVec;

use crate::error::{IndexError, Result};
use crate::result::ResultSet;

use super::node::{Node, NodeKind};
use super::{Checks, KMeansTreeIndex};

/// Scratch sized for typical branching factors; spills for larger ones.
type BranchScratch<T> = SmallVec<[T; 32]>;

/// An unexplored branch, prioritized by ascending key.
struct Branch<'a> {
    node: &'a Node,
    key: f32,
}

impl PartialEq for Branch<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Branch<'_> {}

impl Ord for Branch<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap: smaller key = higher priority
        other.key.total_cmp(&self.key)
    }
}

impl PartialOrd for Branch<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl KMeansTreeIndex {
    /// Find nearest neighbors of `vec`, filling `result`.
    ///
    /// `Checks::Unlimited` traverses the whole tree exactly. A budget runs
    /// best-bin-first: one greedy descent, then repeated descents into the
    /// most promising queued branch until the budget is spent and the
    /// result set is full.
    pub fn find_neighbors<R: ResultSet>(
        &self,
        result: &mut R,
        vec: &[f32],
        checks: Checks,
    ) -> Result<()> {
        let root = self.built_root()?;
        if vec.len() != self.dataset.cols() {
            return Err(IndexError::InvalidParameter(format!(
                "query has {} dimensions, index has {}",
                vec.len(),
                self.dataset.cols()
            )));
        }

        match checks {
            Checks::Unlimited => {
                self.find_exact(root, result, vec);
                Ok(())
            }
            Checks::Budget(budget) => {
                let mut heap = BinaryHeap::with_capacity(self.size());
                let mut checked = 0_usize;

                self.find_nn(root, result, vec, &mut checked, budget, &mut heap);
                while let Some(branch) = heap.pop() {
                    if checked >= budget && result.full() {
                        break;
                    }
                    self.find_nn(branch.node, result, vec, &mut checked, budget, &mut heap);
                }

                if !result.full() {
                    return Err(IndexError::InvariantViolation(
                        "best-bin-first search exhausted the tree without filling the result set"
                            .to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Convenience wrapper: top-`k` ids and distances, closest first.
    pub fn search(&self, vec: &[f32], k: usize, checks: Checks) -> Result<Vec<(u32, f32)>> {
        let mut result = crate::result::KnnResultSet::new(k);
        self.find_neighbors(&mut result, vec, checks)?;
        Ok(result.into_sorted_vec())
    }

    fn prune(&self, node: &Node, vec: &[f32], worst: f32) -> bool {
        let bsq = self.metric.distance(vec, &node.pivot);
        let rsq = node.radius;
        let val = bsq - rsq - worst;
        val > 0.0 && val * val - 4.0 * rsq * worst > 0.0
    }

    /// One best-bin-first descent. Branches not taken are queued on the
    /// heap with their boundary-adjusted distances.
    fn find_nn<'a, R: ResultSet>(
        &'a self,
        node: &'a Node,
        result: &mut R,
        vec: &[f32],
        checked: &mut usize,
        budget: usize,
        heap: &mut BinaryHeap<Branch<'a>>,
    ) {
        if self.prune(node, vec, result.worst_dist()) {
            return;
        }

        match &node.kind {
            NodeKind::Leaf { offset } => {
                if *checked >= budget && result.full() {
                    return;
                }
                *checked += node.size;

                let worst = result.worst_dist();
                for &id in &self.perm[*offset..*offset + node.size] {
                    let dist = self.metric.distance(self.dataset.point(id as usize), vec);
                    if dist < worst {
                        result.add_point(dist, id);
                    }
                }
            }
            NodeKind::Internal { children } => {
                let best = self.explore_node_branches(children, vec, heap);
                self.find_nn(&children[best], result, vec, checked, budget, heap);
            }
        }
    }

    /// Queue all children but the closest one; return the closest child's
    /// index. Queued priorities are discounted by `cb_index` times the
    /// child's variance, so wider clusters get revisited sooner.
    fn explore_node_branches<'a>(
        &self,
        children: &'a [Node],
        vec: &[f32],
        heap: &mut BinaryHeap<Branch<'a>>,
    ) -> usize {
        let dists: BranchScratch<f32> = children
            .iter()
            .map(|child| self.metric.distance(vec, &child.pivot))
            .collect();
        let mut best = 0;
        for (i, &d) in dists.iter().enumerate().skip(1) {
            if d < dists[best] {
                best = i;
            }
        }
        for (i, child) in children.iter().enumerate() {
            if i != best {
                heap.push(Branch {
                    node: child,
                    key: dists[i] - self.cb_index * child.variance,
                });
            }
        }
        best
    }

    /// Exhaustive traversal, visiting children closest-pivot first.
    fn find_exact<R: ResultSet>(&self, node: &Node, result: &mut R, vec: &[f32]) {
        if self.prune(node, vec, result.worst_dist()) {
            return;
        }

        match &node.kind {
            NodeKind::Leaf { offset } => {
                let worst = result.worst_dist();
                for &id in &self.perm[*offset..*offset + node.size] {
                    let dist = self.metric.distance(self.dataset.point(id as usize), vec);
                    if dist < worst {
                        result.add_point(dist, id);
                    }
                }
            }
            NodeKind::Internal { children } => {
                for &c in &self.center_ordering(children, vec) {
                    self.find_exact(&children[c], result, vec);
                }
            }
        }
    }

    /// Child indices ordered by ascending pivot distance (insertion sort;
    /// branching factors are small).
    fn center_ordering(&self, children: &[Node], vec: &[f32]) -> BranchScratch<usize> {
        let mut dists: BranchScratch<f32> = SmallVec::new();
        let mut order: BranchScratch<usize> = SmallVec::new();
        for (i, child) in children.iter().enumerate() {
            let dist = self.metric.distance(vec, &child.pivot);
            let mut j = 0;
            while j < i && dists[j] < dist {
                j += 1;
            }
            dists.insert(j, dist);
            order.insert(j, i);
        }
        order
    }
}
