//! Initial cluster center selection.
//!
//! Three strategies, selectable per index. Each receives the candidate id
//! list and returns the chosen center ids; fewer than `k` may come back
//! when the candidates cannot support `k` distinct centers, in which case
//! the caller degrades the node to a leaf.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::distance::DistanceMetric;
use crate::sampling::UniqueRandom;

/// Two candidate points closer than this are considered duplicates.
const DUPLICATE_EPS: f32 = 1e-16;

/// Strategy for picking the initial cluster centers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentersInit {
    /// Distinct centers drawn uniformly at random.
    #[default]
    Random,
    /// Gonzales' farthest-first traversal.
    Gonzales,
    /// k-means++ weighted sampling (Arthur & Vassilvitskii).
    KMeansPP,
}

impl CentersInit {
    pub(crate) fn choose(
        self,
        k: usize,
        ids: &[u32],
        dataset: &Dataset,
        metric: DistanceMetric,
        rng: &mut StdRng,
    ) -> Vec<u32> {
        match self {
            CentersInit::Random => choose_random(k, ids, dataset, metric, rng),
            CentersInit::Gonzales => choose_gonzales(k, ids, dataset, metric, rng),
            CentersInit::KMeansPP => choose_kmeanspp(k, ids, dataset, metric, rng),
        }
    }
}

/// Uniform sampling without replacement, rejecting duplicate points.
///
/// Stops early when the candidate pool is exhausted before `k` distinct
/// centers are found.
fn choose_random(
    k: usize,
    ids: &[u32],
    dataset: &Dataset,
    metric: DistanceMetric,
    rng: &mut StdRng,
) -> Vec<u32> {
    let mut sampler = UniqueRandom::new(ids.len(), rng);
    let mut centers: Vec<u32> = Vec::with_capacity(k);

    'slots: while centers.len() < k {
        loop {
            let Some(rnd) = sampler.next() else {
                break 'slots;
            };
            let candidate = ids[rnd];
            let duplicate = centers.iter().any(|&c| {
                metric.distance(dataset.point(candidate as usize), dataset.point(c as usize))
                    < DUPLICATE_EPS
            });
            if !duplicate {
                centers.push(candidate);
                break;
            }
        }
    }
    centers
}

/// Gonzales' algorithm: each new center maximizes the minimum distance to
/// the centers already chosen. Stops when no candidate is strictly apart
/// from the chosen set.
fn choose_gonzales(
    k: usize,
    ids: &[u32],
    dataset: &Dataset,
    metric: DistanceMetric,
    rng: &mut StdRng,
) -> Vec<u32> {
    let n = ids.len();
    let mut centers = Vec::with_capacity(k);
    centers.push(ids[rng.random_range(0..n)]);

    while centers.len() < k {
        let mut best_index = None;
        let mut best_val = 0.0_f32;
        for (j, &candidate) in ids.iter().enumerate() {
            let point = dataset.point(candidate as usize);
            let min_dist = centers
                .iter()
                .map(|&c| metric.distance(dataset.point(c as usize), point))
                .fold(f32::INFINITY, f32::min);
            if min_dist > best_val {
                best_val = min_dist;
                best_index = Some(j);
            }
        }
        match best_index {
            Some(j) => centers.push(ids[j]),
            None => break,
        }
    }
    centers
}

/// k-means++ seeding: each new center is drawn with probability
/// proportional to its distance to the nearest chosen center. One trial
/// per step.
fn choose_kmeanspp(
    k: usize,
    ids: &[u32],
    dataset: &Dataset,
    metric: DistanceMetric,
    rng: &mut StdRng,
) -> Vec<u32> {
    let n = ids.len();
    let mut centers = Vec::with_capacity(k);

    let first = rng.random_range(0..n);
    centers.push(ids[first]);

    let mut closest: Vec<f64> = ids
        .iter()
        .map(|&i| {
            f64::from(metric.distance(
                dataset.point(i as usize),
                dataset.point(ids[first] as usize),
            ))
        })
        .collect();
    let mut current_pot: f64 = closest.iter().sum();

    while centers.len() < k {
        // All remaining candidates coincide with a chosen center; the
        // interval [0, potential) is empty and no further draw is possible.
        if current_pot <= 0.0 {
            break;
        }

        // Walk the prefix sums, guarding against rounding by falling back
        // to the last candidate.
        let mut rand_val = rng.random::<f64>() * current_pot;
        let mut picked = n - 1;
        for (i, &w) in closest.iter().enumerate().take(n - 1) {
            if rand_val <= w {
                picked = i;
                break;
            }
            rand_val -= w;
        }

        let picked_point = dataset.point(ids[picked] as usize);
        let mut new_pot = 0.0_f64;
        for (i, &id) in ids.iter().enumerate() {
            let d = f64::from(metric.distance(dataset.point(id as usize), picked_point));
            new_pot += d.min(closest[i]);
        }

        centers.push(ids[picked]);
        current_pot = new_pot;
        for (i, &id) in ids.iter().enumerate() {
            let d = f64::from(metric.distance(dataset.point(id as usize), picked_point));
            closest[i] = closest[i].min(d);
        }
    }
    centers
}
