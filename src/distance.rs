//! Distance metrics for dense vectors.
//!
//! The tree stores per-node statistics (radius, variance) in terms of
//! whatever the configured metric returns, so the same metric must be used
//! for build and query. Squared Euclidean is the default and the one the
//! cluster-boundary pruning bound is designed for.
//!
//! Besides the pairwise distance, the clustering statistics need the
//! distance of a vector to the origin ([`DistanceMetric::zero_distance`]),
//! used as a norm proxy when composing variances.

use serde::{Deserialize, Serialize};

/// Distance metric for dense vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean (L2) distance. No square root is taken.
    #[default]
    SquaredL2,
    /// Manhattan (L1) distance.
    Manhattan,
}

impl DistanceMetric {
    /// Compute the distance between two vectors.
    ///
    /// If dimensions mismatch, this returns `f32::INFINITY` (so it is never
    /// selected as a nearest neighbor).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }
        match self {
            DistanceMetric::SquaredL2 => squared_l2(a, b),
            DistanceMetric::Manhattan => manhattan(a, b),
        }
    }

    /// Distance of a vector to the zero vector of the same length.
    #[inline]
    #[must_use]
    pub fn zero_distance(self, a: &[f32]) -> f32 {
        match self {
            DistanceMetric::SquaredL2 => a.iter().map(|x| x * x).sum(),
            DistanceMetric::Manhattan => a.iter().map(|x| x.abs()).sum(),
        }
    }

    /// Distance between an `f32` point and an `f64` working center.
    ///
    /// Lloyd iterations keep centers in double precision; distances against
    /// them are accumulated in double precision as well.
    #[inline]
    pub(crate) fn distance_to_center(self, a: &[f32], center: &[f64]) -> f64 {
        match self {
            DistanceMetric::SquaredL2 => a
                .iter()
                .zip(center.iter())
                .map(|(&x, &c)| {
                    let d = f64::from(x) - c;
                    d * d
                })
                .sum(),
            DistanceMetric::Manhattan => a
                .iter()
                .zip(center.iter())
                .map(|(&x, &c)| (f64::from(x) - c).abs())
                .sum(),
        }
    }
}

/// Squared L2 (Euclidean) distance.
#[inline]
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Manhattan (L1) distance.
#[inline]
#[must_use]
pub fn manhattan(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_l2_basic() {
        let a = [0.0_f32, 0.0];
        let b = [3.0_f32, 4.0];
        assert_eq!(squared_l2(&a, &b), 25.0);
    }

    #[test]
    fn zero_distance_is_squared_norm() {
        let a = [3.0_f32, 4.0];
        assert_eq!(DistanceMetric::SquaredL2.zero_distance(&a), 25.0);
        assert_eq!(DistanceMetric::Manhattan.zero_distance(&a), 7.0);
    }

    #[test]
    fn mismatched_lengths_are_infinite() {
        let a = [1.0_f32, 2.0];
        let b = [1.0_f32];
        assert_eq!(DistanceMetric::SquaredL2.distance(&a, &b), f32::INFINITY);
    }

    #[test]
    fn center_distance_matches_f32_path() {
        let a = [1.0_f32, 2.0, 3.0];
        let c = [0.5_f64, 1.5, 2.5];
        let c32: Vec<f32> = c.iter().map(|&x| x as f32).collect();
        let d64 = DistanceMetric::SquaredL2.distance_to_center(&a, &c);
        let d32 = DistanceMetric::SquaredL2.distance(&a, &c32);
        assert!((d64 as f32 - d32).abs() < 1e-6);
    }
}
