//! pivotree: hierarchical k-means tree for approximate nearest neighbor
//! search.
//!
//! A dataset of high-dimensional points is recursively clustered into a
//! `branching`-ary tree of k-means partitions. Queries descend the tree
//! best-bin-first under a checks budget, or traverse it exactly when no
//! budget is set. Two auxiliary queries read the tree back out: a
//! variance-minimizing cut of cluster centers, and per-point ancestor
//! labels on a fixed tree level.
//!
//! Modules:
//! - `dataset`: row-major point storage.
//! - `distance`: distance metrics and the zero-vector norm proxy.
//! - `result`: the result-sink trait and top-k accumulator.
//! - `sampling`: sampling without replacement (center seeding).
//! - `kmeans_tree`: the index itself — build, search, cluster queries,
//!   persistence.
//!
//! # Example
//!
//! ```
//! use pivotree::{Checks, Dataset, KMeansTreeIndex, KMeansTreeParams};
//!
//! let rows: Vec<Vec<f32>> = (0..64).map(|i| vec![i as f32, 0.0]).collect();
//! let dataset = Dataset::from_rows(&rows).unwrap();
//! let mut index = KMeansTreeIndex::new(
//!     dataset,
//!     KMeansTreeParams { branching: 4, ..KMeansTreeParams::default().with_seed(1) },
//! )
//! .unwrap();
//! index.build().unwrap();
//!
//! let neighbors = index.search(&[10.2, 0.0], 3, Checks::Unlimited).unwrap();
//! assert_eq!(neighbors[0].0, 10);
//! ```

pub mod dataset;
pub mod distance;
pub mod error;
pub mod kmeans_tree;
pub mod result;
pub mod sampling;

pub use dataset::Dataset;
pub use distance::DistanceMetric;
pub use error::{IndexError, Result};
pub use kmeans_tree::{CentersInit, Checks, KMeansTreeIndex, KMeansTreeParams};
pub use result::{KnnResultSet, ResultSet};
