//! Row-major dataset storage.
//!
//! Points are stored in a single flat buffer (`rows * cols` values), the
//! same layout the index was trained on. The dataset is read-only once
//! handed to an index; build and query only ever borrow rows out of it.

use crate::error::{IndexError, Result};

/// A row-major matrix of `rows x cols` f32 point vectors.
#[derive(Debug, Clone)]
pub struct Dataset {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Dataset {
    /// Create a dataset from a flat row-major buffer.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(IndexError::InvalidParameter(format!(
                "dataset buffer holds {} values, expected {} ({} x {})",
                data.len(),
                rows * cols,
                rows,
                cols
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Create a dataset by copying a slice of equally-sized row vectors.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(IndexError::InvalidParameter(format!(
                    "row has {} columns, expected {}",
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// Number of points.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Dimensionality of each point.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the dataset holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow the `idx`-th point.
    #[inline]
    pub fn point(&self, idx: usize) -> &[f32] {
        let start = idx * self.cols;
        &self.data[start..start + self.cols]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_round_trips() {
        let ds = Dataset::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.cols(), 2);
        assert_eq!(ds.point(1), &[3.0, 4.0]);
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Dataset::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(err.is_err());
    }

    #[test]
    fn flat_buffer_length_checked() {
        assert!(Dataset::new(2, 3, vec![0.0; 5]).is_err());
        assert!(Dataset::new(2, 3, vec![0.0; 6]).is_ok());
    }
}
