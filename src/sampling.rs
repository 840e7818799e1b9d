//! Sampling without replacement.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Draws distinct indices in `[0, n)` in uniformly random order.
///
/// Backed by a shuffled identity permutation; `next` hands out one index
/// per call and returns `None` once all `n` have been drawn.
#[derive(Debug)]
pub struct UniqueRandom {
    order: Vec<usize>,
    cursor: usize,
}

impl UniqueRandom {
    /// Create a sampler over `[0, n)`.
    pub fn new(n: usize, rng: &mut StdRng) -> Self {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        Self { order, cursor: 0 }
    }

    /// Draw the next distinct index, or `None` when exhausted.
    pub fn next(&mut self) -> Option<usize> {
        let idx = self.order.get(self.cursor).copied();
        if idx.is_some() {
            self.cursor += 1;
        }
        idx
    }
}
