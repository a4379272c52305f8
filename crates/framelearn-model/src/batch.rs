//! Mini-batch iteration over the accumulated example tensors.

use candle_core::Tensor;
use framelearn_core::{FramelearnError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Mini-batch iterator over feature and one-hot label tensors.
///
/// Holds an index permutation over the `n` rows and yields
/// `([b, F], [b, num_classes])` slices of up to `batch_size` rows. The
/// store presents rows in insertion order; shuffling happens here, once per
/// epoch, with a seeded RNG so runs are reproducible.
pub struct BatchIterator {
    features: Tensor,
    labels: Tensor,
    indices: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl BatchIterator {
    /// Create an iterator over `features` `[n, F]` and `labels`
    /// `[n, num_classes]`. `batch_size` must be at least 1.
    pub fn new(features: Tensor, labels: Tensor, batch_size: usize) -> Result<Self> {
        let n = features
            .dim(0)
            .map_err(|e| FramelearnError::TrainingStep(format!("feature rows: {e}")))?;
        Ok(Self {
            features,
            labels,
            indices: (0..n).collect(),
            batch_size: batch_size.max(1),
            pos: 0,
        })
    }

    /// Reshuffle for a new epoch using a seeded RNG derived from the base
    /// seed plus the epoch number.
    pub fn reshuffle(&mut self, seed: u64, epoch: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
        self.indices.shuffle(&mut rng);
        self.pos = 0;
    }

    /// Batches per epoch: `ceil(n / batch_size)`.
    #[must_use]
    pub fn batches_per_epoch(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Returns the next mini-batch, or `None` when the epoch is exhausted.
    pub fn next_batch(&mut self) -> Result<Option<(Tensor, Tensor)>> {
        let n = self.indices.len();
        if self.pos >= n {
            return Ok(None);
        }

        let end = (self.pos + self.batch_size).min(n);
        let batch_idx: Vec<u32> = self.indices[self.pos..end]
            .iter()
            .map(|&i| i as u32)
            .collect();
        self.pos = end;

        let device = self.features.device().clone();
        let idx = Tensor::new(batch_idx.as_slice(), &device)
            .map_err(|e| FramelearnError::TrainingStep(format!("batch index tensor: {e}")))?;
        let batch_features = self
            .features
            .index_select(&idx, 0)
            .map_err(|e| FramelearnError::TrainingStep(format!("feature batch select: {e}")))?;
        let batch_labels = self
            .labels
            .index_select(&idx, 0)
            .map_err(|e| FramelearnError::TrainingStep(format!("label batch select: {e}")))?;

        Ok(Some((batch_features, batch_labels)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn tensors(n: usize) -> (Tensor, Tensor) {
        let features = Tensor::zeros((n, 4), DType::F32, &Device::Cpu).unwrap();
        let labels = Tensor::zeros((n, 3), DType::F32, &Device::Cpu).unwrap();
        (features, labels)
    }

    #[test]
    fn test_iterator_yields_ceil_batches() {
        let (features, labels) = tensors(10);
        let mut iter = BatchIterator::new(features, labels, 3).unwrap();
        iter.reshuffle(42, 0);

        let mut count = 0;
        while iter.next_batch().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 4); // ceil(10/3)
        assert_eq!(iter.batches_per_epoch(), 4);
    }

    #[test]
    fn test_final_batch_is_remainder_sized() {
        let (features, labels) = tensors(10);
        let mut iter = BatchIterator::new(features, labels, 4).unwrap();
        iter.reshuffle(42, 0);

        let mut sizes = Vec::new();
        while let Some((bx, by)) = iter.next_batch().unwrap() {
            assert_eq!(bx.dim(0).unwrap(), by.dim(0).unwrap());
            sizes.push(bx.dim(0).unwrap());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_reshuffle_restarts_epoch() {
        let (features, labels) = tensors(5);
        let mut iter = BatchIterator::new(features, labels, 5).unwrap();
        iter.reshuffle(42, 0);
        assert!(iter.next_batch().unwrap().is_some());
        assert!(iter.next_batch().unwrap().is_none());

        iter.reshuffle(42, 1);
        assert!(iter.next_batch().unwrap().is_some());
    }

    #[test]
    fn test_zero_batch_size_clamps_to_one() {
        let (features, labels) = tensors(2);
        let mut iter = BatchIterator::new(features, labels, 0).unwrap();
        iter.reshuffle(7, 0);
        assert_eq!(iter.batches_per_epoch(), 2);
        let (bx, _) = iter.next_batch().unwrap().unwrap();
        assert_eq!(bx.dim(0).unwrap(), 1);
    }
}
