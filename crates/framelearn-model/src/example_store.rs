//! Incremental labeled-example store.
//!
//! Accumulates (feature-vector, label) pairs into two growing tensors:
//! `features` of shape `[n, F]` and `labels` of shape `[n, num_classes]`,
//! one-hot encoded at insertion time. Rows are appended in insertion order
//! and never edited or deleted; `reset` is the only way to shrink the store.
//!
//! There is no capacity bound. The caller owns any eviction policy.

use candle_core::{DType, Device, Tensor};
use framelearn_core::{FramelearnError, Result};
use tracing::debug;

/// Append-only store of labeled feature vectors.
///
/// `features` and `labels` always hold the same number of rows. A label
/// outside `[0, num_classes)` or a feature vector whose element count does
/// not match `feature_dim` is rejected before either tensor is touched, so
/// a failed append never leaves a partial row behind.
pub struct ExampleStore {
    num_classes: usize,
    feature_dim: usize,
    device: Device,
    /// `[n, feature_dim]`, `None` while empty.
    features: Option<Tensor>,
    /// `[n, num_classes]` one-hot f32 rows, `None` while empty.
    labels: Option<Tensor>,
    /// Insertions per class, indexed by label.
    class_counts: Vec<usize>,
}

impl ExampleStore {
    /// Create an empty store for `num_classes` classes and feature vectors
    /// of `feature_dim` elements.
    #[must_use]
    pub fn new(num_classes: usize, feature_dim: usize, device: &Device) -> Self {
        Self {
            num_classes,
            feature_dim,
            device: device.clone(),
            features: None,
            labels: None,
            class_counts: vec![0; num_classes],
        }
    }

    /// Append one example.
    ///
    /// The feature tensor may arrive in the extractor's native shape (for
    /// example `[7, 7, 256]` or `[1, 7, 7, 256]`); it is flattened to one
    /// `[1, F]` row on insert. The label is one-hot encoded against
    /// `num_classes`.
    ///
    /// # Errors
    ///
    /// [`FramelearnError::InvalidLabel`] if `label >= num_classes`, and
    /// [`FramelearnError::InvalidExample`] if the flattened feature length
    /// differs from `feature_dim`. Neither mutates the store.
    pub fn add_example(&mut self, features: &Tensor, label: usize) -> Result<()> {
        if label >= self.num_classes {
            return Err(FramelearnError::InvalidLabel {
                label,
                num_classes: self.num_classes,
            });
        }

        let elems = features.elem_count();
        if elems != self.feature_dim {
            return Err(FramelearnError::InvalidExample(format!(
                "feature vector has {elems} elements, expected {}",
                self.feature_dim
            )));
        }

        let feature_row = features
            .flatten_all()
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_device(&self.device))
            .and_then(|t| t.reshape((1, self.feature_dim)))
            .map_err(|e| FramelearnError::InvalidExample(format!("feature row: {e}")))?;

        let mut one_hot = vec![0.0_f32; self.num_classes];
        one_hot[label] = 1.0;
        let label_row = Tensor::from_vec(one_hot, (1, self.num_classes), &self.device)
            .map_err(|e| FramelearnError::InvalidExample(format!("label row: {e}")))?;

        // Build both grown tensors before committing either, so a failed
        // concatenation leaves row counts untouched.
        let new_features = match &self.features {
            Some(existing) => Tensor::cat(&[existing, &feature_row], 0)
                .map_err(|e| FramelearnError::InvalidExample(format!("feature append: {e}")))?,
            None => feature_row,
        };
        let new_labels = match &self.labels {
            Some(existing) => Tensor::cat(&[existing, &label_row], 0)
                .map_err(|e| FramelearnError::InvalidExample(format!("label append: {e}")))?,
            None => label_row,
        };

        self.features = Some(new_features);
        self.labels = Some(new_labels);
        self.class_counts[label] += 1;

        debug!(label, total = self.len(), "example added");
        Ok(())
    }

    /// `true` until the first successful `add_example`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_none()
    }

    /// Number of accumulated examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features
            .as_ref()
            .and_then(|t| t.dim(0).ok())
            .unwrap_or(0)
    }

    /// Drop both tensors, returning the store to empty and releasing all
    /// owned storage.
    pub fn reset(&mut self) {
        self.features = None;
        self.labels = None;
        self.class_counts = vec![0; self.num_classes];
        debug!("example store reset");
    }

    /// Insertion counts per class, indexed by label.
    #[must_use]
    pub fn class_counts(&self) -> &[usize] {
        &self.class_counts
    }

    /// Number of examples recorded for `label`, or 0 for out-of-range labels.
    #[must_use]
    pub fn count_for(&self, label: usize) -> usize {
        self.class_counts.get(label).copied().unwrap_or(0)
    }

    /// Number of classes fixed at construction.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Flattened feature-vector length fixed at construction.
    #[must_use]
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Accumulated feature tensor `[n, F]`, `None` while empty.
    #[must_use]
    pub fn features(&self) -> Option<&Tensor> {
        self.features.as_ref()
    }

    /// Accumulated one-hot label tensor `[n, num_classes]`, `None` while
    /// empty.
    #[must_use]
    pub fn labels(&self) -> Option<&Tensor> {
        self.labels.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
