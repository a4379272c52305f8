//! Trainable classifier head over frozen feature-extractor activations.
//!
//! A two-layer fully-connected network:
//!
//! ```text
//! Input (F) → Linear(hidden_units) → ReLU → Linear(num_classes) → Softmax
//! ```
//!
//! The flatten step happens on the way in: activations arrive in the
//! extractor's native shape and are reshaped to `[1, F]` before the first
//! dense layer. The hidden layer carries a bias, the output layer does not.
//!
//! Weights live in the caller-owned [`VarMap`], so the same variables can be
//! handed to an optimizer. The head itself is read-only; only a trainer
//! mutates the weights.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Module, VarBuilder, VarMap};
use framelearn_core::{FramelearnError, Result};

/// Topology of the classifier head.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Flattened activation length (input width).
    pub feature_dim: usize,
    /// Hidden dense-layer width.
    pub hidden_units: usize,
    /// Output width, one unit per class.
    pub num_classes: usize,
}

/// Two-layer softmax classifier head.
pub struct ClassifierHead {
    fc1: candle_nn::Linear,
    fc2: candle_nn::Linear,
    feature_dim: usize,
    num_classes: usize,
    device: Device,
}

impl ClassifierHead {
    /// Create a head with fresh weights registered in `varmap`.
    ///
    /// The varmap's variables are what an optimizer must step to train this
    /// head; construct head and optimizer from the same map.
    pub fn new_trainable(varmap: &VarMap, device: &Device, config: &ClassifierConfig) -> Result<Self> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);

        let fc1 = candle_nn::linear(config.feature_dim, config.hidden_units, vb.pp("fc1"))
            .map_err(|e| FramelearnError::Model(format!("Failed to create fc1: {e}")))?;
        let fc2 = candle_nn::linear_no_bias(config.hidden_units, config.num_classes, vb.pp("fc2"))
            .map_err(|e| FramelearnError::Model(format!("Failed to create fc2: {e}")))?;

        Ok(Self {
            fc1,
            fc2,
            feature_dim: config.feature_dim,
            num_classes: config.num_classes,
            device: device.clone(),
        })
    }

    /// Run a forward pass over a batch of flattened activations.
    ///
    /// `input` has shape `[batch, feature_dim]`; the returned logits have
    /// shape `[batch, num_classes]`. No softmax is applied here: training
    /// pairs the logits with a log-softmax loss, and prediction applies
    /// softmax explicitly.
    pub fn forward_logits(&self, input: &Tensor) -> Result<Tensor> {
        let h1 = self
            .fc1
            .forward(input)
            .map_err(|e| FramelearnError::Model(format!("fc1 forward failed: {e}")))?;
        let h1 = h1
            .relu()
            .map_err(|e| FramelearnError::Model(format!("ReLU failed: {e}")))?;
        self.fc2
            .forward(&h1)
            .map_err(|e| FramelearnError::Model(format!("fc2 forward failed: {e}")))
    }

    /// Softmax class probabilities for one activation tensor.
    ///
    /// The activation may arrive in the extractor's native shape; it is
    /// flattened to one `[1, F]` row first. Returns `num_classes`
    /// probabilities summing to 1.
    pub fn predict_probs(&self, activation: &Tensor) -> Result<Vec<f32>> {
        let input = self.flatten_row(activation)?;
        let logits = self.forward_logits(&input)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)
            .map_err(|e| FramelearnError::Model(format!("softmax failed: {e}")))?;
        probs
            .squeeze(0)
            .and_then(|t| t.to_vec1())
            .map_err(|e| FramelearnError::Model(format!("Failed to read probabilities: {e}")))
    }

    /// Arg-max class id for one activation tensor.
    pub fn predict_class(&self, activation: &Tensor) -> Result<usize> {
        let probs = self.predict_probs(activation)?;
        let (class_id, _) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .ok_or_else(|| FramelearnError::Model("empty probability vector".to_string()))?;
        Ok(class_id)
    }

    /// Number of output classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Expected flattened activation length.
    #[must_use]
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Device this head runs on.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn flatten_row(&self, activation: &Tensor) -> Result<Tensor> {
        let elems = activation.elem_count();
        if elems != self.feature_dim {
            return Err(FramelearnError::Model(format!(
                "activation has {elems} elements, expected {}",
                self.feature_dim
            )));
        }
        activation
            .flatten_all()
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_device(&self.device))
            .and_then(|t| t.reshape((1, self.feature_dim)))
            .map_err(|e| FramelearnError::Model(format!("Failed to flatten activation: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
