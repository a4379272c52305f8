//! Core types, traits, and errors for framelearn
//!
//! This crate contains the foundational pieces shared across all framelearn
//! components: the error taxonomy, the collaborator traits consumed by the
//! session (frame source and feature extractor), and the configuration
//! types carrying the fixed training hyperparameters.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for all framelearn operations.
#[derive(Debug, thiserror::Error)]
pub enum FramelearnError {
    /// A label outside the configured `[0, num_classes)` range was supplied.
    #[error("Invalid label {label}: expected a class index in [0, {num_classes})")]
    InvalidLabel {
        /// The rejected label.
        label: usize,
        /// The number of classes the store was constructed with.
        num_classes: usize,
    },

    /// A feature vector whose element count does not match the configured
    /// feature dimension was supplied.
    #[error("Invalid example: {0}")]
    InvalidExample(String),

    /// Training was requested with zero accumulated examples.
    #[error("Cannot train on an empty example store: add examples first")]
    EmptyDataset,

    /// A mini-batch fit step failed. The classifier is left in the weight
    /// state produced by the last successful batch.
    #[error("Training step failed: {0}")]
    TrainingStep(String),

    /// The frame source could not produce a frame.
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// An inference loop was started while one is already running.
    #[error("Inference loop is already running: stop it first")]
    AlreadyRunning,

    /// A failure inside the inference loop (feature extraction or
    /// classification of a captured frame).
    #[error("Inference error: {0}")]
    Inference(String),

    /// Classifier construction or forward-pass error.
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `std::result::Result<T, FramelearnError>`.
pub type Result<T> = std::result::Result<T, FramelearnError>;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// A source of input frames (typically a webcam behind a device layer).
///
/// `capture` is synchronous and returns one frame tensor of a fixed shape
/// (for example `[224, 224, 3]`, normalized to `[-1, 1]`). Device setup and
/// readiness handshakes happen before the source is handed to the session.
pub trait FrameSource: Send + Sync {
    /// Capture one frame.
    ///
    /// # Errors
    ///
    /// Returns [`FramelearnError::CaptureUnavailable`] when no frame can be
    /// produced.
    fn capture(&self) -> Result<Tensor>;
}

/// A frozen, pretrained feature extractor.
///
/// Maps a frame tensor to a fixed-shape activation tensor (for example
/// `[7, 7, 256]`). Stateless, pure, and deterministic given identical
/// weights and input; never trained by this crate.
pub trait FeatureExtractor: Send + Sync {
    /// Run the extractor on one frame and return its activation.
    fn extract(&self, frame: &Tensor) -> Result<Tensor>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Hyperparameters for one training run.
///
/// All values are fixed per session: ratio 0.4, 20 epochs, and Adam at
/// 1e-4 by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Fraction of the accumulated dataset used as the mini-batch size.
    /// The effective batch size is `floor(n * batch_size_ratio)`, clamped
    /// to a minimum of 1.
    pub batch_size_ratio: f64,
    /// Number of passes over the full dataset.
    pub epochs: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Base seed for the per-epoch shuffle.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size_ratio: 0.4,
            epochs: 20,
            learning_rate: 1e-4,
            seed: 42,
        }
    }
}

/// Session-wide configuration: classifier topology plus training
/// hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of classes to predict. Fixed for the session lifetime.
    pub num_classes: usize,
    /// Flattened length of one feature-extractor activation
    /// (for example 7 * 7 * 256 = 12544).
    pub feature_dim: usize,
    /// Width of the classifier's hidden dense layer.
    pub hidden_units: usize,
    /// Training hyperparameters.
    pub train: TrainConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_classes: 4,
            feature_dim: 7 * 7 * 256,
            hidden_units: 100,
            train: TrainConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
