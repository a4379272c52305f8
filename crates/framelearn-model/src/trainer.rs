//! Fixed-hyperparameter mini-batch trainer for the classifier head.
//!
//! Runs a fixed number of epochs of mini-batch gradient descent with Adam,
//! minimizing categorical cross-entropy between the head's softmax output
//! and the store's one-hot labels. The dataset is reshuffled every epoch.
//!
//! After every mini-batch the observer callback receives the batch loss and
//! the trainer yields to the scheduler, so a multi-second fit never starves
//! other cooperative tasks. Cancellation is not supported: once started, a
//! run proceeds through all epochs.
//!
//! Training is cumulative. Calling `train` again with the same varmap
//! continues optimizing the same weights over the full accumulated dataset.

use candle_core::{Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use framelearn_core::{FramelearnError, Result, TrainConfig};
use tracing::{debug, info};

use crate::batch::BatchIterator;
use crate::classifier::ClassifierHead;
use crate::example_store::ExampleStore;

/// Summary of one completed training run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// Epochs executed.
    pub epochs: usize,
    /// Effective mini-batch size used.
    pub batch_size: usize,
    /// Total mini-batches processed (`epochs * ceil(n / batch_size)`).
    pub batches: usize,
    /// Loss of the last mini-batch.
    pub final_loss: f64,
}

/// Mini-batch Adam trainer with a per-batch observer and cooperative yields.
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    /// Create a trainer with the given hyperparameters.
    #[must_use]
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// The hyperparameters this trainer runs with.
    #[must_use]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Fit `classifier` to the accumulated examples in `store`.
    ///
    /// `varmap` must be the map the classifier was constructed from; its
    /// variables are the weights the optimizer steps. `on_batch_end` is
    /// invoked synchronously with the loss of every mini-batch, after which
    /// the trainer yields to the scheduler before the next batch.
    ///
    /// The effective batch size is `floor(n * batch_size_ratio)`, clamped to
    /// a minimum of 1 so very small datasets still form valid batches.
    ///
    /// # Errors
    ///
    /// [`FramelearnError::EmptyDataset`] if the store holds no examples
    /// (checked before any optimizer state is created, leaving the weights
    /// untouched), and [`FramelearnError::TrainingStep`] if a fit step
    /// fails, leaving the weights as the last successful batch left them.
    pub async fn train(
        &self,
        classifier: &ClassifierHead,
        varmap: &VarMap,
        store: &ExampleStore,
        mut on_batch_end: impl FnMut(f64),
    ) -> Result<TrainReport> {
        let (features, labels) = match (store.features(), store.labels()) {
            (Some(features), Some(labels)) => (features.clone(), labels.clone()),
            _ => return Err(FramelearnError::EmptyDataset),
        };

        let total = store.len();
        let batch_size = ((total as f64 * self.config.batch_size_ratio).floor() as usize).max(1);

        info!(
            examples = total,
            batch_size,
            epochs = self.config.epochs,
            learning_rate = self.config.learning_rate,
            "training started"
        );

        // Weight decay stays at zero, which reduces AdamW to plain Adam.
        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(varmap.all_vars(), params)
            .map_err(|e| FramelearnError::TrainingStep(format!("Failed to create optimizer: {e}")))?;

        let mut batch_iter = BatchIterator::new(features, labels, batch_size)?;
        let mut batches = 0usize;
        let mut final_loss = 0.0_f64;

        for epoch in 0..self.config.epochs {
            batch_iter.reshuffle(self.config.seed, epoch);

            let mut epoch_loss = 0.0_f64;
            let mut epoch_batches = 0usize;

            while let Some((batch_features, batch_labels)) = batch_iter.next_batch()? {
                let loss_val =
                    self.fit_step(classifier, &mut optimizer, &batch_features, &batch_labels)?;

                epoch_loss += loss_val;
                epoch_batches += 1;
                batches += 1;
                final_loss = loss_val;

                on_batch_end(loss_val);
                // Mandatory cooperative yield: exactly one mini-batch is
                // processed between suspension points.
                tokio::task::yield_now().await;
            }

            debug!(
                epoch = epoch + 1,
                avg_loss = epoch_loss / epoch_batches as f64,
                "epoch complete"
            );
        }

        info!(batches, final_loss, "training complete");

        Ok(TrainReport {
            epochs: self.config.epochs,
            batch_size,
            batches,
            final_loss,
        })
    }

    /// One forward/backward/update step. Returns the batch loss.
    fn fit_step(
        &self,
        classifier: &ClassifierHead,
        optimizer: &mut AdamW,
        batch_features: &Tensor,
        batch_labels: &Tensor,
    ) -> Result<f64> {
        let logits = classifier.forward_logits(batch_features)?;

        // Categorical cross-entropy against one-hot rows:
        // loss = -mean over the batch of sum(one_hot * log_softmax(logits)).
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)
            .map_err(|e| FramelearnError::TrainingStep(format!("log-softmax failed: {e}")))?;
        let loss = (&log_probs * batch_labels)
            .and_then(|t| t.sum(1))
            .and_then(|t| t.mean_all())
            .and_then(|t| t.neg())
            .map_err(|e| FramelearnError::TrainingStep(format!("loss computation failed: {e}")))?;

        optimizer
            .backward_step(&loss)
            .map_err(|e| FramelearnError::TrainingStep(format!("backward step failed: {e}")))?;

        let loss_val = loss
            .to_scalar::<f32>()
            .map_err(|e| FramelearnError::TrainingStep(format!("loss scalar failed: {e}")))?;
        Ok(f64::from(loss_val))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
