//! Session orchestration: one classifier, one example store, two
//! mutually-exclusive long-running tasks.
//!
//! [`LearningSession`] owns every piece of mutable state in the system: the
//! example store, the classifier weights (via the session's `VarMap`), the
//! trainer, and the inference loop. The components never share mutable
//! state with each other directly; all coordination goes through the
//! session, which enforces the one scheduling rule of the design: starting
//! training stops any running inference loop and waits for it to drain
//! before the first optimizer step.
//!
//! Session methods that mutate state take `&mut self`, so overlapping
//! `start_training` calls cannot be expressed without the caller opting
//! into their own interior mutability; serializing training invocations
//! stays a caller responsibility.

use std::sync::Arc;

use candle_core::Device;
use candle_nn::VarMap;
use framelearn_core::{FeatureExtractor, FrameSource, Result, SessionConfig};
use framelearn_model::{ClassifierConfig, ClassifierHead, ExampleStore, TrainReport, Trainer};
use tracing::{debug, info, warn};

use crate::inference::InferenceLoop;

/// A complete teachable-machine session.
pub struct LearningSession {
    config: SessionConfig,
    source: Arc<dyn FrameSource>,
    extractor: Arc<dyn FeatureExtractor>,
    store: ExampleStore,
    varmap: VarMap,
    classifier: Arc<ClassifierHead>,
    trainer: Trainer,
    inference: InferenceLoop,
}

impl LearningSession {
    /// Build a session from its configuration and collaborators.
    ///
    /// The classifier is constructed once here with fresh weights and
    /// persists across training and prediction cycles; repeated training
    /// keeps optimizing the same weights.
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn FrameSource>,
        extractor: Arc<dyn FeatureExtractor>,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let classifier = Arc::new(ClassifierHead::new_trainable(
            &varmap,
            device,
            &ClassifierConfig {
                feature_dim: config.feature_dim,
                hidden_units: config.hidden_units,
                num_classes: config.num_classes,
            },
        )?);
        let store = ExampleStore::new(config.num_classes, config.feature_dim, device);
        let trainer = Trainer::new(config.train.clone());

        info!(
            num_classes = config.num_classes,
            feature_dim = config.feature_dim,
            hidden_units = config.hidden_units,
            "session created"
        );

        Ok(Self {
            config,
            source,
            extractor,
            store,
            varmap,
            classifier,
            trainer,
            inference: InferenceLoop::new(),
        })
    }

    /// Run one capture + extraction pass and discard the results, priming
    /// any lazy state in the collaborators before the first real use.
    pub fn warm_up(&self) -> Result<()> {
        let frame = self.source.capture()?;
        let _activation = self.extractor.extract(&frame)?;
        debug!("collaborators warmed up");
        Ok(())
    }

    /// Capture one frame, extract its activation, and record it as a
    /// training example for `label`.
    ///
    /// Returns the number of examples now recorded for that label.
    pub fn record_example(&mut self, label: usize) -> Result<usize> {
        let frame = self.source.capture()?;
        let activation = self.extractor.extract(&frame)?;
        self.store.add_example(&activation, label)?;

        let count = self.store.count_for(label);
        info!(label, count, "example recorded");
        Ok(count)
    }

    /// Train the classifier on all accumulated examples.
    ///
    /// Training and inference share the classifier weights and must never
    /// run interleaved, so a running inference loop is stopped and drained
    /// first. `on_batch_end` receives the loss of every mini-batch.
    pub async fn start_training(&mut self, on_batch_end: impl FnMut(f64)) -> Result<TrainReport> {
        if self.inference.is_running() {
            info!("stopping inference loop before training");
            self.inference.stop();
            if let Err(e) = self.inference.join().await {
                warn!(error = %e, "inference loop ended with error");
            }
        }

        self.trainer
            .train(&self.classifier, &self.varmap, &self.store, on_batch_end)
            .await
    }

    /// Start continuous live classification.
    ///
    /// # Errors
    ///
    /// [`framelearn_core::FramelearnError::AlreadyRunning`] when a loop is
    /// already active.
    pub fn start_inference<F>(&mut self, on_prediction: F) -> Result<()>
    where
        F: FnMut(usize) + Send + 'static,
    {
        self.inference.start(
            Arc::clone(&self.source),
            Arc::clone(&self.extractor),
            Arc::clone(&self.classifier),
            on_prediction,
        )
    }

    /// Request the inference loop to stop at its next iteration boundary.
    pub fn stop_inference(&self) {
        self.inference.stop();
    }

    /// Stop the inference loop and wait for it to drain, surfacing any
    /// error the loop terminated with.
    pub async fn stop_inference_and_join(&self) -> Result<()> {
        self.inference.stop();
        self.inference.join().await
    }

    /// `true` while an inference loop is active.
    #[must_use]
    pub fn inference_running(&self) -> bool {
        self.inference.is_running()
    }

    /// Most recent emitted class id, `None` before the first prediction.
    #[must_use]
    pub fn last_prediction(&self) -> Option<usize> {
        self.inference.last_prediction()
    }

    /// The accumulated example store.
    #[must_use]
    pub fn store(&self) -> &ExampleStore {
        &self.store
    }

    /// Drop all accumulated examples. The classifier weights are untouched.
    pub fn reset_examples(&mut self) {
        self.store.reset();
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
