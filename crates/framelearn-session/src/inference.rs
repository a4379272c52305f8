//! Continuous live-classification loop with cooperative cancellation.
//!
//! Each iteration captures one frame, pushes it through the frozen feature
//! extractor and the classifier head, emits the arg-max class id to the
//! observer, and then yields to the scheduler. Cancellation is observed
//! only at the top of an iteration: a single in-flight classification step
//! always completes before the loop exits.
//!
//! ## Design
//!
//! * A per-instance [`tokio_util::sync::CancellationToken`] scopes
//!   cancellation to one loop, so two sessions (or two tests) never share
//!   a running flag.
//! * [`InferenceLoop`] is cheap to clone; clones share the same state, so a
//!   prediction observer can capture a clone and call [`InferenceLoop::stop`]
//!   from inside the callback.
//! * All tensors created within one iteration (frame, activation,
//!   probabilities) are scoped to that iteration and released on both the
//!   success and error paths.

use std::sync::{Arc, Mutex, MutexGuard};

use framelearn_core::{FeatureExtractor, FrameSource, FramelearnError, Result};
use framelearn_model::ClassifierHead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cancellable, cooperative live-classification loop.
///
/// State machine with two states, `Idle` and `Running`. [`InferenceLoop::start`]
/// moves `Idle → Running` and fails with [`FramelearnError::AlreadyRunning`]
/// when a loop is already active, so exactly one loop ever emits
/// predictions. [`InferenceLoop::stop`] requests `Running → Idle`; the loop
/// observes the request at its next iteration boundary.
#[derive(Clone, Default)]
pub struct InferenceLoop {
    inner: Arc<LoopInner>,
}

#[derive(Default)]
struct LoopInner {
    /// Token for the current run. Replaced with a fresh token on every
    /// `start`, since a cancelled token stays cancelled.
    token: Mutex<CancellationToken>,
    /// Handle of the spawned loop task, `None` before the first start.
    task: Mutex<Option<JoinHandle<Result<()>>>>,
    /// Most recent emitted class id.
    last_prediction: Arc<Mutex<Option<usize>>>,
}

impl InferenceLoop {
    /// Create an idle loop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the loop: `Idle → Running`.
    ///
    /// Spawns the cooperative loop onto the current tokio runtime. The
    /// observer is invoked once per iteration with the predicted class id
    /// and must not block.
    ///
    /// # Errors
    ///
    /// [`FramelearnError::AlreadyRunning`] if a previous start has not been
    /// stopped yet.
    pub fn start<F>(
        &self,
        source: Arc<dyn FrameSource>,
        extractor: Arc<dyn FeatureExtractor>,
        classifier: Arc<ClassifierHead>,
        on_prediction: F,
    ) -> Result<()>
    where
        F: FnMut(usize) + Send + 'static,
    {
        let mut task = lock(&self.inner.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(FramelearnError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *lock(&self.inner.token) = token.clone();

        let last_prediction = Arc::clone(&self.inner.last_prediction);
        *task = Some(tokio::spawn(run_loop(
            token,
            source,
            extractor,
            classifier,
            last_prediction,
            on_prediction,
        )));
        Ok(())
    }

    /// Request `Running → Idle`.
    ///
    /// Cooperative: the loop checks the flag at the top of its next
    /// iteration, so an in-flight classification completes first. Calling
    /// `stop` on an idle loop is a no-op.
    pub fn stop(&self) {
        lock(&self.inner.token).cancel();
    }

    /// `true` while the loop task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the loop task to terminate and surface its terminal result.
    ///
    /// Returns `Ok(())` immediately when no task was started. A loop that
    /// stopped itself on a capture or classification failure yields that
    /// error here.
    pub async fn join(&self) -> Result<()> {
        let handle = lock(&self.inner.task).take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| FramelearnError::Inference(format!("inference task aborted: {e}")))?,
            None => Ok(()),
        }
    }

    /// Most recent emitted class id, `None` before the first emission.
    #[must_use]
    pub fn last_prediction(&self) -> Option<usize> {
        *lock(&self.inner.last_prediction)
    }
}

async fn run_loop<F>(
    token: CancellationToken,
    source: Arc<dyn FrameSource>,
    extractor: Arc<dyn FeatureExtractor>,
    classifier: Arc<ClassifierHead>,
    last_prediction: Arc<Mutex<Option<usize>>>,
    mut on_prediction: F,
) -> Result<()>
where
    F: FnMut(usize) + Send + 'static,
{
    info!("inference loop running");
    while !token.is_cancelled() {
        let class_id =
            match classify_frame(source.as_ref(), extractor.as_ref(), classifier.as_ref()) {
                Ok(class_id) => class_id,
                Err(e) => {
                    // Stop rather than spin; the caller sees the error via
                    // `join` and may retry at its own level.
                    warn!(error = %e, "inference loop stopping on failure");
                    return Err(e);
                }
            };

        *lock(&last_prediction) = Some(class_id);
        on_prediction(class_id);

        // Cooperative suspension point. Exactly one frame is processed
        // between yields; cancellation is observed at the top of the next
        // iteration, never mid-step.
        tokio::task::yield_now().await;
    }
    info!("inference loop stopped");
    Ok(())
}

/// Classify one frame. Every intermediate tensor is scoped to this call and
/// released on return, whichever path is taken.
fn classify_frame(
    source: &dyn FrameSource,
    extractor: &dyn FeatureExtractor,
    classifier: &ClassifierHead,
) -> Result<usize> {
    let frame = source.capture()?;
    let activation = extractor.extract(&frame)?;
    classifier.predict_class(&activation)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarMap;
    use framelearn_model::ClassifierConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FEATURE_DIM: usize = 8;

    struct StaticSource;

    impl FrameSource for StaticSource {
        fn capture(&self) -> Result<Tensor> {
            Tensor::ones(FEATURE_DIM, DType::F32, &Device::Cpu)
                .map_err(|e| FramelearnError::CaptureUnavailable(e.to_string()))
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn capture(&self) -> Result<Tensor> {
            Err(FramelearnError::CaptureUnavailable(
                "device detached".to_string(),
            ))
        }
    }

    struct IdentityExtractor;

    impl FeatureExtractor for IdentityExtractor {
        fn extract(&self, frame: &Tensor) -> Result<Tensor> {
            Ok(frame.clone())
        }
    }

    fn classifier() -> Arc<ClassifierHead> {
        let varmap = VarMap::new();
        Arc::new(
            ClassifierHead::new_trainable(
                &varmap,
                &Device::Cpu,
                &ClassifierConfig {
                    feature_dim: FEATURE_DIM,
                    hidden_units: 8,
                    num_classes: 4,
                },
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_loop_emits_predictions_until_stopped() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let inference = InferenceLoop::new();
        inference
            .start(
                Arc::new(StaticSource),
                Arc::new(IdentityExtractor),
                classifier(),
                move |class_id| {
                    let _ = tx.send(class_id);
                },
            )
            .unwrap();
        assert!(inference.is_running());

        for _ in 0..3 {
            let class_id = rx.recv().await.unwrap();
            assert!(class_id < 4);
        }

        inference.stop();
        inference.join().await.unwrap();
        assert!(!inference.is_running());
        assert!(inference.last_prediction().is_some());
    }

    #[tokio::test]
    async fn test_stop_from_within_callback_halts_promptly() {
        let steps = Arc::new(AtomicUsize::new(0));
        let inference = InferenceLoop::new();

        let steps_cb = Arc::clone(&steps);
        let handle = inference.clone();
        inference
            .start(
                Arc::new(StaticSource),
                Arc::new(IdentityExtractor),
                classifier(),
                move |_| {
                    steps_cb.fetch_add(1, Ordering::SeqCst);
                    handle.stop();
                },
            )
            .unwrap();

        inference.join().await.unwrap();
        assert!(!inference.is_running());

        // At most one more classification step may run after the stop call.
        let total = steps.load(Ordering::SeqCst);
        assert!((1..=2).contains(&total), "ran {total} steps after stop");
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let inference = InferenceLoop::new();
        inference
            .start(
                Arc::new(StaticSource),
                Arc::new(IdentityExtractor),
                classifier(),
                |_| {},
            )
            .unwrap();

        let err = inference
            .start(
                Arc::new(StaticSource),
                Arc::new(IdentityExtractor),
                classifier(),
                |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, FramelearnError::AlreadyRunning));

        inference.stop();
        inference.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_can_restart_after_stop() {
        let inference = InferenceLoop::new();
        for _ in 0..2 {
            inference
                .start(
                    Arc::new(StaticSource),
                    Arc::new(IdentityExtractor),
                    classifier(),
                    |_| {},
                )
                .unwrap();
            assert!(inference.is_running());
            inference.stop();
            inference.join().await.unwrap();
            assert!(!inference.is_running());
        }
    }

    #[tokio::test]
    async fn test_capture_failure_stops_loop_and_surfaces_error() {
        let inference = InferenceLoop::new();
        inference
            .start(
                Arc::new(FailingSource),
                Arc::new(IdentityExtractor),
                classifier(),
                |_| panic!("no prediction should be emitted"),
            )
            .unwrap();

        let err = inference.join().await.unwrap_err();
        assert!(matches!(err, FramelearnError::CaptureUnavailable(_)));
        assert!(!inference.is_running());
        assert!(inference.last_prediction().is_none());
    }

    #[tokio::test]
    async fn test_stop_on_idle_loop_is_noop() {
        let inference = InferenceLoop::new();
        inference.stop();
        inference.join().await.unwrap();
        assert!(!inference.is_running());
    }
}
