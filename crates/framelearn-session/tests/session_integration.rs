//! End-to-end session flow: record examples, train, run live inference.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use framelearn_core::{
    FeatureExtractor, FrameSource, FramelearnError, Result, SessionConfig, TrainConfig,
};
use framelearn_session::LearningSession;

const FEATURE_DIM: usize = 8;
const NUM_CLASSES: usize = 4;

/// Frame source that plays back a fixed script of frames, one per capture,
/// repeating the last frame once the script is exhausted.
struct ScriptedSource {
    frames: std::sync::Mutex<Vec<f32>>,
}

impl ScriptedSource {
    fn new(fills: Vec<f32>) -> Self {
        let mut frames = fills;
        frames.reverse();
        Self {
            frames: std::sync::Mutex::new(frames),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn capture(&self) -> Result<Tensor> {
        let mut frames = self.frames.lock().unwrap();
        let fill = if frames.len() > 1 {
            frames.pop().unwrap()
        } else {
            *frames.last().unwrap()
        };
        Tensor::full(fill, FEATURE_DIM, &Device::Cpu)
            .map_err(|e| FramelearnError::CaptureUnavailable(e.to_string()))
    }
}

struct IdentityExtractor;

impl FeatureExtractor for IdentityExtractor {
    fn extract(&self, frame: &Tensor) -> Result<Tensor> {
        frame
            .to_dtype(DType::F32)
            .map_err(|e| FramelearnError::Inference(e.to_string()))
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        num_classes: NUM_CLASSES,
        feature_dim: FEATURE_DIM,
        hidden_units: 16,
        train: TrainConfig::default(),
    }
}

#[tokio::test]
async fn test_full_session_flow() {
    // One distinct frame per example so every class gets its own signal.
    let labels = [0usize, 0, 1, 1, 2, 2, 2, 3, 3, 3];
    let fills: Vec<f32> = labels.iter().map(|&l| l as f32 - 1.5).collect();
    let mut session = LearningSession::new(
        config(),
        Arc::new(ScriptedSource::new(fills)),
        Arc::new(IdentityExtractor),
        &Device::Cpu,
    )
    .unwrap();

    for &label in &labels {
        session.record_example(label).unwrap();
    }
    assert_eq!(session.store().len(), 10);
    assert_eq!(session.store().class_counts(), &[2, 2, 3, 3]);

    // batch_size = floor(10 * 0.4) = 4, so 3 batches per epoch over the
    // default 20 epochs.
    let mut batch_losses = Vec::new();
    let report = session
        .start_training(|loss| batch_losses.push(loss))
        .await
        .unwrap();
    assert_eq!(report.batch_size, 4);
    assert_eq!(report.batches, 60);
    assert_eq!(batch_losses.len(), 60);
    assert!(batch_losses.iter().all(|l| l.is_finite()));

    // Live classification emits in-range class ids.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .start_inference(move |class_id| {
            let _ = tx.send(class_id);
        })
        .unwrap();
    assert!(session.inference_running());

    for _ in 0..3 {
        let class_id = rx.recv().await.unwrap();
        assert!(class_id < NUM_CLASSES);
    }

    // A second start while the loop is live is rejected, and exactly one
    // loop keeps running.
    let err = session.start_inference(|_| {}).unwrap_err();
    assert!(matches!(err, FramelearnError::AlreadyRunning));
    assert!(session.inference_running());

    session.stop_inference_and_join().await.unwrap();
    assert!(!session.inference_running());
    assert!(session.last_prediction().is_some());
}

#[tokio::test]
async fn test_training_then_inference_then_more_training() {
    let mut session = LearningSession::new(
        config(),
        Arc::new(ScriptedSource::new(vec![-1.0, 1.0])),
        Arc::new(IdentityExtractor),
        &Device::Cpu,
    )
    .unwrap();

    session.record_example(0).unwrap();
    session.record_example(1).unwrap();

    // Two examples: floor(2 * 0.4) = 0 clamps to batch size 1.
    let report = session.start_training(|_| {}).await.unwrap();
    assert_eq!(report.batch_size, 1);

    session.start_inference(|_| {}).unwrap();

    // Growing the dataset and retraining stops the live loop first and
    // keeps optimizing the same weights.
    session.record_example(1).unwrap();
    let report = session.start_training(|_| {}).await.unwrap();
    assert_eq!(report.batches, report.epochs * 3);
    assert!(!session.inference_running());
}
