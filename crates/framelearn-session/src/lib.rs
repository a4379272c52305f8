//! Cooperative inference loop and session orchestration for framelearn
//!
//! This crate ties the learnable pieces from `framelearn-model` to the
//! collaborator traits from `framelearn-core`: [`InferenceLoop`] runs the
//! continuous capture → extract → classify loop with cooperative
//! cancellation, and [`LearningSession`] owns the store, the classifier
//! weights, and both long-running tasks, enforcing that training and
//! inference never touch the weights concurrently.

mod config;
mod inference;
mod session;

pub use config::load_config;
pub use inference::InferenceLoop;
pub use session::LearningSession;
