//! Example store, classifier head, and trainer for framelearn
//!
//! This crate holds the learnable half of the system: the incremental
//! labeled-example store ([`ExampleStore`]), the small trainable classifier
//! head over frozen feature-extractor activations ([`ClassifierHead`]), and
//! the fixed-hyperparameter mini-batch trainer ([`Trainer`]).

mod batch;
mod classifier;
mod example_store;
mod trainer;

pub use batch::BatchIterator;
pub use classifier::{ClassifierConfig, ClassifierHead};
pub use example_store::ExampleStore;
pub use trainer::{TrainReport, Trainer};
