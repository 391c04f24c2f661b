//! # Kotoba Trainer
//!
//! Candle models over offset-packed batches and the loop that trains them:
//! a mean embedding-bag MLP for topic classification and an LSTM classifier
//! for sentiment, SGD with global gradient-norm clipping, and learning-rate
//! decay on validation plateaus.

pub mod config;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod trainer;

pub use config::TrainingConfig;
pub use metrics::{EmbeddingRecord, JsonlScalarSink, MemorySink, NullSink, ScalarRecord, ScalarSink};
pub use model::{
    BatchTensors, Classifier, EmbeddingBag, ModelKind, RecurrentClassifier, TextClassificationModel,
};
pub use pipeline::{RunOptions, run_training};
pub use trainer::{EpochRecord, EvalReport, PlateauDecay, Prediction, Trainer, TrainingSummary};
