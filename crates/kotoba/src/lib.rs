//! # Kotoba
//!
//! Small text-classification toolkit: frequency vocabularies, offset-packed
//! batches, and candle embedding-bag / LSTM classifiers with a manual
//! training loop.
//!
//! The most used types of `kotoba-core` and `kotoba-trainer` are re-exported here.

pub use kotoba_core::{
    BasicEnglish, Collator, EncodedBatch, KotobaError, LabelRule, Sample, TextTokenizer, Vocab,
    VocabBuilder,
};
pub use kotoba_trainer::{Classifier, Trainer, TrainingConfig, TrainingSummary, run_training};
