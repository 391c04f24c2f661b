//! # Training Configuration
//!
//! Hyperparameters for one run. Loadable from JSON; every field has a
//! default so partial files are fine.

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use kotoba_core::data::LabelRule;
use serde::{Deserialize, Serialize};

use crate::model::ModelKind;

/// Hyperparameters and data settings for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Architecture to train
    pub model: ModelKind,
    /// How raw labels become class ids
    pub label_rule: LabelRule,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    /// Weights start uniform in `[-init_range, init_range]`
    pub init_range: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Learning rate multiplier applied when validation accuracy stalls
    pub lr_gamma: f64,
    /// Upper bound on the global gradient L2 norm
    pub clip_norm: f64,
    /// Fraction of the training corpus held out for validation
    pub valid_fraction: f64,
    /// Batches between running-accuracy reports
    pub log_interval: usize,
    pub min_freq: usize,
    pub max_vocab: Option<usize>,
    pub shuffle: bool,
    pub seed: u64,
    /// Send the final embedding table, labelled by vocabulary token, to the
    /// metric sink
    pub log_embeddings: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::ag_news()
    }
}

impl TrainingConfig {
    /// Four-class topic classification with the embedding-bag model.
    pub fn ag_news() -> Self {
        Self {
            model: ModelKind::EmbeddingBag,
            label_rule: LabelRule::Topic { num_classes: 4 },
            embed_dim: 64,
            hidden_dim: 64,
            init_range: 0.5,
            epochs: 10,
            batch_size: 64,
            learning_rate: 5.0,
            lr_gamma: 0.1,
            clip_norm: 0.1,
            valid_fraction: 0.05,
            log_interval: 500,
            min_freq: 1,
            max_vocab: None,
            shuffle: true,
            seed: 42,
            log_embeddings: true,
        }
    }

    /// Binary sentiment classification with the LSTM model.
    pub fn imdb() -> Self {
        Self {
            model: ModelKind::Lstm,
            label_rule: LabelRule::Sentiment,
            embed_dim: 64,
            hidden_dim: 64,
            init_range: 0.1,
            epochs: 5,
            batch_size: 32,
            learning_rate: 1.0,
            clip_norm: 1.0,
            log_interval: 100,
            min_freq: 2,
            ..Self::ag_news()
        }
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject settings that would make the training loop meaningless.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.epochs == 0 {
            bail!("epochs must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.learning_rate <= 0.0 {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !(0.0..1.0).contains(&self.valid_fraction) {
            bail!("valid_fraction must be in [0, 1), got {}", self.valid_fraction);
        }
        if self.label_rule.num_classes() < 2 {
            bail!("at least two classes are required");
        }
        if self.embed_dim == 0 || self.hidden_dim == 0 {
            bail!("embed_dim and hidden_dim must be non-zero");
        }
        Ok(())
    }

    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_lr_gamma(mut self, lr_gamma: f64) -> Self {
        self.lr_gamma = lr_gamma;
        self
    }

    pub fn with_clip_norm(mut self, clip_norm: f64) -> Self {
        self.clip_norm = clip_norm;
        self
    }

    /// Set the validation hold-out fraction, clamped to `[0, 0.99]`.
    pub fn with_valid_fraction(mut self, fraction: f64) -> Self {
        self.valid_fraction = fraction.clamp(0.0, 0.99);
        self
    }

    pub fn with_dims(mut self, embed_dim: usize, hidden_dim: usize) -> Self {
        self.embed_dim = embed_dim;
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_log_embeddings(mut self, log_embeddings: bool) -> Self {
        self.log_embeddings = log_embeddings;
        self
    }
}
