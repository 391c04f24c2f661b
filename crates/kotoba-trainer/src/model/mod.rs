//! # Classifiers
//!
//! Models consume an offset-packed batch and return `[batch, num_classes]`
//! logits. The training loop only sees the [`Classifier`] trait.

pub mod bag;
pub mod embedding_bag;
pub mod rnn;

use candle_core::{D, Device, Result, Tensor};
use candle_nn::VarBuilder;
use kotoba_core::data::EncodedBatch;
use serde::{Deserialize, Serialize};

pub use bag::TextClassificationModel;
pub use embedding_bag::EmbeddingBag;
pub use rnn::RecurrentClassifier;

use crate::config::TrainingConfig;

/// Which architecture to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Mean embedding bag followed by a two-layer MLP.
    EmbeddingBag,
    /// Embedding followed by a single-layer LSTM and a linear head.
    Lstm,
}

/// An [`EncodedBatch`] moved onto a device.
///
/// The host-side ids and offsets are kept because the aggregation stages
/// need span boundaries when building their index structures.
#[derive(Debug, Clone)]
pub struct BatchTensors {
    /// `[batch]` u32 class ids.
    pub labels: Tensor,
    /// `[num_tokens]` u32 token ids.
    pub token_ids: Tensor,
    pub host_ids: Vec<u32>,
    pub offsets: Vec<usize>,
    pub device: Device,
}

impl BatchTensors {
    pub fn new(batch: &EncodedBatch, device: &Device) -> Result<Self> {
        Ok(Self {
            labels: Tensor::new(batch.labels.as_slice(), device)?,
            token_ids: Tensor::new(batch.token_ids.as_slice(), device)?,
            host_ids: batch.token_ids.clone(),
            offsets: batch.offsets.iter().map(|&o| o as usize).collect(),
            device: device.clone(),
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn num_tokens(&self) -> usize {
        self.host_ids.len()
    }

    /// `(start, end)` of each sample's span in the flat buffer.
    pub fn spans(&self) -> Vec<(usize, usize)> {
        self.offsets
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = self.offsets.get(i + 1).copied().unwrap_or(self.host_ids.len());
                (start, end)
            })
            .collect()
    }
}

/// A text classifier over offset-packed batches.
pub trait Classifier {
    /// Per-class scores of shape `[batch, num_classes]`.
    fn forward(&self, batch: &BatchTensors) -> Result<Tensor>;

    /// The token embedding table, `[vocab_size, embed_dim]`.
    fn embedding_weight(&self) -> &Tensor;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn forward(&self, batch: &BatchTensors) -> Result<Tensor> {
        (**self).forward(batch)
    }

    fn embedding_weight(&self) -> &Tensor {
        (**self).embedding_weight()
    }
}

/// Build the configured model, registering its variables in `vb`.
pub fn build_classifier(
    config: &TrainingConfig,
    vocab_size: usize,
    pad_id: u32,
    vb: VarBuilder,
) -> Result<Box<dyn Classifier>> {
    let num_classes = config.label_rule.num_classes();
    Ok(match config.model {
        ModelKind::EmbeddingBag => Box::new(TextClassificationModel::new(
            vocab_size,
            config.embed_dim,
            config.hidden_dim,
            num_classes,
            config.init_range,
            vb,
        )?),
        ModelKind::Lstm => Box::new(RecurrentClassifier::new(
            vocab_size,
            config.embed_dim,
            config.hidden_dim,
            num_classes,
            config.init_range,
            pad_id,
            vb,
        )?),
    })
}

/// Number of rows whose argmax matches the label.
pub fn count_correct(logits: &Tensor, labels: &Tensor) -> Result<usize> {
    let predicted = logits.argmax(D::Minus1)?;
    let hits = predicted.eq(labels)?.to_dtype(candle_core::DType::F32)?.sum_all()?;
    Ok(hits.to_scalar::<f32>()? as usize)
}
