//! Mean-mode embedding bag: one averaged embedding per variable-length span.

use candle_core::{DType, Module, Result, Tensor};
use candle_nn::{Embedding, Init, VarBuilder};

use super::BatchTensors;

/// Embedding table whose lookups are averaged over each sample's span.
#[derive(Debug, Clone)]
pub struct EmbeddingBag {
    embedding: Embedding,
    embed_dim: usize,
}

impl EmbeddingBag {
    /// Table of `vocab_size × embed_dim`, initialized uniformly in
    /// `[-init_range, init_range]`.
    pub fn new(vocab_size: usize, embed_dim: usize, init_range: f64, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(
            (vocab_size, embed_dim),
            "weight",
            Init::Uniform {
                lo: -init_range,
                up: init_range,
            },
        )?;
        Ok(Self::from_weight(weight, embed_dim))
    }

    pub fn from_weight(weight: Tensor, embed_dim: usize) -> Self {
        Self {
            embedding: Embedding::new(weight, embed_dim),
            embed_dim,
        }
    }

    pub fn weight(&self) -> &Tensor {
        self.embedding.embeddings()
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    /// Per-token embeddings, `[num_tokens, embed_dim]`.
    pub fn lookup(&self, ids: &Tensor) -> Result<Tensor> {
        self.embedding.forward(ids)
    }

    /// Averaged embeddings, `[batch, embed_dim]`. Empty spans give zeros.
    ///
    /// The mean is computed as `A · E` where `E` holds the looked-up token
    /// embeddings and row `i` of `A` is `1/len_i` over sample `i`'s span.
    pub fn forward(&self, batch: &BatchTensors) -> Result<Tensor> {
        let batch_size = batch.len();
        let num_tokens = batch.num_tokens();
        if num_tokens == 0 {
            return Tensor::zeros((batch_size, self.embed_dim), DType::F32, &batch.device);
        }

        let mut weights = vec![0f32; batch_size * num_tokens];
        for (row, (start, end)) in batch.spans().into_iter().enumerate() {
            if end > start {
                let share = 1.0 / (end - start) as f32;
                weights[row * num_tokens + start..row * num_tokens + end].fill(share);
            }
        }
        let averaging = Tensor::from_vec(weights, (batch_size, num_tokens), &batch.device)?;

        let embedded = self.lookup(&batch.token_ids)?;
        averaging.matmul(&embedded)
    }
}
