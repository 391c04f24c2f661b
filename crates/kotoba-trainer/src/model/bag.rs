//! Embedding-bag classifier: mean embedding → Linear → ReLU → Linear.

use candle_core::{Module, Result, Tensor};
use candle_nn::{Init, Linear, VarBuilder};

use super::{BatchTensors, Classifier, EmbeddingBag};

/// Linear layer with uniform weights and zero bias.
pub(crate) fn uniform_linear(
    in_dim: usize,
    out_dim: usize,
    init_range: f64,
    vb: VarBuilder,
) -> Result<Linear> {
    let weight = vb.get_with_hints(
        (out_dim, in_dim),
        "weight",
        Init::Uniform {
            lo: -init_range,
            up: init_range,
        },
    )?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.0))?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Topic classifier over averaged token embeddings.
#[derive(Debug, Clone)]
pub struct TextClassificationModel {
    embedding: EmbeddingBag,
    hidden: Linear,
    output: Linear,
}

impl TextClassificationModel {
    pub fn new(
        vocab_size: usize,
        embed_dim: usize,
        hidden_dim: usize,
        num_classes: usize,
        init_range: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let embedding = EmbeddingBag::new(vocab_size, embed_dim, init_range, vb.pp("embedding"))?;
        let hidden = uniform_linear(embed_dim, hidden_dim, init_range, vb.pp("fc1"))?;
        let output = uniform_linear(hidden_dim, num_classes, init_range, vb.pp("fc2"))?;
        Ok(Self {
            embedding,
            hidden,
            output,
        })
    }

    pub fn embedding(&self) -> &EmbeddingBag {
        &self.embedding
    }
}

impl Classifier for TextClassificationModel {
    fn forward(&self, batch: &BatchTensors) -> Result<Tensor> {
        let pooled = self.embedding.forward(batch)?;
        let hidden = self.hidden.forward(&pooled)?.relu()?;
        self.output.forward(&hidden)
    }

    fn embedding_weight(&self) -> &Tensor {
        self.embedding.weight()
    }
}
