//! Recurrent sentiment classifier: Embedding → LSTM → Linear on the final
//! hidden state of each sample.

use candle_core::{DType, Module, Result, Tensor};
use candle_nn::{Embedding, Init, LSTM, LSTMConfig, Linear, RNN, VarBuilder};

use super::bag::uniform_linear;
use super::{BatchTensors, Classifier};

/// LSTM over each sample's span; spans are padded internally to the longest
/// one and the state at each sample's last real token is classified.
#[derive(Debug, Clone)]
pub struct RecurrentClassifier {
    embedding: Embedding,
    lstm: LSTM,
    output: Linear,
    hidden_dim: usize,
    pad_id: u32,
}

impl RecurrentClassifier {
    pub fn new(
        vocab_size: usize,
        embed_dim: usize,
        hidden_dim: usize,
        num_classes: usize,
        init_range: f64,
        pad_id: u32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let uniform = Init::Uniform {
            lo: -init_range,
            up: init_range,
        };
        let weight = vb.pp("embedding").get_with_hints((vocab_size, embed_dim), "weight", uniform)?;
        let embedding = Embedding::new(weight, embed_dim);

        let lstm_config = LSTMConfig {
            w_ih_init: uniform,
            w_hh_init: uniform,
            b_ih_init: Some(Init::Const(0.0)),
            b_hh_init: Some(Init::Const(0.0)),
            ..Default::default()
        };
        let lstm = candle_nn::lstm(embed_dim, hidden_dim, lstm_config, vb.pp("lstm"))?;
        let output = uniform_linear(hidden_dim, num_classes, init_range, vb.pp("fc"))?;

        Ok(Self {
            embedding,
            lstm,
            output,
            hidden_dim,
            pad_id,
        })
    }

    /// Final hidden state per sample, `[batch, hidden_dim]`. Empty spans
    /// give zeros.
    fn encode(&self, batch: &BatchTensors) -> Result<Tensor> {
        let spans = batch.spans();
        let max_len = spans.iter().map(|(s, e)| e - s).max().unwrap_or(0);
        if max_len == 0 {
            return Tensor::zeros((batch.len(), self.hidden_dim), DType::F32, &batch.device);
        }

        let mut padded = Vec::with_capacity(batch.len() * max_len);
        for &(start, end) in &spans {
            padded.extend_from_slice(&batch.host_ids[start..end]);
            padded.extend(std::iter::repeat_n(self.pad_id, max_len - (end - start)));
        }
        let ids = Tensor::from_vec(padded, (batch.len(), max_len), &batch.device)?;
        let embedded = self.embedding.forward(&ids)?;
        let states = self.lstm.seq(&embedded)?;

        let zero = Tensor::zeros((1, self.hidden_dim), DType::F32, &batch.device)?;
        let rows = spans
            .iter()
            .enumerate()
            .map(|(row, &(start, end))| match end - start {
                0 => Ok(zero.clone()),
                len => states[len - 1].h().narrow(0, row, 1),
            })
            .collect::<Result<Vec<_>>>()?;
        Tensor::cat(&rows, 0)
    }
}

impl Classifier for RecurrentClassifier {
    fn forward(&self, batch: &BatchTensors) -> Result<Tensor> {
        let hidden = self.encode(batch)?;
        self.output.forward(&hidden)
    }

    fn embedding_weight(&self) -> &Tensor {
        self.embedding.embeddings()
    }
}
