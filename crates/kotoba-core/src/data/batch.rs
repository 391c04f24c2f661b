//! # Batching and Collation
//!
//! Groups samples into fixed-size batches and packs each batch into three
//! parallel arrays: labels, a flat token-id buffer, and per-sample start
//! offsets into that buffer. Nothing is padded or truncated.

use std::borrow::Borrow;

use oorandom::Rand32;

use crate::data::sample::{LabelRule, Sample};
use crate::error::{KotobaError, Result};
use crate::text::{TextTokenizer, Vocab};

/// A collated batch.
///
/// `offsets[i]` is where sample `i` starts in `token_ids`; its span runs to
/// `offsets[i + 1]`, or to the end of the buffer for the last sample.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedBatch {
    pub labels: Vec<u32>,
    pub token_ids: Vec<u32>,
    pub offsets: Vec<u32>,
}

impl EncodedBatch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Token ids of sample `index`.
    pub fn span(&self, index: usize) -> Option<&[u32]> {
        let start = *self.offsets.get(index)? as usize;
        let end = self
            .offsets
            .get(index + 1)
            .map(|&o| o as usize)
            .unwrap_or(self.token_ids.len());
        self.token_ids.get(start..end)
    }

    /// Token count of every sample, in order.
    pub fn lengths(&self) -> Vec<usize> {
        (0..self.len())
            .map(|i| self.span(i).map_or(0, <[u32]>::len))
            .collect()
    }
}

/// Tokenize → vocabulary lookup → pack.
pub struct Collator<'a, T: TextTokenizer> {
    tokenizer: &'a T,
    vocab: &'a Vocab,
    rule: LabelRule,
}

impl<'a, T: TextTokenizer> Collator<'a, T> {
    pub fn new(tokenizer: &'a T, vocab: &'a Vocab, rule: LabelRule) -> Self {
        Self {
            tokenizer,
            vocab,
            rule,
        }
    }

    pub fn rule(&self) -> LabelRule {
        self.rule
    }

    pub fn vocab(&self) -> &Vocab {
        self.vocab
    }

    /// Map one text to token ids.
    pub fn encode_text(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self.vocab.encode(&self.tokenizer.try_tokenize(text)?))
    }

    /// Collate a batch of samples.
    ///
    /// # Errors
    /// [`KotobaError::EmptyBatch`] for zero samples,
    /// [`KotobaError::InvalidLabel`] for a label the rule rejects and
    /// [`KotobaError::Tokenizer`] for text the tokenizer cannot encode.
    pub fn collate<S: Borrow<Sample>>(&self, samples: &[S]) -> Result<EncodedBatch> {
        if samples.is_empty() {
            return Err(KotobaError::EmptyBatch);
        }

        let mut batch = EncodedBatch {
            labels: Vec::with_capacity(samples.len()),
            token_ids: Vec::new(),
            offsets: Vec::with_capacity(samples.len()),
        };

        for sample in samples {
            let sample = sample.borrow();
            batch.labels.push(self.rule.apply(&sample.label)?);
            batch.offsets.push(batch.token_ids.len() as u32);
            batch.token_ids.extend(self.encode_text(&sample.text)?);
        }

        Ok(batch)
    }
}

/// Iterator over fixed-size batches of borrowed samples.
pub struct Batches<'a> {
    samples: &'a [Sample],
    order: Vec<usize>,
    batch_size: usize,
    drop_last: bool,
    cursor: usize,
}

impl<'a> Batches<'a> {
    /// Batches in corpus order.
    pub fn sequential(samples: &'a [Sample], batch_size: usize) -> Self {
        Self {
            samples,
            order: (0..samples.len()).collect(),
            batch_size: batch_size.max(1),
            drop_last: false,
            cursor: 0,
        }
    }

    /// Batches over a seeded permutation of the corpus.
    pub fn shuffled(samples: &'a [Sample], batch_size: usize, seed: u64) -> Self {
        let mut batches = Self::sequential(samples, batch_size);
        shuffle(&mut batches.order, seed);
        batches
    }

    /// Skip a trailing batch shorter than `batch_size`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Total number of batches this iterator yields.
    pub fn num_batches(&self) -> usize {
        let full = self.order.len() / self.batch_size;
        if self.drop_last || self.order.len() % self.batch_size == 0 {
            full
        } else {
            full + 1
        }
    }
}

impl<'a> Iterator for Batches<'a> {
    type Item = Vec<&'a Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.order.len().saturating_sub(self.cursor);
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }
        let end = self.cursor + remaining.min(self.batch_size);
        let batch = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.samples[i])
            .collect();
        self.cursor = end;
        Some(batch)
    }
}

/// Seeded Fisher-Yates shuffle.
pub(crate) fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut rng = Rand32::new(seed);
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        items.swap(i, j);
    }
}
