//! # Vocabulary
//!
//! Frequency-based token → id table built once from a training corpus.
//! Special tokens occupy the lowest ids; the first special doubles as the
//! id returned for every out-of-vocabulary token.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::Sample;
use crate::error::{KotobaError, Result};
use crate::text::TextTokenizer;

/// Token substituted for anything not in the vocabulary.
pub const UNK_TOKEN: &str = "<unk>";

/// Token reserved for padding by recurrent consumers.
pub const PAD_TOKEN: &str = "<pad>";

/// Specials inserted when the builder is not told otherwise.
pub const DEFAULT_SPECIALS: &[&str] = &[UNK_TOKEN, PAD_TOKEN];

/// Occurrence count plus the position of the first sighting, for tie-breaking.
#[derive(Debug, Clone, Copy)]
struct TokenStats {
    count: usize,
    first_seen: usize,
}

/// Accumulates token counts and freezes them into a [`Vocab`].
#[derive(Debug, Clone)]
pub struct VocabBuilder {
    counts: HashMap<String, TokenStats>,
    seen: usize,
    min_freq: usize,
    max_tokens: Option<usize>,
    specials: Vec<String>,
}

impl Default for VocabBuilder {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
            seen: 0,
            min_freq: 1,
            max_tokens: None,
            specials: DEFAULT_SPECIALS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl VocabBuilder {
    /// Create a builder with `min_freq = 1` and the default specials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum number of occurrences a token needs to receive an id.
    pub fn min_freq(mut self, min_freq: usize) -> Self {
        self.min_freq = min_freq.max(1);
        self
    }

    /// Upper bound on the vocabulary size, specials included.
    ///
    /// Specials are never dropped: a cap below their count yields a
    /// vocabulary of exactly the specials.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Replace the special tokens. An empty list falls back to `<unk>` alone.
    pub fn specials<S: AsRef<str>>(mut self, specials: &[S]) -> Self {
        self.specials = specials.iter().map(|s| s.as_ref().to_string()).collect();
        if self.specials.is_empty() {
            self.specials.push(UNK_TOKEN.to_string());
        }
        self
    }

    /// Count one tokenized text.
    pub fn feed<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            let token = token.as_ref();
            match self.counts.get_mut(token) {
                Some(stats) => stats.count += 1,
                None => {
                    self.counts.insert(
                        token.to_string(),
                        TokenStats {
                            count: 1,
                            first_seen: self.seen,
                        },
                    );
                    self.seen += 1;
                }
            }
        }
    }

    /// Freeze the counts into an immutable vocabulary.
    ///
    /// Ids after the specials are assigned by descending frequency, ties
    /// broken by first-encounter order.
    pub fn build(self) -> Vocab {
        let mut ranked: Vec<(String, TokenStats)> = self
            .counts
            .into_iter()
            .filter(|(token, stats)| stats.count >= self.min_freq && !self.specials.contains(token))
            .collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });

        if let Some(max) = self.max_tokens.filter(|&max| max < self.specials.len()) {
            warn!(
                "max_tokens {} is below the {} specials; keeping specials only",
                max,
                self.specials.len()
            );
        }
        let budget = self
            .max_tokens
            .map(|max| max.saturating_sub(self.specials.len()))
            .unwrap_or(ranked.len());

        let tokens: Vec<String> = self
            .specials
            .iter()
            .cloned()
            .chain(ranked.into_iter().take(budget).map(|(token, _)| token))
            .collect();

        debug!(
            "built vocabulary: {} tokens ({} specials, min_freq {})",
            tokens.len(),
            self.specials.len(),
            self.min_freq
        );
        Vocab::from_parts(tokens, self.specials.len())
    }
}

/// On-disk representation of a vocabulary.
#[derive(Debug, Serialize, Deserialize)]
struct VocabFile {
    tokens: Vec<String>,
    num_specials: usize,
}

/// Immutable token ↔ id mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocab {
    index: HashMap<String, u32>,
    tokens: Vec<String>,
    num_specials: usize,
}

impl Vocab {
    fn from_parts(tokens: Vec<String>, num_specials: usize) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();
        Self {
            index,
            tokens,
            num_specials,
        }
    }

    /// Build from an iterator of tokenized texts with the default specials.
    pub fn build_from_iterator<I, T, S>(texts: I, min_freq: usize) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = VocabBuilder::new().min_freq(min_freq);
        for tokens in texts {
            builder.feed(tokens);
        }
        builder.build()
    }

    /// Tokenize every sample's text and build a vocabulary from the result.
    pub fn from_samples<T: TextTokenizer>(tokenizer: &T, samples: &[Sample], min_freq: usize) -> Self {
        Self::build_from_iterator(
            samples.iter().map(|sample| tokenizer.tokenize(&sample.text)),
            min_freq,
        )
    }

    /// Id of `token`, or [`Vocab::unk_id`] if it was never assigned one.
    pub fn lookup(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or_else(|| self.unk_id())
    }

    /// Map a token sequence to ids.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        tokens.iter().map(|t| self.lookup(t.as_ref())).collect()
    }

    /// Token string for `id`.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Every token, indexed by id.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether `token` has its own id.
    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Id every unknown token resolves to (the first special).
    pub fn unk_id(&self) -> u32 {
        0
    }

    /// Id of the padding token, if it is one of the specials.
    pub fn pad_id(&self) -> Option<u32> {
        self.index
            .get(PAD_TOKEN)
            .copied()
            .filter(|&id| (id as usize) < self.num_specials)
    }

    /// Number of ids, specials included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Write the vocabulary as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = VocabFile {
            tokens: self.tokens.clone(),
            num_specials: self.num_specials,
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Read a vocabulary written by [`Vocab::save`].
    ///
    /// # Errors
    /// [`KotobaError::InvalidVocab`] when the file has no specials, claims
    /// more specials than tokens, or repeats a token.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let file: VocabFile = serde_json::from_str(&content)?;
        if file.num_specials == 0 {
            return Err(KotobaError::InvalidVocab(
                "at least one special (the unknown token) is required".to_string(),
            ));
        }
        if file.num_specials > file.tokens.len() {
            return Err(KotobaError::InvalidVocab(format!(
                "{} specials declared but only {} tokens present",
                file.num_specials,
                file.tokens.len()
            )));
        }
        let vocab = Self::from_parts(file.tokens, file.num_specials);
        if vocab.index.len() != vocab.tokens.len() {
            return Err(KotobaError::InvalidVocab("duplicate tokens".to_string()));
        }
        Ok(vocab)
    }
}
