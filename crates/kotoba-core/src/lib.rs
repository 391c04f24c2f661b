//! # Kotoba Core
//!
//! Text preparation for small classifiers: tokenization, frequency-based
//! vocabularies, corpus loading and the collation step that packs
//! variable-length token sequences into a flat buffer plus offsets.
//!
//! ## Quick Start
//!
//! ```rust
//! use kotoba_core::data::{Collator, LabelRule, Sample};
//! use kotoba_core::text::{BasicEnglish, Vocab};
//!
//! let tokenizer = BasicEnglish::new().unwrap();
//! let samples = vec![Sample::tagged("neg", "bad film"), Sample::tagged("pos", "great film")];
//! let vocab = Vocab::from_samples(&tokenizer, &samples, 1);
//!
//! let collator = Collator::new(&tokenizer, &vocab, LabelRule::Sentiment);
//! let batch = collator.collate(&samples).unwrap();
//!
//! assert_eq!(batch.labels, vec![0, 1]);
//! assert_eq!(batch.token_ids.len(), 4);
//! assert_eq!(batch.offsets, vec![0, 2]);
//! ```
pub mod data;
pub mod error;
pub mod text;

// Re-export primary API
pub use data::{
    Batches, Collator, EncodedBatch, LabelRule, RawLabel, Sample, load_ag_news_csv,
    load_imdb_dir, load_jsonl, random_split,
};
pub use error::{KotobaError, Result};
pub use text::{BasicEnglish, HfWordTokenizer, TextTokenizer, Vocab, VocabBuilder};
