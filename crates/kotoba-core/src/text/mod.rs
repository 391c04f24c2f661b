pub mod tokenizer;
pub mod vocab;

pub use tokenizer::{BasicEnglish, HfWordTokenizer, TextTokenizer};
pub use vocab::{DEFAULT_SPECIALS, PAD_TOKEN, UNK_TOKEN, Vocab, VocabBuilder};
