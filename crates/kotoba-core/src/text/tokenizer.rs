//! # Word Tokenizers
//!
//! Splits raw text into word tokens before vocabulary lookup.
//! [`BasicEnglish`] is a rule-based lowercasing splitter; [`HfWordTokenizer`]
//! delegates to a pretrained Hugging Face `tokenizer.json`.

use std::path::Path;

use regex::Regex;
use tokenizers::Tokenizer as HfTokenizer;
use tracing::warn;

use crate::error::{KotobaError, Result};
use crate::text::vocab::UNK_TOKEN;

/// Anything that can turn a string into a sequence of word tokens.
pub trait TextTokenizer {
    /// Split `text` into tokens. Never fails; unusable input yields no tokens.
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Like [`TextTokenizer::tokenize`], but reports input the tokenizer
    /// cannot handle instead of dropping it. Collation goes through this.
    fn try_tokenize(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.tokenize(text))
    }
}

/// Rewrite rules applied in order after lowercasing.
const BASIC_ENGLISH_RULES: &[(&str, &str)] = &[
    (r"'", " '  "),
    (r#"""#, ""),
    (r"\.", " . "),
    (r"<br />", " "),
    (r",", " , "),
    (r"\(", " ( "),
    (r"\)", " ) "),
    (r"!", " ! "),
    (r"\?", " ? "),
    (r";", " "),
    (r":", " "),
    (r"\s+", " "),
];

/// Lowercasing tokenizer that isolates common punctuation.
#[derive(Debug, Clone)]
pub struct BasicEnglish {
    rules: Vec<(Regex, &'static str)>,
}

impl BasicEnglish {
    /// Create a new tokenizer, compiling the rewrite rules.
    pub fn new() -> Result<Self> {
        let rules = BASIC_ENGLISH_RULES
            .iter()
            .map(|&(pattern, replacement)| Ok((Regex::new(pattern)?, replacement)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl TextTokenizer for BasicEnglish {
    /// # Examples
    /// ```
    /// use kotoba_core::text::{BasicEnglish, TextTokenizer};
    ///
    /// let tokenizer = BasicEnglish::new().unwrap();
    /// let tokens = tokenizer.tokenize("Wall St. Bears Claw Back (Reuters)");
    /// assert_eq!(tokens, ["wall", "st", ".", "bears", "claw", "back", "(", "reuters", ")"]);
    /// ```
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut line = text.to_lowercase();
        for (pattern, replacement) in &self.rules {
            line = pattern.replace_all(&line, *replacement).into_owned();
        }
        line.split_whitespace().map(str::to_string).collect()
    }
}

/// Adapter over a pretrained Hugging Face tokenizer model.
///
/// Produces the string form of each subword so the result can feed a
/// [`Vocab`](crate::text::Vocab) built from the same tokenizer. The model's
/// own unknown token is reported as [`UNK_TOKEN`], so words the model does
/// not know share the vocabulary's unknown id.
pub struct HfWordTokenizer {
    inner: HfTokenizer,
    unk_token: Option<String>,
}

impl HfWordTokenizer {
    /// Load a `tokenizer.json` model file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KotobaError::Tokenizer(format!(
                "Tokenizer not found at {}",
                path.display()
            )));
        }
        let inner = HfTokenizer::from_file(path).map_err(|e| KotobaError::Tokenizer(e.to_string()))?;
        Ok(Self::from_tokenizer(inner))
    }

    /// Wrap an already constructed tokenizer.
    pub fn from_tokenizer(inner: HfTokenizer) -> Self {
        let unk_token = model_unk_token(&inner);
        Self { inner, unk_token }
    }

    /// The wrapped model's unknown token, if it has one.
    pub fn unk_token(&self) -> Option<&str> {
        self.unk_token.as_deref()
    }

    fn normalize(&self, tokens: &[String]) -> Vec<String> {
        tokens
            .iter()
            .map(|token| match &self.unk_token {
                Some(unk) if token == unk => UNK_TOKEN.to_string(),
                _ => token.clone(),
            })
            .collect()
    }
}

/// Read the unknown token from the model's serialized form.
///
/// WordLevel, WordPiece and BPE store it as `unk_token`; Unigram stores an
/// index into its `[piece, score]` vocabulary.
fn model_unk_token(inner: &HfTokenizer) -> Option<String> {
    let model = serde_json::to_value(inner.get_model()).ok()?;
    if let Some(unk) = model.get("unk_token").and_then(|v| v.as_str()) {
        return Some(unk.to_string());
    }
    let unk_id = model.get("unk_id")?.as_u64()? as usize;
    model
        .get("vocab")?
        .get(unk_id)?
        .get(0)?
        .as_str()
        .map(str::to_string)
}

impl TextTokenizer for HfWordTokenizer {
    /// Infallible form: encoding failures are logged and yield no tokens.
    fn tokenize(&self, text: &str) -> Vec<String> {
        self.try_tokenize(text).unwrap_or_else(|e| {
            warn!("tokenizer failed on input of {} bytes: {}", text.len(), e);
            Vec::new()
        })
    }

    fn try_tokenize(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| KotobaError::Tokenizer(e.to_string()))?;
        Ok(self.normalize(encoding.get_tokens()))
    }
}

impl<T: TextTokenizer + ?Sized> TextTokenizer for &T {
    fn tokenize(&self, text: &str) -> Vec<String> {
        (**self).tokenize(text)
    }

    fn try_tokenize(&self, text: &str) -> Result<Vec<String>> {
        (**self).try_tokenize(text)
    }
}

impl<T: TextTokenizer + ?Sized> TextTokenizer for Box<T> {
    fn tokenize(&self, text: &str) -> Vec<String> {
        (**self).tokenize(text)
    }

    fn try_tokenize(&self, text: &str) -> Result<Vec<String>> {
        (**self).try_tokenize(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic() -> BasicEnglish {
        BasicEnglish::new().unwrap()
    }

    #[test]
    fn test_tokenize_basic() {
        let tokens = basic().tokenize("bad film");
        assert_eq!(tokens, vec!["bad", "film"]);
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        let tokens = basic().tokenize("Great, GREAT movie!Really?");
        assert_eq!(
            tokens,
            vec!["great", ",", "great", "movie", "!", "really", "?"]
        );
    }

    #[test]
    fn test_tokenize_apostrophe_and_quotes() {
        let tokens = basic().tokenize("It's \"fine\"");
        assert_eq!(tokens, vec!["it", "'", "s", "fine"]);
    }

    #[test]
    fn test_tokenize_drops_line_breaks_and_colons() {
        let tokens = basic().tokenize("one<br />two; three: four");
        assert_eq!(tokens, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(basic().tokenize("").is_empty());
        assert!(basic().tokenize("   \t\n").is_empty());
    }

    #[test]
    fn test_tokenizer_by_reference() {
        let tokenizer = basic();
        let by_ref: &dyn TextTokenizer = &tokenizer;
        assert_eq!(by_ref.tokenize("A b"), vec!["a", "b"]);
    }

    #[test]
    fn test_hf_missing_file() {
        let err = HfWordTokenizer::from_file("definitely/not/here/tokenizer.json");
        assert!(matches!(err, Err(KotobaError::Tokenizer(_))));
    }

    /// Lowercasing whitespace WordLevel model over `vocab`.
    fn word_level_json(vocab: &str) -> String {
        format!(
            r#"{{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": {{"type": "Lowercase"}},
  "pre_tokenizer": {{"type": "Whitespace"}},
  "post_processor": null,
  "decoder": null,
  "model": {{"type": "WordLevel", "vocab": {}, "unk_token": "[UNK]"}}
}}"#,
            vocab
        )
    }

    fn write_word_level(name: &str, vocab: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("kotoba-hf-{}-{}.json", std::process::id(), name));
        std::fs::write(&path, word_level_json(vocab)).unwrap();
        path
    }

    #[test]
    fn test_hf_word_level_tokens() {
        let path = write_word_level("tokens", r#"{"[UNK]": 0, "bad": 1, "film": 2, ",": 3}"#);
        let tokenizer = HfWordTokenizer::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(tokenizer.unk_token(), Some("[UNK]"));
        assert_eq!(tokenizer.tokenize("Bad film, bad"), vec!["bad", "film", ",", "bad"]);
        assert!(tokenizer.tokenize("").is_empty());
    }

    #[test]
    fn test_hf_unknown_words_become_unk() {
        let path = write_word_level("unk", r#"{"[UNK]": 0, "bad": 1, "film": 2}"#);
        let tokenizer = HfWordTokenizer::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            tokenizer.tokenize("Bad film, great"),
            vec!["bad", "film", UNK_TOKEN, UNK_TOKEN]
        );
    }

    #[test]
    fn test_hf_encode_failure_is_reported() {
        // The unknown token is declared but missing from the vocabulary, so
        // any out-of-vocabulary word makes the model fail.
        let path = write_word_level("broken", r#"{"bad": 0, "film": 1}"#);
        let tokenizer = HfWordTokenizer::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(tokenizer.try_tokenize("bad film").unwrap(), vec!["bad", "film"]);
        assert!(matches!(
            tokenizer.try_tokenize("great film"),
            Err(KotobaError::Tokenizer(_))
        ));
        assert!(tokenizer.tokenize("great film").is_empty());

        let boxed: Box<dyn TextTokenizer> = Box::new(tokenizer);
        assert!(boxed.try_tokenize("great film").is_err());
    }
}
