use thiserror::Error;

/// Errors that can occur while preparing text for classification.
#[derive(Debug, Error)]
pub enum KotobaError {
    /// Reading a corpus, vocabulary or tokenizer file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document (vocabulary file, JSON Lines record) could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    /// The external tokenizer model could not be loaded or applied.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// A raw label does not map onto the configured label rule.
    #[error("invalid label: {label:?}")]
    InvalidLabel {
        /// The offending label, as it appeared in the corpus.
        label: String,
    },

    /// Collation was asked to encode zero samples.
    #[error("cannot collate an empty batch")]
    EmptyBatch,

    /// A corpus record could not be parsed.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number in the source file.
        line: usize,
        /// What was wrong with the record.
        reason: String,
    },

    /// A vocabulary file does not describe a usable table.
    #[error("invalid vocabulary: {0}")]
    InvalidVocab(String),

    /// A corpus source produced no samples at all.
    #[error("corpus is empty: {0}")]
    EmptyCorpus(String),
}

/// Result type alias for Kotoba operations.
pub type Result<T> = std::result::Result<T, KotobaError>;
