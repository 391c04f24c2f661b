//! # Samples and Label Rules
//!
//! A corpus is a list of `(label, text)` pairs. Labels arrive in whatever
//! shape the source uses and are decoded into dense class ids by a
//! [`LabelRule`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KotobaError, Result};

/// A label as it appears in the source corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLabel {
    /// Numeric class (AG News uses 1..=4).
    Class(i64),
    /// Textual tag such as `"pos"` or `"neg"`.
    Tag(String),
}

impl fmt::Display for RawLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawLabel::Class(c) => write!(f, "{}", c),
            RawLabel::Tag(t) => write!(f, "{}", t),
        }
    }
}

/// One labelled text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub label: RawLabel,
    pub text: String,
}

impl Sample {
    pub fn new(label: RawLabel, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
        }
    }

    /// Sample with a textual label.
    pub fn tagged(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(RawLabel::Tag(tag.into()), text)
    }

    /// Sample with a numeric label.
    pub fn class(class: i64, text: impl Into<String>) -> Self {
        Self::new(RawLabel::Class(class), text)
    }
}

/// How raw labels are decoded into class ids in `[0, num_classes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelRule {
    /// Binary sentiment: `neg`/`negative` → 0, `pos`/`positive` → 1.
    /// Numeric 0 and 1 pass through unchanged.
    Sentiment,
    /// 1-indexed topic classes shifted down by one.
    Topic { num_classes: usize },
}

impl LabelRule {
    /// Number of distinct class ids this rule produces.
    pub fn num_classes(&self) -> usize {
        match self {
            LabelRule::Sentiment => 2,
            LabelRule::Topic { num_classes } => *num_classes,
        }
    }

    /// Decode a raw label.
    ///
    /// # Examples
    /// ```
    /// use kotoba_core::data::{LabelRule, RawLabel};
    ///
    /// let topic = LabelRule::Topic { num_classes: 4 };
    /// assert_eq!(topic.apply(&RawLabel::Class(1)).unwrap(), 0);
    /// assert_eq!(topic.apply(&RawLabel::Class(4)).unwrap(), 3);
    /// assert!(topic.apply(&RawLabel::Class(5)).is_err());
    /// ```
    pub fn apply(&self, label: &RawLabel) -> Result<u32> {
        let invalid = || KotobaError::InvalidLabel {
            label: label.to_string(),
        };

        match self {
            LabelRule::Sentiment => match label {
                RawLabel::Class(c @ (0 | 1)) => Ok(*c as u32),
                RawLabel::Class(_) => Err(invalid()),
                RawLabel::Tag(tag) => match tag.trim().to_ascii_lowercase().as_str() {
                    "neg" | "negative" => Ok(0),
                    "pos" | "positive" => Ok(1),
                    _ => Err(invalid()),
                },
            },
            LabelRule::Topic { num_classes } => {
                let class = match label {
                    RawLabel::Class(c) => *c,
                    RawLabel::Tag(tag) => tag.trim().parse::<i64>().map_err(|_| invalid())?,
                };
                if class < 1 || class as usize > *num_classes {
                    return Err(invalid());
                }
                Ok((class - 1) as u32)
            }
        }
    }
}
