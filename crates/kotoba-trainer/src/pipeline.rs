//! End-to-end run: load corpora, split, build the vocabulary, train, save.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use candle_core::Device;
use kotoba_core::data::{Collator, CorpusFormat, load_corpus, random_split};
use kotoba_core::text::{BasicEnglish, HfWordTokenizer, TextTokenizer, VocabBuilder};
use tracing::info;

use crate::config::TrainingConfig;
use crate::metrics::{JsonlScalarSink, NullSink, ScalarSink};
use crate::trainer::{Trainer, TrainingSummary};

pub const SUMMARY_FILE: &str = "summary.json";

/// Inputs and outputs of a training run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: TrainingConfig,
    pub train_path: PathBuf,
    pub test_path: Option<PathBuf>,
    /// Corpus layout; detected from the path when unset
    pub format: Option<CorpusFormat>,
    /// Where weights, vocabulary, config and summary are written
    pub out_dir: Option<PathBuf>,
    /// JSON Lines file receiving scalar metrics
    pub scalars_path: Option<PathBuf>,
    /// Pretrained `tokenizer.json` to use instead of the basic English splitter
    pub hf_tokenizer: Option<PathBuf>,
}

fn build_tokenizer(options: &RunOptions) -> anyhow::Result<Box<dyn TextTokenizer>> {
    Ok(match &options.hf_tokenizer {
        Some(path) => Box::new(HfWordTokenizer::from_file(path)?),
        None => Box::new(BasicEnglish::new()?),
    })
}

/// Run a full training session described by `options`.
pub fn run_training(options: &RunOptions) -> anyhow::Result<TrainingSummary> {
    let config = &options.config;
    config.validate()?;

    let corpus = load_corpus(&options.train_path, options.format)
        .with_context(|| format!("Failed to load training data from {}", options.train_path.display()))?;
    let test = options
        .test_path
        .as_ref()
        .map(|path| {
            load_corpus(path, options.format)
                .with_context(|| format!("Failed to load test data from {}", path.display()))
        })
        .transpose()?;

    let (train, valid) = random_split(corpus, config.valid_fraction, config.seed);
    info!("Split corpus: {} train / {} validation", train.len(), valid.len());

    let tokenizer = build_tokenizer(options)?;
    let mut builder = VocabBuilder::new().min_freq(config.min_freq);
    if let Some(max) = config.max_vocab {
        builder = builder.max_tokens(max);
    }
    for sample in &train {
        builder.feed(tokenizer.try_tokenize(&sample.text)?);
    }
    let vocab = builder.build();
    info!("Vocabulary size: {}", vocab.len());

    let collator = Collator::new(&tokenizer, &vocab, config.label_rule);
    let mut trainer = Trainer::new(config.clone(), &vocab, Device::Cpu)?;

    let mut sink: Box<dyn ScalarSink> = match &options.scalars_path {
        Some(path) => Box::new(JsonlScalarSink::create(path)?),
        None => Box::new(NullSink),
    };

    info!("Starting training for {} epochs...", config.epochs);
    let summary = trainer.fit(&collator, &train, &valid, test.as_deref(), sink.as_mut())?;

    if let Some(out_dir) = &options.out_dir {
        trainer.save(out_dir, &vocab)?;
        fs::write(out_dir.join(SUMMARY_FILE), serde_json::to_string_pretty(&summary)?)?;
    }

    Ok(summary)
}
