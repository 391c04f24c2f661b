//! Train a text classifier from the command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use kotoba_core::data::CorpusFormat;
use kotoba_trainer::{RunOptions, TrainingConfig, run_training};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum Task {
    /// Four-class news topics, embedding-bag model
    AgNews,
    /// Binary review sentiment, LSTM model
    Imdb,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Jsonl,
    ImdbDir,
}

impl From<Format> for CorpusFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => CorpusFormat::Csv,
            Format::Jsonl => CorpusFormat::Jsonl,
            Format::ImdbDir => CorpusFormat::ImdbDir,
        }
    }
}

/// CLI arguments
#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train an embedding-bag or LSTM text classifier")]
#[command(version)]
struct Cli {
    /// Preset hyperparameters
    #[arg(short, long, value_enum, default_value = "ag-news")]
    task: Task,

    /// Training corpus (CSV, JSON Lines, or IMDB directory)
    #[arg(long)]
    train: PathBuf,

    /// Held-out test corpus
    #[arg(long)]
    test: Option<PathBuf>,

    /// Corpus format; detected from the path when omitted
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// JSON config file; overrides the preset
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for weights, vocabulary and summary
    #[arg(short, long, default_value = "models/kotoba")]
    out: PathBuf,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write scalar metrics as JSON Lines to this file; the final embedding
    /// table goes next to it as `<name>.embeddings.jsonl`
    #[arg(long)]
    scalars: Option<PathBuf>,

    /// Do not log the embedding table
    #[arg(long)]
    no_embeddings: bool,

    /// Pretrained tokenizer.json to use instead of the basic English splitter
    #[arg(long)]
    hf_tokenizer: Option<PathBuf>,
}

impl Cli {
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_file(path)?,
            None => match self.task {
                Task::AgNews => TrainingConfig::ag_news(),
                Task::Imdb => TrainingConfig::imdb(),
            },
        };
        if let Some(epochs) = self.epochs {
            config = config.with_epochs(epochs);
        }
        if let Some(lr) = self.lr {
            config = config.with_learning_rate(lr);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if self.no_embeddings {
            config = config.with_log_embeddings(false);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!("Training failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let options = RunOptions {
        config: cli.training_config()?,
        train_path: cli.train.clone(),
        test_path: cli.test.clone(),
        format: cli.format.map(CorpusFormat::from),
        out_dir: Some(cli.out.clone()),
        scalars_path: cli.scalars.clone(),
        hf_tokenizer: cli.hf_tokenizer.clone(),
    };

    let summary = run_training(&options)?;
    if let Some(test) = summary.test {
        info!("Final test accuracy: {:.3}", test.accuracy);
    }
    if let Some(best) = summary.best_valid_accuracy {
        info!("Best validation accuracy: {:.3}", best);
    }
    info!("Artifacts written to {}", cli.out.display());
    Ok(())
}
