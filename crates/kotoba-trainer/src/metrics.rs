//! Scalar and embedding metric sinks.
//!
//! The training loop reports named scalars (`train/accuracy`,
//! `valid/accuracy`, `lr`, ...) against a global step, and at the end of a
//! run the learned embedding table labelled with the vocabulary. Where they
//! end up is the sink's business: JSON Lines files that plotting and
//! projection tools can read, or memory for tests.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::ensure;
use serde::{Deserialize, Serialize};

fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// One logged scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: usize,
    /// Seconds since the Unix epoch when the value was recorded
    pub wall_time: f64,
}

impl ScalarRecord {
    pub fn now(tag: &str, value: f64, step: usize) -> Self {
        Self {
            tag: tag.to_string(),
            value,
            step,
            wall_time: wall_time(),
        }
    }
}

/// One logged embedding table: a row per item plus a label per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub tag: String,
    pub step: usize,
    pub wall_time: f64,
    /// Row labels, typically the vocabulary tokens in id order
    pub metadata: Vec<String>,
    pub rows: Vec<Vec<f32>>,
}

impl EmbeddingRecord {
    /// Fails when the number of labels does not match the number of rows.
    pub fn now(tag: &str, rows: &[Vec<f32>], metadata: &[String], step: usize) -> anyhow::Result<Self> {
        ensure!(
            rows.len() == metadata.len(),
            "embedding {:?} has {} rows but {} labels",
            tag,
            rows.len(),
            metadata.len()
        );
        Ok(Self {
            tag: tag.to_string(),
            step,
            wall_time: wall_time(),
            metadata: metadata.to_vec(),
            rows: rows.to_vec(),
        })
    }
}

/// Destination for training metrics.
pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> anyhow::Result<()>;

    /// Log an embedding table with one label per row. Ignored by default.
    fn add_embedding(
        &mut self,
        _tag: &str,
        _rows: &[Vec<f32>],
        _metadata: &[String],
        _step: usize,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per scalar to a file.
///
/// Embeddings go to a sibling file (see [`JsonlScalarSink::embedding_path`]),
/// created on the first logged table.
pub struct JsonlScalarSink {
    writer: BufWriter<File>,
    embedding_path: PathBuf,
    embeddings: Option<BufWriter<File>>,
}

impl JsonlScalarSink {
    /// Create (or truncate) the file, creating parent directories as needed.
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            embedding_path: Self::embedding_path(path),
            embeddings: None,
        })
    }

    /// Where embeddings for the scalar file at `path` are written:
    /// `scalars.jsonl` becomes `scalars.embeddings.jsonl`.
    pub fn embedding_path<P: AsRef<Path>>(path: P) -> PathBuf {
        path.as_ref().with_extension("embeddings.jsonl")
    }
}

impl ScalarSink for JsonlScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> anyhow::Result<()> {
        let record = ScalarRecord::now(tag, value, step);
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn add_embedding(
        &mut self,
        tag: &str,
        rows: &[Vec<f32>],
        metadata: &[String],
        step: usize,
    ) -> anyhow::Result<()> {
        let record = EmbeddingRecord::now(tag, rows, metadata, step)?;
        let writer = match &mut self.embeddings {
            Some(writer) => writer,
            None => self
                .embeddings
                .insert(BufWriter::new(File::create(&self.embedding_path)?)),
        };
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        if let Some(writer) = &mut self.embeddings {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for JsonlScalarSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ScalarSink for NullSink {
    fn add_scalar(&mut self, _tag: &str, _value: f64, _step: usize) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps every scalar and embedding in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<ScalarRecord>,
    pub embeddings: Vec<EmbeddingRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values logged under `tag`, in order.
    pub fn values(&self, tag: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| r.value)
            .collect()
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> anyhow::Result<()> {
        self.records.push(ScalarRecord::now(tag, value, step));
        Ok(())
    }

    fn add_embedding(
        &mut self,
        tag: &str,
        rows: &[Vec<f32>],
        metadata: &[String],
        step: usize,
    ) -> anyhow::Result<()> {
        self.embeddings.push(EmbeddingRecord::now(tag, rows, metadata, step)?);
        Ok(())
    }
}
