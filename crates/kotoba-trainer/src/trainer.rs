//! Training loop for the text classifiers.
//!
//! Per batch: forward, cross-entropy, backward, clip the global gradient
//! norm, SGD step. Per epoch: evaluate on the validation split and decay the
//! learning rate when accuracy stops improving. After the last epoch the
//! test split, if any, is scored once.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use candle_core::backprop::GradStore;
use candle_core::{D, DType, Device, Var};
use candle_nn::ops::softmax;
use candle_nn::{Optimizer, SGD, VarBuilder, VarMap};
use kotoba_core::data::{Batches, Collator, EncodedBatch, Sample};
use kotoba_core::text::{TextTokenizer, Vocab};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainingConfig;
use crate::metrics::ScalarSink;
use crate::model::{BatchTensors, Classifier, build_classifier, count_correct};

pub const MODEL_FILE: &str = "model.safetensors";
pub const VOCAB_FILE: &str = "vocab.json";
pub const CONFIG_FILE: &str = "config.json";

/// Accuracy and mean loss over a set of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub accuracy: f64,
    pub loss: f64,
    pub count: usize,
}

/// What happened during one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub valid: Option<EvalReport>,
    /// Learning rate the epoch was trained with
    pub learning_rate: f64,
    /// Whether the rate was decayed after this epoch
    pub lr_decayed: bool,
    pub elapsed_secs: f64,
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochRecord>,
    pub best_valid_accuracy: Option<f64>,
    pub test: Option<EvalReport>,
}

/// Class prediction for a single text.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class: u32,
    pub probabilities: Vec<f32>,
}

/// Learning-rate decay on validation plateaus.
///
/// The first observation always becomes the best. Each later observation
/// that does not exceed the best asks for a decay; one that does replaces it.
#[derive(Debug, Clone, Copy)]
pub struct PlateauDecay {
    gamma: f64,
    best: Option<f64>,
}

impl PlateauDecay {
    pub fn new(gamma: f64) -> Self {
        Self { gamma, best: None }
    }

    /// Record a validation accuracy; returns `true` if the rate should decay.
    pub fn observe(&mut self, accuracy: f64) -> bool {
        match self.best {
            Some(best) if accuracy <= best => true,
            _ => {
                self.best = Some(accuracy);
                false
            }
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn decayed(&self, learning_rate: f64) -> f64 {
        learning_rate * self.gamma
    }
}

/// Scale all gradients so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(vars: &[Var], grads: &mut GradStore, max_norm: f64) -> candle_core::Result<f64> {
    let mut squared = 0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = squared.sqrt();

    let coef = max_norm / (norm + 1e-6);
    if coef < 1.0 {
        for var in vars {
            if let Some(grad) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), grad.affine(coef, 0.0)?);
            }
        }
    }
    Ok(norm)
}

/// Owns the model parameters, the optimizer and the schedule.
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    varmap: VarMap,
    vars: Vec<Var>,
    model: Box<dyn Classifier>,
    optimizer: SGD,
    schedule: PlateauDecay,
    global_step: usize,
}

impl Trainer {
    /// Build a freshly initialized model sized for `vocab`.
    pub fn new(config: TrainingConfig, vocab: &Vocab, device: Device) -> anyhow::Result<Self> {
        config.validate()?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let pad_id = vocab.pad_id().unwrap_or_else(|| vocab.unk_id());
        let model = build_classifier(&config, vocab.len(), pad_id, vb)?;

        let vars = varmap.all_vars();
        let optimizer = SGD::new(vars.clone(), config.learning_rate)?;
        let schedule = PlateauDecay::new(config.lr_gamma);

        info!(
            "Initialized {:?} model: vocab {}, {} parameter tensors",
            config.model,
            vocab.len(),
            vars.len()
        );

        Ok(Self {
            config,
            device,
            varmap,
            vars,
            model,
            optimizer,
            schedule,
            global_step: 0,
        })
    }

    /// Restore a model written by [`Trainer::save`], along with its vocabulary.
    pub fn load<P: AsRef<Path>>(dir: P, device: Device) -> anyhow::Result<(Self, Vocab)> {
        let dir = dir.as_ref();
        let config = TrainingConfig::from_file(dir.join(CONFIG_FILE))?;
        let vocab = Vocab::load(dir.join(VOCAB_FILE))
            .with_context(|| format!("Failed to load vocabulary from {}", dir.display()))?;

        let mut trainer = Self::new(config, &vocab, device)?;
        trainer
            .varmap
            .load(dir.join(MODEL_FILE))
            .with_context(|| format!("Failed to load weights from {}", dir.display()))?;
        info!("Model loaded from {:?}", dir);
        Ok((trainer, vocab))
    }

    /// Write weights, vocabulary and config into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P, vocab: &Vocab) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.varmap.save(dir.join(MODEL_FILE))?;
        vocab.save(dir.join(VOCAB_FILE))?;
        self.config.save(dir.join(CONFIG_FILE))?;
        info!("Model saved to {:?}", dir);
        Ok(())
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Optimizer steps taken so far.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    fn tensors(&self, batch: &EncodedBatch) -> candle_core::Result<BatchTensors> {
        BatchTensors::new(batch, &self.device)
    }

    /// One optimizer step on one collated batch. Returns `(loss, correct)`.
    pub fn train_step(&mut self, batch: &EncodedBatch) -> anyhow::Result<(f64, usize)> {
        let tensors = self.tensors(batch)?;
        let logits = self.model.forward(&tensors)?;
        let loss = candle_nn::loss::cross_entropy(&logits, &tensors.labels)?;

        let mut grads = loss.backward()?;
        let norm = clip_grad_norm(&self.vars, &mut grads, self.config.clip_norm)?;
        self.optimizer.step(&grads)?;
        self.global_step += 1;

        let loss = loss.to_scalar::<f32>()? as f64;
        debug!(step = self.global_step, loss, grad_norm = norm, "train step");
        Ok((loss, count_correct(&logits, &tensors.labels)?))
    }

    /// One pass over `samples`. Returns `(mean loss, accuracy)`.
    pub fn train_epoch<T: TextTokenizer>(
        &mut self,
        epoch: usize,
        collator: &Collator<T>,
        samples: &[Sample],
        sink: &mut dyn ScalarSink,
    ) -> anyhow::Result<(f64, f64)> {
        let batches = if self.config.shuffle {
            Batches::shuffled(samples, self.config.batch_size, self.config.seed.wrapping_add(epoch as u64))
        } else {
            Batches::sequential(samples, self.config.batch_size)
        };
        let num_batches = batches.num_batches();

        let (mut loss_sum, mut correct, mut total) = (0f64, 0usize, 0usize);
        let (mut interval_correct, mut interval_total) = (0usize, 0usize);

        for (index, batch) in batches.enumerate() {
            let encoded = collator.collate(&batch)?;
            let (loss, hits) = self.train_step(&encoded)?;

            loss_sum += loss * encoded.len() as f64;
            correct += hits;
            total += encoded.len();
            interval_correct += hits;
            interval_total += encoded.len();

            if self.config.log_interval > 0 && (index + 1) % self.config.log_interval == 0 {
                let accuracy = interval_correct as f64 / interval_total.max(1) as f64;
                info!(
                    "| epoch {:3} | {:5}/{:5} batches | accuracy {:8.3}",
                    epoch,
                    index + 1,
                    num_batches,
                    accuracy
                );
                sink.add_scalar("train/accuracy", accuracy, self.global_step)?;
                sink.add_scalar("train/loss", loss, self.global_step)?;
                interval_correct = 0;
                interval_total = 0;
            }
        }

        let total = total.max(1) as f64;
        Ok((loss_sum / total, correct as f64 / total))
    }

    /// Score `samples` without touching the parameters.
    pub fn evaluate<T: TextTokenizer>(
        &self,
        collator: &Collator<T>,
        samples: &[Sample],
    ) -> anyhow::Result<EvalReport> {
        let (mut loss_sum, mut correct, mut count) = (0f64, 0usize, 0usize);

        for batch in Batches::sequential(samples, self.config.batch_size) {
            let encoded = collator.collate(&batch)?;
            let tensors = self.tensors(&encoded)?;
            let logits = self.model.forward(&tensors)?;
            let loss = candle_nn::loss::cross_entropy(&logits, &tensors.labels)?;

            loss_sum += loss.to_scalar::<f32>()? as f64 * encoded.len() as f64;
            correct += count_correct(&logits, &tensors.labels)?;
            count += encoded.len();
        }

        if count == 0 {
            return Ok(EvalReport::default());
        }
        Ok(EvalReport {
            accuracy: correct as f64 / count as f64,
            loss: loss_sum / count as f64,
            count,
        })
    }

    /// Train for `config.epochs` epochs, then score the test split and, if
    /// enabled, log the embedding table labelled by vocabulary token.
    pub fn fit<T: TextTokenizer>(
        &mut self,
        collator: &Collator<T>,
        train: &[Sample],
        valid: &[Sample],
        test: Option<&[Sample]>,
        sink: &mut dyn ScalarSink,
    ) -> anyhow::Result<TrainingSummary> {
        if valid.is_empty() {
            warn!("No validation samples; learning rate will not be decayed");
        }

        let mut summary = TrainingSummary::default();
        for epoch in 1..=self.config.epochs {
            let started = Instant::now();
            let learning_rate = self.learning_rate();
            let (train_loss, train_accuracy) = self.train_epoch(epoch, collator, train, sink)?;

            let valid_report = if valid.is_empty() {
                None
            } else {
                Some(self.evaluate(collator, valid)?)
            };

            let mut lr_decayed = false;
            if let Some(report) = &valid_report {
                if self.schedule.observe(report.accuracy) {
                    let decayed = self.schedule.decayed(learning_rate);
                    self.optimizer.set_learning_rate(decayed);
                    lr_decayed = true;
                }
                sink.add_scalar("valid/accuracy", report.accuracy, self.global_step)?;
                sink.add_scalar("valid/loss", report.loss, self.global_step)?;
            }
            sink.add_scalar("lr", learning_rate, self.global_step)?;

            let elapsed_secs = started.elapsed().as_secs_f64();
            info!(
                "| end of epoch {:3} | time: {:5.2}s | train accuracy {:8.3} | valid accuracy {:8.3} | lr {}",
                epoch,
                elapsed_secs,
                train_accuracy,
                valid_report.map_or(f64::NAN, |r| r.accuracy),
                learning_rate
            );
            if lr_decayed {
                info!("Validation accuracy did not improve; lr -> {}", self.learning_rate());
            }

            summary.epochs.push(EpochRecord {
                epoch,
                train_loss,
                train_accuracy,
                valid: valid_report,
                learning_rate,
                lr_decayed,
                elapsed_secs,
            });
        }
        summary.best_valid_accuracy = self.schedule.best();

        if let Some(test) = test {
            let report = self.evaluate(collator, test)?;
            info!("Test accuracy {:8.3} over {} samples", report.accuracy, report.count);
            sink.add_scalar("test/accuracy", report.accuracy, self.global_step)?;
            summary.test = Some(report);
        }

        if self.config.log_embeddings {
            let rows = self.model.embedding_weight().to_vec2::<f32>()?;
            sink.add_embedding("embedding", &rows, collator.vocab().tokens(), self.global_step)?;
            debug!("Logged {} embedding rows", rows.len());
        }
        sink.flush()?;

        Ok(summary)
    }

    /// Classify one text.
    pub fn predict<T: TextTokenizer>(&self, collator: &Collator<T>, text: &str) -> anyhow::Result<Prediction> {
        let batch = EncodedBatch {
            labels: vec![0],
            token_ids: collator.encode_text(text)?,
            offsets: vec![0],
        };
        let logits = self.model.forward(&self.tensors(&batch)?)?;
        let probabilities = softmax(&logits, D::Minus1)?.squeeze(0)?.to_vec1::<f32>()?;
        let class = logits.argmax(D::Minus1)?.squeeze(0)?.to_scalar::<u32>()?;
        Ok(Prediction {
            class,
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plateau_decay() {
        let mut schedule = PlateauDecay::new(0.1);
        assert!(!schedule.observe(0.5));
        assert!(!schedule.observe(0.6));
        assert!(schedule.observe(0.6));
        assert!(schedule.observe(0.55));
        assert!(!schedule.observe(0.7));
        assert_eq!(schedule.best(), Some(0.7));
        assert!((schedule.decayed(5.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_clip_grad_norm_bounds_norm() {
        let var = Var::new(&[3f32, 4.0], &Device::Cpu).unwrap();
        let loss = (var.as_tensor() * 10.0).unwrap().sum_all().unwrap();
        let mut grads = loss.backward().unwrap();

        let vars = vec![var.clone()];
        let norm = clip_grad_norm(&vars, &mut grads, 0.1).unwrap();
        assert!((norm - 200f64.sqrt()).abs() < 1e-4);

        let clipped = grads.get(var.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        let clipped_norm = clipped.iter().map(|g| g * g).sum::<f32>().sqrt();
        assert!(clipped_norm <= 0.1 + 1e-5);
    }

    #[test]
    fn test_clip_grad_norm_leaves_small_gradients() {
        let var = Var::new(&[1f32, 1.0], &Device::Cpu).unwrap();
        let loss = (var.as_tensor() * 0.01).unwrap().sum_all().unwrap();
        let mut grads = loss.backward().unwrap();
        clip_grad_norm(&[var.clone()], &mut grads, 1.0).unwrap();
        let grad = grads.get(var.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert!((grad[0] - 0.01).abs() < 1e-7);
    }
}
