use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use kotoba_core::data::{Collator, LabelRule, Sample, random_split};
use kotoba_core::text::{BasicEnglish, TextTokenizer, Vocab};
use kotoba_trainer::{
    BatchTensors, MemorySink, ModelKind, NullSink, TextClassificationModel, Trainer, TrainingConfig,
};

fn sentiment_corpus() -> Vec<Sample> {
    let positive = ["great film", "wonderful acting", "great story", "loved it", "wonderful film"];
    let negative = ["bad film", "awful acting", "bad story", "hated it", "awful film"];
    let mut samples = Vec::new();
    for round in 0..6 {
        for (p, n) in positive.iter().zip(negative.iter()) {
            samples.push(Sample::tagged("pos", format!("{} {}", p, "x".repeat(round % 2 + 1))));
            samples.push(Sample::tagged("neg", format!("{} {}", n, "x".repeat(round % 2 + 1))));
        }
    }
    samples
}

fn small_config() -> TrainingConfig {
    let mut config = TrainingConfig::ag_news()
        .with_dims(16, 16)
        .with_batch_size(4)
        .with_epochs(20)
        .with_learning_rate(1.0)
        .with_clip_norm(1.0)
        .with_log_interval(5)
        .with_valid_fraction(0.0)
        .with_seed(3);
    config.label_rule = LabelRule::Sentiment;
    config
}

#[test]
fn embedding_bag_learns_separable_corpus() {
    let tokenizer = BasicEnglish::new().unwrap();
    let samples = sentiment_corpus();
    let vocab = Vocab::from_samples(&tokenizer, &samples, 1);
    let collator = Collator::new(&tokenizer, &vocab, LabelRule::Sentiment);

    let mut trainer = Trainer::new(small_config(), &vocab, Device::Cpu).unwrap();
    let mut sink = MemorySink::new();
    let summary = trainer
        .fit(&collator, &samples, &[], Some(samples.as_slice()), &mut sink)
        .unwrap();

    assert_eq!(summary.epochs.len(), 20);
    assert!(summary.epochs.iter().all(|e| e.valid.is_none() && !e.lr_decayed));
    assert_eq!(summary.best_valid_accuracy, None);
    let test = summary.test.unwrap();
    assert_eq!(test.count, samples.len());
    assert!(test.accuracy >= 0.9, "accuracy {}", test.accuracy);

    // 60 samples / batch 4 = 15 steps per epoch
    assert_eq!(trainer.global_step(), 15 * 20);
    assert_eq!(sink.values("train/accuracy").len(), 3 * 20);
    assert_eq!(sink.values("test/accuracy").len(), 1);

    assert_eq!(sink.embeddings.len(), 1);
    let table = &sink.embeddings[0];
    assert_eq!(table.tag, "embedding");
    assert_eq!(table.step, trainer.global_step());
    assert_eq!(table.metadata, vocab.tokens());
    assert_eq!(table.rows.len(), vocab.len());
    assert!(table.rows.iter().all(|row| row.len() == 16));

    let prediction = trainer.predict(&collator, "great great film").unwrap();
    assert_eq!(prediction.class, 1);
    assert_eq!(prediction.probabilities.len(), 2);
    assert!((prediction.probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-4);
}

#[test]
fn learning_rate_decays_only_on_plateau() {
    let tokenizer = BasicEnglish::new().unwrap();
    let (train, valid) = random_split(sentiment_corpus(), 0.2, 11);
    let vocab = Vocab::from_samples(&tokenizer, &train, 1);
    let collator = Collator::new(&tokenizer, &vocab, LabelRule::Sentiment);

    let config = small_config().with_epochs(6).with_lr_gamma(0.5);
    let mut trainer = Trainer::new(config, &vocab, Device::Cpu).unwrap();
    let summary = trainer.fit(&collator, &train, &valid, None, &mut NullSink).unwrap();

    let mut best: Option<f64> = None;
    let mut expected_lr = 1.0;
    for record in &summary.epochs {
        assert!((record.learning_rate - expected_lr).abs() < 1e-12);
        let accuracy = record.valid.unwrap().accuracy;
        let should_decay = best.is_some_and(|b| accuracy <= b);
        assert_eq!(record.lr_decayed, should_decay, "epoch {}", record.epoch);
        if should_decay {
            expected_lr *= 0.5;
        } else {
            best = Some(accuracy);
        }
    }
    assert_eq!(summary.best_valid_accuracy, best);
    assert!((trainer.learning_rate() - expected_lr).abs() < 1e-12);
    assert!(summary.test.is_none());
}

#[test]
fn single_token_sample_aggregates_to_its_embedding() {
    let tokenizer = BasicEnglish::new().unwrap();
    let samples = vec![Sample::tagged("pos", "great"), Sample::tagged("neg", "bad film")];
    let vocab = Vocab::from_samples(&tokenizer, &samples, 1);
    let collator = Collator::new(&tokenizer, &vocab, LabelRule::Sentiment);

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = TextClassificationModel::new(vocab.len(), 8, 8, 2, 0.5, vb).unwrap();

    let batch = collator.collate(&samples[..1]).unwrap();
    assert_eq!(batch.token_ids, vec![vocab.lookup("great")]);
    let tensors = BatchTensors::new(&batch, &Device::Cpu).unwrap();

    let pooled = model.embedding().forward(&tensors).unwrap().to_vec2::<f32>().unwrap();
    let raw = model
        .embedding()
        .weight()
        .get(vocab.lookup("great") as usize)
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    assert_eq!(pooled, vec![raw]);
}

#[test]
fn lstm_trains_and_evaluates() {
    let tokenizer = BasicEnglish::new().unwrap();
    let samples = sentiment_corpus();
    let vocab = Vocab::from_samples(&tokenizer, &samples, 1);
    let collator = Collator::new(&tokenizer, &vocab, LabelRule::Sentiment);

    let config = small_config().with_model(ModelKind::Lstm).with_epochs(2);
    let mut trainer = Trainer::new(config, &vocab, Device::Cpu).unwrap();
    let mut sink = MemorySink::new();
    let summary = trainer
        .fit(&collator, &samples, &samples[..10], Some(&samples[..10]), &mut sink)
        .unwrap();

    assert_eq!(summary.epochs.len(), 2);
    assert_eq!(sink.embeddings.len(), 1);
    assert_eq!(sink.embeddings[0].metadata[0], "<unk>");
    assert!(sink.embeddings[0].rows.iter().all(|row| row.len() == 16));
    let report = summary.test.unwrap();
    assert_eq!(report.count, 10);
    assert!(report.loss.is_finite());
    assert!((0.0..=1.0).contains(&report.accuracy));
}

#[test]
fn checkpoint_round_trip_preserves_predictions() {
    let tokenizer = BasicEnglish::new().unwrap();
    let samples = sentiment_corpus();
    let vocab = Vocab::from_samples(&tokenizer, &samples, 1);
    let collator = Collator::new(&tokenizer, &vocab, LabelRule::Sentiment);

    let config = small_config().with_epochs(2).with_log_embeddings(false);
    let mut trainer = Trainer::new(config, &vocab, Device::Cpu).unwrap();
    let mut sink = MemorySink::new();
    trainer.fit(&collator, &samples, &[], None, &mut sink).unwrap();
    assert!(sink.embeddings.is_empty());

    let dir = std::env::temp_dir().join(format!("kotoba-checkpoint-{}", std::process::id()));
    trainer.save(&dir, &vocab).unwrap();
    let (restored, restored_vocab) = Trainer::load(&dir, Device::Cpu).unwrap();
    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(restored_vocab, vocab);
    assert_eq!(restored.config(), trainer.config());

    let restored_collator = Collator::new(&tokenizer, &restored_vocab, LabelRule::Sentiment);
    for text in ["great film", "awful story", "never seen words"] {
        let before = trainer.predict(&collator, text).unwrap();
        let after = restored.predict(&restored_collator, text).unwrap();
        assert_eq!(before.class, after.class);
        for (a, b) in before.probabilities.iter().zip(&after.probabilities) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}

#[test]
fn tokenizer_trait_objects_collate() {
    let tokenizer: Box<dyn TextTokenizer> = Box::new(BasicEnglish::new().unwrap());
    let samples = vec![Sample::tagged("neg", "bad film"), Sample::tagged("pos", "great film")];
    let vocab = Vocab::from_samples(&tokenizer, &samples, 1);
    let collator = Collator::new(&tokenizer, &vocab, LabelRule::Sentiment);
    let batch = collator.collate(&samples).unwrap();
    assert_eq!(batch.labels, vec![0, 1]);
    assert_eq!(batch.offsets, vec![0, 2]);
}
