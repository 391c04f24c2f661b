use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kotoba_core::data::{Batches, Collator, LabelRule, Sample};
use kotoba_core::text::{BasicEnglish, TextTokenizer, Vocab};

fn corpus() -> Vec<Sample> {
    let texts = [
        "Wall St. Bears Claw Back Into the Black (Reuters) Short-sellers, Wall Street's dwindling band of ultra-cynics, are seeing green again.",
        "Carlyle Looks Toward Commercial Aerospace (Reuters) Private investment firm Carlyle Group has quietly placed its bets on another part of the market.",
        "Oil and Economy Cloud Stocks' Outlook (Reuters) Soaring crude prices plus worries about the economy are expected to hang over the stock market.",
        "Phelps wins gold in 200m butterfly, sets Olympic record in Athens.",
    ];
    (0..256)
        .map(|i| Sample::class((i % 4) as i64 + 1, texts[i % texts.len()]))
        .collect()
}

fn bench_collate(c: &mut Criterion) {
    let tokenizer = BasicEnglish::new().unwrap();
    let samples = corpus();
    let vocab = Vocab::from_samples(&tokenizer, &samples, 1);
    let collator = Collator::new(&tokenizer, &vocab, LabelRule::Topic { num_classes: 4 });

    c.bench_function("tokenize_single", |b| {
        b.iter(|| tokenizer.tokenize(black_box(&samples[0].text)));
    });

    c.bench_function("collate_batch_64", |b| {
        b.iter(|| collator.collate(black_box(&samples[..64])).unwrap());
    });

    c.bench_function("collate_epoch_256", |b| {
        b.iter(|| {
            for batch in Batches::sequential(&samples, 64) {
                let _ = collator.collate(black_box(&batch)).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_collate);
criterion_main!(benches);
