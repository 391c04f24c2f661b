pub mod batch;
pub mod loader;
pub mod sample;
pub mod split;

pub use batch::{Batches, Collator, EncodedBatch};
pub use loader::{CorpusFormat, load_ag_news_csv, load_corpus, load_imdb_dir, load_jsonl};
pub use sample::{LabelRule, RawLabel, Sample};
pub use split::random_split;
