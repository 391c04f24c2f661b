//! # Corpus Loading
//!
//! Reads labelled text from the formats the training datasets ship in:
//! AG News style CSV, JSON Lines, and the IMDB `pos/` + `neg/` directory
//! layout. Every loader fails on malformed input instead of skipping it.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::sample::{RawLabel, Sample};
use crate::error::{KotobaError, Result};

/// Supported on-disk corpus layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusFormat {
    /// `"class","title","description"` rows.
    Csv,
    /// One `{"label": .., "text": ..}` object per line.
    Jsonl,
    /// Directory with `pos/` and `neg/` subdirectories of `.txt` reviews.
    ImdbDir,
}

impl CorpusFormat {
    /// Guess the format from a path: directories are IMDB style, otherwise
    /// the extension decides (`.jsonl`/`.json` → JSON Lines, anything else CSV).
    pub fn detect(path: &Path) -> Self {
        if path.is_dir() {
            return CorpusFormat::ImdbDir;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") | Some("json") => CorpusFormat::Jsonl,
            _ => CorpusFormat::Csv,
        }
    }
}

/// Load a corpus in the given (or detected) format.
pub fn load_corpus<P: AsRef<Path>>(path: P, format: Option<CorpusFormat>) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    match format.unwrap_or_else(|| CorpusFormat::detect(path)) {
        CorpusFormat::Csv => load_ag_news_csv(path),
        CorpusFormat::Jsonl => load_jsonl(path),
        CorpusFormat::ImdbDir => load_imdb_dir(path),
    }
}

/// Load AG News style CSV.
///
/// The first field is the numeric class; the remaining fields (title and
/// description) are joined with a single space to form the text. A
/// non-numeric first field on line 1 is treated as a header.
pub fn load_ag_news_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields = parse_csv_line(&line).ok_or_else(|| KotobaError::MalformedRecord {
            line: line_no,
            reason: "unterminated quoted field".into(),
        })?;

        if fields.len() < 2 {
            return Err(KotobaError::MalformedRecord {
                line: line_no,
                reason: format!("expected at least 2 fields, got {}", fields.len()),
            });
        }

        let class = match fields[0].trim().parse::<i64>() {
            Ok(class) => class,
            Err(_) if line_no == 1 => {
                debug!("skipping CSV header in {}", path.display());
                continue;
            }
            Err(_) => {
                return Err(KotobaError::MalformedRecord {
                    line: line_no,
                    reason: format!("non-numeric class {:?}", fields[0]),
                });
            }
        };

        let text = fields[1..]
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        samples.push(Sample::new(RawLabel::Class(class), text));
    }

    finish(path, samples)
}

/// Load JSON Lines; blank lines and `#` comments are skipped.
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sample: Sample = serde_json::from_str(line).map_err(|e| KotobaError::MalformedRecord {
            line: index + 1,
            reason: e.to_string(),
        })?;
        samples.push(sample);
    }

    finish(path, samples)
}

/// Load an IMDB style directory: `<root>/neg/*.txt` then `<root>/pos/*.txt`,
/// each in file-name order.
pub fn load_imdb_dir<P: AsRef<Path>>(root: P) -> Result<Vec<Sample>> {
    let root = root.as_ref();
    let mut samples = Vec::new();

    for tag in ["neg", "pos"] {
        let dir = root.join(tag);
        if !dir.is_dir() {
            warn!("missing {} directory under {}", tag, root.display());
            continue;
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        files.retain(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"));
        files.sort();

        for file in files {
            let text = fs::read_to_string(&file)?;
            samples.push(Sample::tagged(tag, text.trim()));
        }
    }

    finish(root, samples)
}

fn finish(path: &Path, samples: Vec<Sample>) -> Result<Vec<Sample>> {
    if samples.is_empty() {
        return Err(KotobaError::EmptyCorpus(path.display().to_string()));
    }
    info!("Loaded {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Split one CSV record. Fields may be quoted with `"`, and `""` inside a
/// quoted field is a literal quote. Returns `None` on an unterminated quote.
fn parse_csv_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }

    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kotoba-loader-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_csv_line() {
        let fields = parse_csv_line(r#""3","Wall St. Bears","Short-sellers, ""ultra-cynics"", are back""#).unwrap();
        assert_eq!(fields, vec!["3", "Wall St. Bears", r#"Short-sellers, "ultra-cynics", are back"#]);

        assert_eq!(parse_csv_line("1,plain,text").unwrap(), vec!["1", "plain", "text"]);
        assert_eq!(parse_csv_line("1,,").unwrap(), vec!["1", "", ""]);
        assert!(parse_csv_line(r#""1","open"#).is_none());
    }

    #[test]
    fn test_load_ag_news_csv() {
        let dir = scratch("csv");
        let path = dir.join("train.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "Class Index,Title,Description").unwrap();
        writeln!(file, r#""3","Wall St. Bears","Short-sellers are back""#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#""2","Match report","""Great game"" said the coach""#).unwrap();
        drop(file);

        let samples = load_ag_news_csv(&path).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], Sample::class(3, "Wall St. Bears Short-sellers are back"));
        assert_eq!(samples[1].text, r#"Match report "Great game" said the coach"#);
    }

    #[test]
    fn test_load_csv_rejects_bad_class() {
        let dir = scratch("csv-bad");
        let path = dir.join("train.csv");
        fs::write(&path, "\"1\",\"ok\",\"fine\"\n\"x\",\"bad\",\"row\"\n").unwrap();
        let err = load_ag_news_csv(&path);
        fs::remove_dir_all(&dir).ok();
        assert!(matches!(err, Err(KotobaError::MalformedRecord { line: 2, .. })));
    }

    #[test]
    fn test_load_jsonl() {
        let dir = scratch("jsonl");
        let path = dir.join("train.jsonl");
        fs::write(
            &path,
            "{\"label\": \"neg\", \"text\": \"bad film\"}\n# comment\n\n{\"label\": 1, \"text\": \"great film\"}\n",
        )
        .unwrap();
        let samples = load_corpus(&path, None).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(samples, vec![Sample::tagged("neg", "bad film"), Sample::class(1, "great film")]);
    }

    #[test]
    fn test_load_jsonl_malformed() {
        let dir = scratch("jsonl-bad");
        let path = dir.join("train.jsonl");
        fs::write(&path, "{\"label\": 1, \"text\": \"ok\"}\n{\"label\": 1}\n").unwrap();
        let err = load_jsonl(&path);
        fs::remove_dir_all(&dir).ok();
        assert!(matches!(err, Err(KotobaError::MalformedRecord { line: 2, .. })));
    }

    #[test]
    fn test_load_imdb_dir() {
        let dir = scratch("imdb");
        fs::create_dir_all(dir.join("pos")).unwrap();
        fs::create_dir_all(dir.join("neg")).unwrap();
        fs::write(dir.join("pos").join("0_9.txt"), "A great film.<br />Loved it\n").unwrap();
        fs::write(dir.join("neg").join("0_2.txt"), "Bad film").unwrap();
        fs::write(dir.join("neg").join("1_1.txt"), "Awful").unwrap();
        fs::write(dir.join("neg").join("urls.dat"), "ignored").unwrap();

        assert_eq!(CorpusFormat::detect(&dir), CorpusFormat::ImdbDir);
        let samples = load_corpus(&dir, None).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], Sample::tagged("neg", "Bad film"));
        assert_eq!(samples[1], Sample::tagged("neg", "Awful"));
        assert_eq!(samples[2].label, RawLabel::Tag("pos".into()));
    }

    #[test]
    fn test_empty_corpus() {
        let dir = scratch("empty");
        let path = dir.join("train.jsonl");
        fs::write(&path, "\n\n").unwrap();
        let err = load_jsonl(&path);
        fs::remove_dir_all(&dir).ok();
        assert!(matches!(err, Err(KotobaError::EmptyCorpus(_))));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(CorpusFormat::detect(Path::new("x/train.jsonl")), CorpusFormat::Jsonl);
        assert_eq!(CorpusFormat::detect(Path::new("x/train.csv")), CorpusFormat::Csv);
    }
}
