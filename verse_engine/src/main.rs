// Verse Engine: CLI entry point.
//
// Trains on a plain-text corpus (one verse line per line), optionally
// restores or saves a checkpoint, and prints a generated poem.
// The pipeline: corpus filter -> train (or checkpoint load) -> beam search
// -> stdout.
//
// Usage:
//   cargo run -p verse_engine --bin compose -- [corpus.txt] [--lines N]
//     [--seed N] [--epochs N] [--beam N] [--syllables N] [--theme a,b,c]
//     [--config engine.json] [--load ckpt.json] [--save ckpt.json]
//     [--incremental]
//
// Logging goes through tracing; set RUST_LOG (default "info").

use std::error::Error;
use std::fs;
use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;
use verse_engine::{Checkpoint, EngineConfig, VerseEngine};
use verse_lang::default_lexicon;
use verse_prng::VerseRng;

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let corpus_path = args.get(1).filter(|s| !s.starts_with("--"));
    let num_lines: usize = parse_flag(&args, "--lines").unwrap_or(4);
    let seed: u64 = parse_flag(&args, "--seed").unwrap_or(42);
    let epochs: usize = parse_flag(&args, "--epochs").unwrap_or(3);
    let theme: String = parse_flag(&args, "--theme").unwrap_or_default();
    let config_path: Option<String> = parse_flag(&args, "--config");
    let load_path: Option<String> = parse_flag(&args, "--load");
    let save_path: Option<String> = parse_flag(&args, "--save");
    let incremental = args.iter().any(|a| a == "--incremental");

    let mut config = match &config_path {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    if let Some(beam) = parse_flag(&args, "--beam") {
        config.search.beam_width = beam;
    }
    if let Some(syllables) = parse_flag(&args, "--syllables") {
        config.search.target_syllables = syllables;
    }

    let mut engine = VerseEngine::new(config, default_lexicon(), VerseRng::new(seed))?;

    if let Some(path) = &load_path {
        let checkpoint = Checkpoint::from_json(&fs::read_to_string(path)?)?;
        engine.load_checkpoint(checkpoint)?;
        info!(path = %path, "checkpoint restored");
    }

    if let Some(path) = corpus_path {
        let lines = filter_corpus_lines(&fs::read_to_string(path)?);
        info!(path = %path, lines = lines.len(), "corpus read");
        let report = engine.train(&lines, epochs, incremental)?;
        info!(
            vocabulary = report.vocabulary,
            components = report.components,
            refitted = report.refitted,
            "trained"
        );
    }

    if !engine.is_trained() {
        return Err("nothing to generate from: pass a corpus file or --load a checkpoint".into());
    }

    let theme_words: Vec<&str> = theme
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .collect();
    let poem = engine.generate_poem(num_lines, &theme_words)?;
    println!("{}", poem.text());

    if let Some(path) = &save_path {
        write_atomically(Path::new(path), &engine.save_checkpoint().to_json_pretty()?)?;
        info!(path = %path, "checkpoint saved");
    }
    Ok(())
}

/// Trimmed corpus lines, without blanks or lines that have no letters.
fn filter_corpus_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.chars().any(char::is_alphabetic))
        .map(str::to_string)
        .collect()
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_corpus_lines() {
        let text = "  The moon rises  \n\n   \n1234 -- 5678\nand the sea\n";
        assert_eq!(
            filter_corpus_lines(text),
            vec!["The moon rises".to_string(), "and the sea".to_string()]
        );
    }

    #[test]
    fn test_parse_flag() {
        let args: Vec<String> = ["compose", "corpus.txt", "--lines", "6", "--seed", "x"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parse_flag::<usize>(&args, "--lines"), Some(6));
        assert_eq!(parse_flag::<u64>(&args, "--seed"), None);
        assert_eq!(parse_flag::<usize>(&args, "--beam"), None);
    }
}
