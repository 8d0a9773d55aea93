//! Conversation corpus sources: file loading and synthetic composition.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use aiperf_common::config::InputConfig;
use aiperf_common::models::{Conversation, Turn};
use aiperf_common::{AIPerfError, AIPerfResult};

/// Word pool for synthetic prompts.
const LEXICON: &[&str] = &[
    "system", "model", "token", "stream", "latency", "request", "response", "batch",
    "vector", "prompt", "engine", "kernel", "tensor", "buffer", "decode", "sample",
    "weight", "layer", "cache", "queue", "worker", "credit", "record", "metric",
    "window", "session", "packet", "server", "client", "result", "signal", "phase",
];

/// Load a JSONL corpus file: one conversation object per line.
pub fn load_corpus_file(path: &Path) -> AIPerfResult<Vec<Conversation>> {
    let contents = std::fs::read_to_string(path)?;
    let mut conversations = Vec::new();
    for (line_number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let conversation: Conversation = serde_json::from_str(line).map_err(|e| {
            AIPerfError::Configuration(format!(
                "invalid conversation on line {} of {}: {e}",
                line_number + 1,
                path.display()
            ))
        })?;
        conversations.push(conversation);
    }
    if conversations.is_empty() {
        return Err(AIPerfError::Configuration(format!(
            "corpus file {} contains no conversations",
            path.display()
        )));
    }
    Ok(conversations)
}

/// Composes a synthetic corpus from the input settings.
pub struct SyntheticComposer {
    rng: StdRng,
}

impl SyntheticComposer {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn compose(&mut self, config: &InputConfig) -> Vec<Conversation> {
        (0..config.session_count)
            .map(|i| {
                let turns = (0..config.turns_per_session.max(1))
                    .map(|_| Turn::text(self.synthesize_prompt(config)))
                    .collect();
                Conversation::new(format!("session_{i}"), turns)
            })
            .collect()
    }

    fn synthesize_prompt(&mut self, config: &InputConfig) -> String {
        let word_count = self
            .sample_word_count(config.prompt_mean_word_count, config.prompt_stddev_word_count);
        let words: Vec<&str> = (0..word_count)
            .map(|_| LEXICON[self.rng.gen_range(0..LEXICON.len())])
            .collect();
        words.join(" ")
    }

    /// Sample a word count from a normal distribution (Box-Muller), floored
    /// at one word.
    fn sample_word_count(&mut self, mean: usize, stddev: usize) -> usize {
        if stddev == 0 {
            return mean.max(1);
        }
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        let gaussian = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let sampled = mean as f64 + gaussian * stddev as f64;
        sampled.round().max(1.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_synthetic_corpus_is_deterministic_with_seed() {
        let config = InputConfig {
            session_count: 5,
            turns_per_session: 2,
            prompt_mean_word_count: 16,
            prompt_stddev_word_count: 4,
            random_seed: Some(42),
            ..Default::default()
        };
        let a = SyntheticComposer::new(Some(42)).compose(&config);
        let b = SyntheticComposer::new(Some(42)).compose(&config);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert_eq!(a[0].turns.len(), 2);
        assert!(!a[0].turns[0].texts[0].is_empty());
    }

    #[test]
    fn test_fixed_width_prompts_without_stddev() {
        let config = InputConfig {
            session_count: 1,
            prompt_mean_word_count: 8,
            prompt_stddev_word_count: 0,
            ..Default::default()
        };
        let corpus = SyntheticComposer::new(Some(1)).compose(&config);
        assert_eq!(corpus[0].turns[0].word_count(), 8);
    }

    #[test]
    fn test_load_corpus_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"{{"session_id":"s1","turns":[{{"texts":["hello"],"role":"user"}}]}}"#
        )
        .expect("write");
        writeln!(
            file,
            r#"{{"session_id":"s2","turns":[{{"texts":["world"],"delay_ms":250}}]}}"#
        )
        .expect("write");

        let corpus = load_corpus_file(file.path()).expect("load");
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0].session_id, "s1");
        assert_eq!(corpus[1].turns[0].delay_ms, Some(250));
    }

    #[test]
    fn test_empty_corpus_file_rejected() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        assert!(load_corpus_file(file.path()).is_err());
    }
}
