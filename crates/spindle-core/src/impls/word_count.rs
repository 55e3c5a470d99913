//! WordFrequencyProcessor - the text analysis behind each task.
//!
//! Output shape:
//! `{ "total_words": n, "unique_words": n, "top_words": [{ "word": w, "count": c }] }`

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ProcessingError, TaskOptions, TaskPayload};
use crate::ports::TextProcessor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordFrequencyReport {
    pub total_words: usize,
    pub unique_words: usize,
    pub top_words: Vec<WordCount>,
}

/// Counts word frequencies. Stop words come from configuration and are
/// matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct WordFrequencyProcessor {
    stop_words: HashSet<String>,
}

impl WordFrequencyProcessor {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: stop_words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn analyze(
        &self,
        text: &str,
        options: &TaskOptions,
    ) -> Result<WordFrequencyReport, ProcessingError> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total_words = 0;

        for token in tokenize(text) {
            if token.chars().count() < options.min_word_length {
                continue;
            }
            if options.exclude_stop_words && self.stop_words.contains(&token.to_lowercase()) {
                continue;
            }
            let word = if options.case_sensitive {
                token.to_string()
            } else {
                token.to_lowercase()
            };
            *counts.entry(word).or_insert(0) += 1;
            total_words += 1;
        }

        if total_words == 0 {
            return Err(ProcessingError::non_retryable("text contains no countable words"));
        }

        let unique_words = counts.len();
        let mut top_words: Vec<WordCount> = counts
            .into_iter()
            .map(|(word, count)| WordCount { word, count })
            .collect();
        top_words.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        top_words.truncate(options.top_n);

        Ok(WordFrequencyReport {
            total_words,
            unique_words,
            top_words,
        })
    }
}

#[async_trait]
impl TextProcessor for WordFrequencyProcessor {
    async fn process(
        &self,
        payload: &TaskPayload,
        options: &TaskOptions,
    ) -> Result<Value, ProcessingError> {
        let report = self.analyze(&payload.text, options)?;
        serde_json::to_value(report)
            .map_err(|e| ProcessingError::retryable(format!("encode result: {e}")))
    }
}

/// Splits on anything that is not alphanumeric. Apostrophes are kept when
/// they sit inside a word ("don't"), dropped at its edges ("'quoted'").
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|raw| raw.trim_matches(|c: char| c == '\'' || c == '\u{2019}'))
        .filter(|word| !word.is_empty())
}
