//! Frequency based keyword extraction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::AnalysisError;

/// Common English words that carry no meaning on their own.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "among", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
    "this", "that", "these", "those", "i", "me", "my", "myself", "we", "our", "ours",
    "ourselves", "you", "your", "yours", "yourself", "yourselves", "he", "him", "his",
    "himself", "she", "her", "hers", "herself", "it", "its", "itself", "they", "them", "their",
    "theirs", "themselves", "what", "which", "who", "whom", "whose", "where", "when", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "just", "now",
];

/// A keyword and how often it appeared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    pub frequency: usize,
    pub score: f64,
}

/// Tuning for keyword extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordOptions {
    /// Shorter words are ignored
    pub min_length: usize,
    /// Zero keeps every keyword
    pub max_keywords: usize,
    pub remove_stop_words: bool,
}

impl Default for KeywordOptions {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_keywords: 20,
            remove_stop_words: true,
        }
    }
}

/// Something that ranks the keywords of a text.
pub trait KeywordExtractor: Send + Sync {
    fn extract_with_scores(
        &self,
        text: &str,
        options: &KeywordOptions,
    ) -> Result<Vec<Keyword>, AnalysisError>;

    fn extract(&self, text: &str, options: &KeywordOptions) -> Result<Vec<String>, AnalysisError> {
        Ok(self
            .extract_with_scores(text, options)?
            .into_iter()
            .map(|k| k.text)
            .collect())
    }
}

/// Scores each lower-cased word by the number of times it occurs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyKeywordExtractor;

impl FrequencyKeywordExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl KeywordExtractor for FrequencyKeywordExtractor {
    fn extract_with_scores(
        &self,
        text: &str,
        options: &KeywordOptions,
    ) -> Result<Vec<Keyword>, AnalysisError> {
        let mut frequencies: HashMap<String, usize> = HashMap::new();

        for word in words(text) {
            let word = word.to_lowercase();
            if word.chars().count() < options.min_length {
                continue;
            }
            if options.remove_stop_words && STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            *frequencies.entry(word).or_insert(0) += 1;
        }

        let mut keywords: Vec<Keyword> = frequencies
            .into_iter()
            .map(|(text, frequency)| Keyword {
                text,
                frequency,
                score: frequency as f64,
            })
            .collect();

        // Ties are broken alphabetically so results are stable.
        keywords.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.text.cmp(&b.text)));

        if options.max_keywords > 0 {
            keywords.truncate(options.max_keywords);
        }

        Ok(keywords)
    }
}

/// Words made of letters and digits, allowing inner apostrophes and hyphens.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str, options: &KeywordOptions) -> Vec<Keyword> {
        FrequencyKeywordExtractor::new()
            .extract_with_scores(text, options)
            .unwrap()
    }

    #[test]
    fn test_default_options() {
        let options = KeywordOptions::default();
        assert_eq!(options.min_length, 3);
        assert_eq!(options.max_keywords, 20);
        assert!(options.remove_stop_words);
    }

    #[test]
    fn test_ranked_by_frequency() {
        let text = "Security breach. The breach exposed data; security teams contained the breach.";
        let keywords = extract(text, &KeywordOptions::default());

        assert_eq!(keywords[0].text, "breach");
        assert_eq!(keywords[0].frequency, 3);
        assert_eq!(keywords[0].score, 3.0);
        assert_eq!(keywords[1].text, "security");
        assert_eq!(keywords[1].frequency, 2);
        assert!(keywords.iter().all(|k| k.text != "the"));
    }

    #[test]
    fn test_ties_sorted_alphabetically() {
        let keywords = extract("zeta alpha mike", &KeywordOptions::default());
        let texts: Vec<_> = keywords.iter().map(|k| k.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "mike", "zeta"]);
    }

    #[test]
    fn test_min_length_and_punctuation() {
        let keywords = extract("go to ai lab -- ok? yes!", &KeywordOptions::default());
        let texts: Vec<_> = keywords.iter().map(|k| k.text.as_str()).collect();
        assert_eq!(texts, vec!["lab", "yes"]);
    }

    #[test]
    fn test_keep_stop_words() {
        let options = KeywordOptions {
            remove_stop_words: false,
            ..KeywordOptions::default()
        };
        let keywords = extract("the the the cat", &options);
        assert_eq!(keywords[0].text, "the");
        assert_eq!(keywords[0].frequency, 3);
    }

    #[test]
    fn test_max_keywords() {
        let options = KeywordOptions {
            max_keywords: 2,
            ..KeywordOptions::default()
        };
        let keywords = extract("one two three four five six", &options);
        assert_eq!(keywords.len(), 2);

        let unlimited = KeywordOptions {
            max_keywords: 0,
            ..KeywordOptions::default()
        };
        assert_eq!(extract("one two three four five six", &unlimited).len(), 6);
    }

    #[test]
    fn test_extract_returns_texts() {
        let texts = FrequencyKeywordExtractor::new()
            .extract("network network firewall", &KeywordOptions::default())
            .unwrap();
        assert_eq!(texts, vec!["network".to_string(), "firewall".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        assert!(extract("", &KeywordOptions::default()).is_empty());
    }
}
