//! Combined PII and keyword analysis of one text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::keyword::{FrequencyKeywordExtractor, Keyword, KeywordExtractor, KeywordOptions};
use super::pii::{PatternPiiExtractor, PiiExtractor, PiiResult};
use super::AnalysisError;

/// Everything learned about one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysisResult {
    pub text: String,
    pub pii_result: PiiResult,
    pub keywords: Vec<Keyword>,
}

impl TextAnalysisResult {
    pub fn has_pii(&self) -> bool {
        !self.pii_result.is_empty()
    }

    pub fn has_keywords(&self) -> bool {
        !self.keywords.is_empty()
    }
}

/// Runs PII detection then keyword extraction.
#[derive(Clone)]
pub struct TextAnalysisService {
    pii: Arc<dyn PiiExtractor>,
    keywords: Arc<dyn KeywordExtractor>,
    keyword_options: KeywordOptions,
}

impl TextAnalysisService {
    pub fn new(pii: Arc<dyn PiiExtractor>, keywords: Arc<dyn KeywordExtractor>) -> Self {
        Self {
            pii,
            keywords,
            keyword_options: KeywordOptions::default(),
        }
    }

    pub fn with_keyword_options(mut self, options: KeywordOptions) -> Self {
        self.keyword_options = options;
        self
    }

    /// Analyze `text`. The first failing extractor aborts the analysis.
    pub fn analyze(&self, text: &str) -> Result<TextAnalysisResult, AnalysisError> {
        let pii_result = self.pii.extract(text)?;
        let keywords = self
            .keywords
            .extract_with_scores(text, &self.keyword_options)?;

        debug!(
            text_length = text.len(),
            pii_total = pii_result.total,
            keywords = keywords.len(),
            "text_analyzed"
        );

        Ok(TextAnalysisResult {
            text: text.to_string(),
            pii_result,
            keywords,
        })
    }
}

impl Default for TextAnalysisService {
    fn default() -> Self {
        Self::new(
            Arc::new(PatternPiiExtractor::new()),
            Arc::new(FrequencyKeywordExtractor::new()),
        )
    }
}
