//! Text analysis: PII detection and keyword extraction.

pub mod keyword;
pub mod pii;
pub mod service;

use thiserror::Error;

pub use keyword::{FrequencyKeywordExtractor, Keyword, KeywordExtractor, KeywordOptions};
pub use pii::{PatternPiiExtractor, PiiEntity, PiiExtractor, PiiResult, PiiType};
pub use service::{TextAnalysisResult, TextAnalysisService};

/// Errors raised by an extractor.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Pii(String),

    #[error("{0}")]
    Keyword(String),
}
