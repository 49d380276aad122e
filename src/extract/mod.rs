pub mod http;
pub mod webdriver;

// Re-export common types
pub use http::HttpExtractor;
pub use webdriver::WebDriverExtractor;

use async_trait::async_trait;
use thiserror::Error;

use crate::cli::config::PageSpec;

/// Why an extraction attempt produced no value. All variants are
/// handled uniformly by the evaluator; the text is diagnostics only.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page fetch failed: {0}")]
    Fetch(String),

    #[error("invalid selector '{selector}': {message}")]
    BadSelector { selector: String, message: String },

    #[error("selector '{selector}' matched no element")]
    SelectorNoMatch { selector: String },

    #[error("selector '{selector}' matched only empty text")]
    EmptyText { selector: String },

    #[error("pattern '{pattern}' matched nothing in the selected text")]
    PatternNoMatch { pattern: String },

    #[error("invalid pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// The combined act of fetching a page, applying its CSS selector and
/// optionally its regex, yielding a single text value
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, page: &PageSpec) -> Result<String, ExtractError>;
}

/// Narrow the selected text with the page's pattern, if any. With no
/// pattern, empty text counts as a failure: a page suddenly rendering
/// an empty element usually means the content is gone, not blank.
pub(crate) fn apply_pattern(text: String, page: &PageSpec) -> Result<String, ExtractError> {
    let text = text.trim().to_string();

    let Some(pattern) = &page.pattern else {
        if text.is_empty() {
            return Err(ExtractError::EmptyText { selector: page.selector.clone() });
        }
        return Ok(text);
    };

    let regex = regex::Regex::new(pattern).map_err(|source| ExtractError::BadPattern {
        pattern: pattern.clone(),
        source,
    })?;

    let captures = regex.captures(&text).ok_or_else(|| ExtractError::PatternNoMatch {
        pattern: pattern.clone(),
    })?;

    // First capture group when the pattern has one, else the whole match
    let matched = captures
        .get(1)
        .or_else(|| captures.get(0))
        .ok_or_else(|| ExtractError::PatternNoMatch { pattern: pattern.clone() })?;
    Ok(matched.as_str().to_string())
}
