use anyhow::{Result, Context};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

use crate::cli::config::{BrowserSettings, PageSpec};
use crate::extract::{apply_pattern, ExtractError, Extractor};

/// Extraction backend for pages that render server-side: plain GET,
/// static HTML parse, no JavaScript
pub struct HttpExtractor {
    client: Client,
}

impl HttpExtractor {
    pub fn new(settings: &BrowserSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.page_load_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, page: &PageSpec) -> Result<String, ExtractError> {
        debug!("Fetching {} over HTTP", page.url);

        let body = self.client
            .get(&page.url)
            .send()
            .await
            .map_err(|e| ExtractError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExtractError::Fetch(e.to_string()))?
            .text()
            .await
            .map_err(|e| ExtractError::Fetch(e.to_string()))?;

        let text = selected_text(&body, &page.selector)?;
        apply_pattern(text, page)
    }
}

// Kept out of the async fn: scraper's DOM is not Send and must not
// live across an await point
fn selected_text(body: &str, selector: &str) -> Result<String, ExtractError> {
    let parsed = Selector::parse(selector).map_err(|e| ExtractError::BadSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })?;

    let document = Html::parse_document(body);

    let element = document.select(&parsed).next().ok_or_else(|| ExtractError::SelectorNoMatch {
        selector: selector.to_string(),
    })?;

    Ok(element.text().collect::<String>())
}
