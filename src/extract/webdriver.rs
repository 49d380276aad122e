use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::browser::BrowserSession;
use crate::cli::config::{BrowserSettings, PageSpec};
use crate::extract::{apply_pattern, ExtractError, Extractor};

/// Extraction backend driving a real browser through WebDriver, for
/// pages that only produce their content after JavaScript runs. The
/// underlying session is a single shared stateful resource; extraction
/// is strictly sequential.
pub struct WebDriverExtractor {
    session: Mutex<BrowserSession>,
}

impl WebDriverExtractor {
    pub fn new(config: BrowserSettings) -> Self {
        Self {
            session: Mutex::new(BrowserSession::new(config)),
        }
    }

    /// Quit the browser once the run is over
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        if let Err(e) = session.close().await {
            warn!("Failed to shut down browser session: {}", e);
        }
    }
}

#[async_trait]
impl Extractor for WebDriverExtractor {
    async fn extract(&self, page: &PageSpec) -> Result<String, ExtractError> {
        let mut session = self.session.lock().await;

        session.ensure_initialized().await
            .map_err(|e| ExtractError::Fetch(e.to_string()))?;

        debug!("Fetching {} through the browser", page.url);

        if let Err(e) = session.navigate(&page.url).await {
            // A wedged session would poison every later page of the
            // run; drop it so the next page starts fresh
            let _ = session.close().await;
            return Err(ExtractError::Fetch(e.to_string()));
        }

        let text = session.element_text(&page.selector).await
            .map_err(|_| ExtractError::SelectorNoMatch { selector: page.selector.clone() })?;

        drop(session);

        apply_pattern(text, page)
    }
}
