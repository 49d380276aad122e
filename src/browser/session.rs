use anyhow::{Result, Context};
use thirtyfour::prelude::*;
use std::time::Duration;
use tracing::{debug, error};

use crate::cli::config::BrowserSettings;

/// Browser session manager. One session is shared by all pages of a
/// run; it is created lazily and recreated after a navigation failure.
pub struct BrowserSession {
    /// Browser settings
    config: BrowserSettings,

    /// WebDriver instance
    driver: Option<WebDriver>,
}

impl BrowserSession {
    /// Create a new browser session without connecting yet
    pub fn new(config: BrowserSettings) -> Self {
        Self {
            config,
            driver: None,
        }
    }

    /// Connect to the WebDriver endpoint if not already connected
    pub async fn ensure_initialized(&mut self) -> Result<()> {
        if self.driver.is_some() {
            return Ok(());
        }

        let driver = match self.config.browser_type.as_str() {
            "chrome" => {
                let mut caps = DesiredCapabilities::chrome();
                caps.add_chrome_arg(&format!("--user-agent={}", self.config.user_agent))?;
                caps.add_chrome_arg("--disable-dev-shm-usage")?;
                if self.config.headless {
                    caps.set_headless()?;
                }
                WebDriver::new(&self.config.webdriver_url, caps).await
                    .context("Failed to connect to WebDriver")?
            }
            "firefox" => {
                let mut caps = DesiredCapabilities::firefox();
                if self.config.headless {
                    caps.set_headless()?;
                }
                WebDriver::new(&self.config.webdriver_url, caps).await
                    .context("Failed to connect to WebDriver")?
            }
            other => {
                anyhow::bail!("Unsupported browser type: {}", other);
            }
        };

        driver.set_page_load_timeout(Duration::from_secs(self.config.page_load_timeout_secs)).await?;

        debug!("Browser session initialized ({})", self.config.browser_type);

        self.driver = Some(driver);

        Ok(())
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let driver = self.driver.as_ref()
            .context("Browser session not initialized")?;

        debug!("Navigating to: {}", url);
        driver.goto(url).await
            .context(format!("Failed to navigate to URL: {}", url))?;

        Ok(())
    }

    /// Rendered text of the first element matching a CSS selector
    pub async fn element_text(&self, selector: &str) -> Result<String> {
        let driver = self.driver.as_ref()
            .context("Browser session not initialized")?;

        let element = driver.find(By::Css(selector)).await
            .context(format!("Element not found: {}", selector))?;

        let text = element.text().await
            .context(format!("Failed to read text of element: {}", selector))?;

        Ok(text)
    }

    /// Close the browser session
    pub async fn close(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.quit().await {
                error!("Error closing browser session: {}", e);
            }
            debug!("Browser session closed");
        }

        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Spawn a task to quit the driver
            tokio::spawn(async move {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session during drop: {}", e);
                }
            });
        }
    }
}
