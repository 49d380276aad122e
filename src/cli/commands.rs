use anyhow::{Result, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::cli::config::{self, ChannelKind, FetchBackend, PollerConfig};
use crate::extract::{Extractor, HttpExtractor, WebDriverExtractor};
use crate::notify::Dispatcher;
use crate::poller::{JsonFileStore, PollRunner, RecordStore};

/// Poll every configured page once, persist the observations and
/// dispatch the batched results
pub async fn run(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    channels: Vec<ChannelKind>,
) -> Result<()> {
    let mut config = PollerConfig::load_or_init(config_path)?;

    // Command line overrides
    if !channels.is_empty() {
        config.notify.channels = channels;
    }
    if data_dir.is_some() {
        config.storage.data_dir = data_dir;
    }

    let data_dir = config.storage.data_dir.clone().unwrap_or_else(config::default_data_dir);
    let store: Arc<dyn RecordStore> = Arc::new(JsonFileStore::new(data_dir)?);

    let mut browser: Option<Arc<WebDriverExtractor>> = None;
    let extractor: Arc<dyn Extractor> = match config.browser.backend {
        FetchBackend::Http => Arc::new(HttpExtractor::new(&config.browser)?),
        FetchBackend::Webdriver => {
            let webdriver = Arc::new(WebDriverExtractor::new(config.browser.clone()));
            browser = Some(webdriver.clone());
            webdriver
        }
    };

    let runner = PollRunner::new(extractor, store, config.poll.clone());
    let (summary, pages_dirty) = runner.poll_pages(&mut config.pages).await;

    if let Some(webdriver) = browser {
        webdriver.shutdown().await;
    }

    // Adopted URL migrations must survive this run
    if pages_dirty {
        config.save_to(config_path)
            .context("Failed to rewrite configuration after URL migration")?;
    }

    Dispatcher::from_settings(&config.notify).dispatch(&summary).await;

    if summary.error_count() > 0 {
        anyhow::bail!(
            "{} of {} pages could not be checked",
            summary.error_count(),
            summary.results.len(),
        );
    }

    Ok(())
}

/// Register a new monitored page
pub async fn add_page(
    config_path: &Path,
    url: String,
    selector: String,
    pattern: Option<String>,
) -> Result<()> {
    let mut config = PollerConfig::load_or_init(config_path)?;

    let page = config.add_page(url, selector, pattern)?;
    println!("Added page {} ({})", page.id, page.url);

    config.save_to(config_path)?;

    Ok(())
}

/// List the configured pages
pub async fn list_pages(config_path: &Path) -> Result<()> {
    let config = PollerConfig::load_or_init(config_path)?;

    if config.pages.is_empty() {
        println!("No pages configured.");
        return Ok(());
    }

    for page in &config.pages {
        println!("{}  {}", page.id, page.url);
        if let Some(pending) = &page.pending_url {
            println!("    pending url: {}", pending);
        }
        println!("    selector: {}", page.selector);
        if let Some(pattern) = &page.pattern {
            println!("    pattern: {}", pattern);
        }
    }

    Ok(())
}

/// Drop a page and its stored record
pub async fn remove_page(config_path: &Path, data_dir: Option<PathBuf>, id: String) -> Result<()> {
    let mut config = PollerConfig::load_or_init(config_path)?;

    let removed = config.remove_page(&id)?;
    config.save_to(config_path)?;

    let data_dir = data_dir
        .or_else(|| config.storage.data_dir.clone())
        .unwrap_or_else(config::default_data_dir);
    let store = JsonFileStore::new(data_dir)?;
    store.remove(removed.id).await?;

    println!("Removed page {} ({})", removed.id, removed.url);

    Ok(())
}

/// Stage a URL replacement, adopted on the next run
pub async fn set_url(config_path: &Path, id: String, url: String) -> Result<()> {
    let mut config = PollerConfig::load_or_init(config_path)?;

    let page = config.stage_url(&id, url)?;
    println!("Page {} will switch to {} on the next run", page.id, page.pending_url.as_deref().unwrap_or("?"));

    config.save_to(config_path)?;

    Ok(())
}

/// Print the effective configuration
pub async fn show_config(config_path: &Path) -> Result<()> {
    let config = PollerConfig::load_or_init(config_path)?;

    let rendered = serde_yaml::to_string(&config)
        .context("Failed to serialize configuration")?;
    println!("{}", rendered);

    Ok(())
}

/// Write the current configuration to disk
pub async fn save_config(config_path: &Path) -> Result<()> {
    let config = PollerConfig::load_or_init(config_path)?;
    config.save_to(config_path)?;

    info!("Configuration saved to {}", config_path.display());

    Ok(())
}
