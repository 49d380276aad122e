use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};
use url::Url;
use uuid::Uuid;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollerConfig {
    pub pages: Vec<PageSpec>,
    pub browser: BrowserSettings,
    pub poll: PollSettings,
    pub notify: NotifySettings,
    pub storage: StorageSettings,
}

/// A monitored page: where to look and what to look at
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PageSpec {
    /// Stable identifier, assigned once at creation
    pub id: Uuid,

    /// Current fetch target
    pub url: String,

    /// Replacement URL staged for adoption on the next run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_url: Option<String>,

    /// CSS selector narrowing the page to the watched element
    pub selector: String,

    /// Optional regex applied to the selected text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl PageSpec {
    pub fn new(url: String, selector: String, pattern: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            pending_url: None,
            selector,
            pattern,
        }
    }

    /// Adopt a staged URL replacement. Returns true if the page changed
    /// and the configuration must be rewritten to disk.
    pub fn adopt_pending_url(&mut self) -> bool {
        match self.pending_url.take() {
            Some(new_url) => {
                info!("Adopting staged URL for page {}: {} -> {}", self.id, self.url, new_url);
                self.url = new_url;
                true
            }
            None => false,
        }
    }

    /// Host part of the current URL, for human-facing summaries
    pub fn domain(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Fetching backend for page extraction
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    /// Plain HTTP GET, parsed with a static HTML parser
    Http,
    /// Remote WebDriver session (renders JavaScript)
    Webdriver,
}

/// Browser and fetching settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrowserSettings {
    pub backend: FetchBackend,
    pub webdriver_url: String,
    pub browser_type: String,  // "chrome", "firefox"
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub user_agent: String,
}

/// Pacing between page fetches
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollSettings {
    pub politeness_delay_ms: u64,  // Delay between page fetches in milliseconds
    pub politeness_jitter_ms: u64, // Random extra delay on top
}

/// Notification channel selection
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Pretty-printed JSON on stdout
    Print,
    /// JSON appended to the change log file
    Log,
    /// Desktop notification via notify-send
    Desktop,
}

/// Notification settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifySettings {
    pub channels: Vec<ChannelKind>,
    pub change_log_path: PathBuf,
}

/// Storage settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageSettings {
    /// Directory holding one record file per page; defaults to the
    /// platform data dir when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            pages: vec![],
            browser: BrowserSettings {
                backend: FetchBackend::Http,
                webdriver_url: "http://localhost:4444".to_string(),
                browser_type: "firefox".to_string(),
                headless: true,
                page_load_timeout_secs: 30,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            },
            poll: PollSettings {
                politeness_delay_ms: 2000,
                politeness_jitter_ms: 500,
            },
            notify: NotifySettings {
                channels: vec![ChannelKind::Print, ChannelKind::Log, ChannelKind::Desktop],
                change_log_path: default_change_log_path(),
            },
            storage: StorageSettings {
                data_dir: None,
            },
        }
    }
}

/// Get the path to the config directory
fn config_dir() -> PathBuf {
    let path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "change-poller", "change-poller") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        PathBuf::from("./config")
    };

    if !path.exists() {
        if let Err(e) = fs::create_dir_all(&path) {
            error!("Failed to create config directory: {}", e);
        }
    }

    path
}

/// Get the path to the data directory
pub fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "change-poller", "change-poller") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from("./data")
    }
}

fn default_change_log_path() -> PathBuf {
    default_data_dir().join("changes.log")
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.yaml")
}

impl PollerConfig {
    /// Load the configuration, creating a default one on first use
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("Configuration not found at {}. Creating defaults...", path.display());
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Register a new page after validating the user's input
    pub fn add_page(&mut self, url: String, selector: String, pattern: Option<String>) -> Result<PageSpec> {
        let parsed = Url::parse(&url)
            .context(format!("Malformed url: {}", url))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Unsupported url scheme '{}' for {}", parsed.scheme(), url);
        }

        if self.pages.iter().any(|p| p.url == url || p.pending_url.as_deref() == Some(url.as_str())) {
            anyhow::bail!("Duplicate page url: {}. Add a unique #hash to the end if you really want both.", url);
        }

        if let Some(pattern) = &pattern {
            regex::Regex::new(pattern)
                .context(format!("Malformed regex: {}", pattern))?;
        }

        let page = PageSpec::new(url, selector, pattern);
        self.pages.push(page.clone());
        Ok(page)
    }

    /// Find a page by full id or unambiguous id prefix
    pub fn find_page_index(&self, id: &str) -> Result<usize> {
        let matches: Vec<usize> = self.pages.iter()
            .enumerate()
            .filter(|(_, p)| p.id.to_string().starts_with(id))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [i] => Ok(*i),
            [] => anyhow::bail!("No page matches id '{}'", id),
            _ => anyhow::bail!("Id '{}' is ambiguous, matches {} pages", id, matches.len()),
        }
    }

    /// Remove a page, returning it for record cleanup
    pub fn remove_page(&mut self, id: &str) -> Result<PageSpec> {
        let index = self.find_page_index(id)?;
        Ok(self.pages.remove(index))
    }

    /// Stage a URL replacement for adoption on the next run
    pub fn stage_url(&mut self, id: &str, new_url: String) -> Result<&PageSpec> {
        Url::parse(&new_url)
            .context(format!("Malformed url: {}", new_url))?;

        let index = self.find_page_index(id)?;
        self.pages[index].pending_url = Some(new_url);
        Ok(&self.pages[index])
    }
}
