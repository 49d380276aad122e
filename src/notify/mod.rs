pub mod channels;

// Re-export common types
pub use channels::{DesktopChannel, LogFileChannel, PrintChannel};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use crate::cli::config::{ChannelKind, NotifySettings};
use crate::poller::RunSummary;

/// The batched change data handed to every channel, shaped like the
/// change log entries users already grep for
#[derive(Debug, Serialize)]
pub struct ChangeReport {
    pub timestamp: i64,
    pub changed_count: usize,
    pub changes: Vec<ChangeEntry>,
}

#[derive(Debug, Serialize)]
pub struct ChangeEntry {
    pub page_id: Uuid,
    pub url: String,
    pub domain: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl ChangeReport {
    pub fn from_summary(summary: &RunSummary) -> Self {
        let changes: Vec<ChangeEntry> = summary
            .changed()
            .map(|result| ChangeEntry {
                page_id: result.page_id,
                url: result.url.clone(),
                domain: domain_of(&result.url),
                old_value: result.old_value.clone(),
                new_value: result.new_value.clone(),
            })
            .collect();

        Self {
            timestamp: summary.started_at.timestamp(),
            changed_count: changes.len(),
            changes,
        }
    }
}

fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

/// One way of telling the user about changes
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &ChangeReport) -> Result<()>;
}

/// Fans one run's results out to every selected channel
pub struct Dispatcher {
    channels: Vec<Box<dyn NotifyChannel>>,
}

impl Dispatcher {
    pub fn from_settings(settings: &NotifySettings) -> Self {
        let channels = settings
            .channels
            .iter()
            .map(|kind| -> Box<dyn NotifyChannel> {
                match kind {
                    ChannelKind::Print => Box::new(PrintChannel),
                    ChannelKind::Log => Box::new(LogFileChannel::new(settings.change_log_path.clone())),
                    ChannelKind::Desktop => Box::new(DesktopChannel),
                }
            })
            .collect();

        Self { channels }
    }

    #[cfg(test)]
    fn with_channels(channels: Vec<Box<dyn NotifyChannel>>) -> Self {
        Self { channels }
    }

    /// Attempt every channel independently. A channel failure is
    /// surfaced in the log and never aborts the remaining channels;
    /// by this point all records are already persisted.
    pub async fn dispatch(&self, summary: &RunSummary) {
        let report = ChangeReport::from_summary(summary);

        if self.channels.is_empty() {
            debug!("No notification channels configured");
            return;
        }

        for channel in &self.channels {
            if let Err(e) = channel.deliver(&report).await {
                error!("Notification channel '{}' failed: {}", channel.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::{Outcome, RunResult};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn result(url: &str, outcome: Outcome, old: Option<&str>, new: Option<&str>) -> RunResult {
        RunResult {
            page_id: Uuid::new_v4(),
            url: url.into(),
            outcome,
            old_value: old.map(|v| v.to_string()),
            new_value: new.map(|v| v.to_string()),
            error: None,
        }
    }

    fn summary(results: Vec<RunResult>) -> RunSummary {
        RunSummary {
            started_at: Utc::now(),
            results,
        }
    }

    #[test]
    fn report_keeps_only_changes_in_order() {
        let summary = summary(vec![
            result("https://a.example/x", Outcome::Changed, Some("1"), Some("2")),
            result("https://b.example/y", Outcome::Unchanged, Some("5"), Some("5")),
            result("https://c.example/z", Outcome::Error, Some("9"), None),
            result("https://d.example/w", Outcome::Changed, None, Some("first")),
        ]);

        let report = ChangeReport::from_summary(&summary);

        assert_eq!(report.changed_count, 2);
        assert_eq!(report.changes[0].domain, "a.example");
        assert_eq!(report.changes[0].old_value.as_deref(), Some("1"));
        assert_eq!(report.changes[1].domain, "d.example");
        assert_eq!(report.changes[1].new_value.as_deref(), Some("first"));
    }

    struct Recording {
        name: &'static str,
        delivered: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl NotifyChannel for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn deliver(&self, _report: &ChangeReport) -> Result<()> {
            self.delivered.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotifyChannel for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _report: &ChangeReport) -> Result<()> {
            anyhow::bail!("channel broke")
        }
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_the_rest() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::with_channels(vec![
            Box::new(Failing),
            Box::new(Recording { name: "second", delivered: delivered.clone() }),
        ]);

        dispatcher
            .dispatch(&summary(vec![result("https://a.example", Outcome::Changed, Some("1"), Some("2"))]))
            .await;

        assert_eq!(*delivered.lock().unwrap(), vec!["second"]);
    }

    #[tokio::test]
    async fn empty_summary_is_dispatched_without_error() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::with_channels(vec![
            Box::new(Recording { name: "only", delivered: delivered.clone() }),
        ]);

        dispatcher.dispatch(&summary(vec![])).await;

        assert_eq!(*delivered.lock().unwrap(), vec!["only"]);
    }
}
