use anyhow::{Result, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::notify::{ChangeEntry, ChangeReport, NotifyChannel};

/// Pretty-printed JSON on stdout, for piping into other tools
pub struct PrintChannel;

#[async_trait]
impl NotifyChannel for PrintChannel {
    fn name(&self) -> &'static str {
        "print"
    }

    async fn deliver(&self, report: &ChangeReport) -> Result<()> {
        if report.changed_count == 0 {
            debug!("No changes to print");
            return Ok(());
        }

        let json = serde_json::to_string_pretty(report)
            .context("Failed to serialize change report")?;
        println!("{}", json);

        Ok(())
    }
}

/// Appends one JSON document per run to the change log file
pub struct LogFileChannel {
    path: PathBuf,
}

impl LogFileChannel {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl NotifyChannel for LogFileChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, report: &ChangeReport) -> Result<()> {
        if report.changed_count == 0 {
            debug!("No changes to log");
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await
                .context(format!("Failed to create log directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string(report)
            .context("Failed to serialize change report")?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(format!("Failed to open change log: {}", self.path.display()))?;

        file.write_all(json.as_bytes()).await
            .context("Failed to append to change log")?;
        file.write_all(b"\n").await
            .context("Failed to append to change log")?;

        info!("Change data appended to {}", self.path.display());

        Ok(())
    }
}

/// Desktop notification through notify-send
pub struct DesktopChannel;

#[async_trait]
impl NotifyChannel for DesktopChannel {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn deliver(&self, report: &ChangeReport) -> Result<()> {
        if report.changed_count == 0 {
            debug!("No changes to notify about");
            return Ok(());
        }

        if !notify_send_available() {
            warn!("Cannot find 'notify-send' on PATH, skipping desktop notification");
            return Ok(());
        }

        let headline = if report.changed_count == 1 {
            "1 change in followed sites".to_string()
        } else {
            format!("{} changes in followed sites", report.changed_count)
        };

        let body = affected_sites(&report.changes).join("\n");

        let status = tokio::process::Command::new("notify-send")
            .arg(&headline)
            .arg(&body)
            .status()
            .await
            .context("Failed to run notify-send")?;

        if !status.success() {
            anyhow::bail!("notify-send exited with {}", status);
        }

        info!("Sent a desktop notification about {} change(s)", report.changed_count);

        Ok(())
    }
}

fn notify_send_available() -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join("notify-send").is_file()))
        .unwrap_or(false)
}

/// Up to three distinct affected domains, with an ellipsis when the
/// change count exceeds what is listed
fn affected_sites(changes: &[ChangeEntry]) -> Vec<String> {
    let mut sites: Vec<String> = Vec::new();

    for change in changes {
        if sites.len() == 3 {
            break;
        }
        if !sites.contains(&change.domain) {
            sites.push(change.domain.clone());
        }
    }

    if sites.len() < changes.len() {
        sites.push("...".to_string());
    }

    sites
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(domain: &str) -> ChangeEntry {
        ChangeEntry {
            page_id: Uuid::new_v4(),
            url: format!("https://{}/", domain),
            domain: domain.to_string(),
            old_value: Some("a".into()),
            new_value: Some("b".into()),
        }
    }

    fn report(changes: Vec<ChangeEntry>) -> ChangeReport {
        ChangeReport {
            timestamp: 1_700_000_000,
            changed_count: changes.len(),
            changes,
        }
    }

    #[test]
    fn sites_list_caps_at_three_domains() {
        let sites = affected_sites(&[
            entry("a.example"),
            entry("b.example"),
            entry("c.example"),
            entry("d.example"),
        ]);
        assert_eq!(sites, vec!["a.example", "b.example", "c.example", "..."]);
    }

    #[test]
    fn duplicate_domains_are_listed_once() {
        let sites = affected_sites(&[entry("a.example"), entry("a.example")]);
        assert_eq!(sites, vec!["a.example", "..."]);
    }

    #[test]
    fn single_change_lists_its_domain_alone() {
        let sites = affected_sites(&[entry("a.example")]);
        assert_eq!(sites, vec!["a.example"]);
    }

    #[tokio::test]
    async fn log_channel_appends_one_line_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.log");
        let channel = LogFileChannel::new(path.clone());

        channel.deliver(&report(vec![entry("a.example")])).await.unwrap();
        channel.deliver(&report(vec![entry("b.example")])).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["changed_count"], 1);
        }
    }

    #[tokio::test]
    async fn log_channel_skips_empty_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.log");
        let channel = LogFileChannel::new(path.clone());

        channel.deliver(&report(vec![])).await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn print_channel_accepts_empty_reports() {
        PrintChannel.deliver(&report(vec![])).await.unwrap();
    }
}
