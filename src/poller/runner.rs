use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cli::config::{PageSpec, PollSettings};
use crate::extract::Extractor;
use crate::poller::evaluate::{evaluate, Outcome, RunResult};
use crate::poller::record::RecordStore;

/// Everything one run observed, in configured page order
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub results: Vec<RunResult>,
}

impl RunSummary {
    pub fn changed(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.outcome == Outcome::Changed)
    }

    pub fn changed_count(&self) -> usize {
        self.changed().count()
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == Outcome::Error).count()
    }
}

/// Drives one full pass over the configured pages: extract, evaluate,
/// persist, collect
pub struct PollRunner {
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn RecordStore>,
    pacing: PollSettings,
}

impl PollRunner {
    pub fn new(extractor: Arc<dyn Extractor>, store: Arc<dyn RecordStore>, pacing: PollSettings) -> Self {
        Self {
            extractor,
            store,
            pacing,
        }
    }

    /// Process every page once, in order. Page-level failures are
    /// captured in the results, never propagated: this function cannot
    /// abort a run once it has started.
    ///
    /// Returns the run summary and whether any page adopted a staged
    /// URL, in which case the page list must be rewritten to disk.
    pub async fn poll_pages(&self, pages: &mut [PageSpec]) -> (RunSummary, bool) {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(pages.len());
        let mut pages_dirty = false;

        if pages.is_empty() {
            warn!("No pages configured");
        }

        for (index, page) in pages.iter_mut().enumerate() {
            if index > 0 {
                self.pause_between_pages().await;
            }

            if page.adopt_pending_url() {
                pages_dirty = true;
            }

            let stored = match self.store.load(page.id).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Failed to load record for page {}: {}", page.id, e);
                    None
                }
            };

            let extraction = self.extractor.extract(page).await;
            let evaluation = evaluate(page, stored, extraction, Utc::now());

            match evaluation.result.outcome {
                Outcome::Changed => info!(
                    "{}: {} ({:?} -> {:?})",
                    page.domain(),
                    evaluation.result.outcome,
                    evaluation.result.old_value,
                    evaluation.result.new_value,
                ),
                Outcome::Unchanged => info!("{}: {}", page.domain(), evaluation.result.outcome),
                Outcome::Error => info!(
                    "{}: {} ({})",
                    page.domain(),
                    evaluation.result.outcome,
                    evaluation.result.error.as_deref().unwrap_or("unknown"),
                ),
            }

            if let Err(e) = self.store.save(page.id, &evaluation.record).await {
                // The outcome still gets reported; the stored state is
                // now one run behind and the next run may re-notify
                warn!("Record for page {} was not persisted: {}", page.id, e);
            }

            results.push(evaluation.result);
        }

        let summary = RunSummary {
            started_at,
            results,
        };

        info!(
            "Run finished: {} changed, {} errored, {} total",
            summary.changed_count(),
            summary.error_count(),
            summary.results.len(),
        );

        (summary, pages_dirty)
    }

    async fn pause_between_pages(&self) {
        if self.pacing.politeness_delay_ms == 0 {
            return;
        }

        let jitter = if self.pacing.politeness_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.pacing.politeness_jitter_ms)
        } else {
            0
        };

        let delay = Duration::from_millis(self.pacing.politeness_delay_ms + jitter);
        debug!("Waiting {:?} before the next page", delay);
        tokio::time::sleep(delay).await;
    }
}
