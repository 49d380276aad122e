use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::config::PageSpec;
use crate::extract::ExtractError;
use crate::poller::record::PageRecord;

/// What one evaluation concluded about a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Changed,
    Unchanged,
    Error,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Changed => write!(f, "CHANGED"),
            Outcome::Unchanged => write!(f, "UNCHANGED"),
            Outcome::Error => write!(f, "ERROR"),
        }
    }
}

/// Per-page result of one run. Built during the run, handed to the
/// notification dispatcher once, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub page_id: Uuid,
    pub url: String,
    pub outcome: Outcome,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An evaluation decision: what to report and what to persist
#[derive(Debug)]
pub struct Evaluation {
    pub result: RunResult,
    pub record: PageRecord,
}

/// Compare a fresh extraction against the stored record.
///
/// Comparison is exact string equality; the selector/regex stage is
/// responsible for narrowing to the meaningful substring, and fuzzy
/// matching here would silently mask real content drift.
pub fn evaluate(
    page: &PageSpec,
    stored: Option<PageRecord>,
    extraction: Result<String, ExtractError>,
    now: DateTime<Utc>,
) -> Evaluation {
    match extraction {
        Err(failure) => {
            // A transient outage must not look like the page changed:
            // keep the last known value untouched
            let last_value = stored.and_then(|r| r.last_value);

            Evaluation {
                result: RunResult {
                    page_id: page.id,
                    url: page.url.clone(),
                    outcome: Outcome::Error,
                    old_value: last_value.clone(),
                    new_value: None,
                    error: Some(failure.to_string()),
                },
                record: PageRecord {
                    last_value,
                    last_checked_at: now,
                    last_error: Some(failure.to_string()),
                },
            }
        }

        Ok(value) => {
            let previous = stored.and_then(|r| r.last_value);

            let outcome = match &previous {
                // First sighting: nothing to compare against, so this
                // is not a change
                None => Outcome::Unchanged,
                Some(old) if *old == value => Outcome::Unchanged,
                Some(_) => Outcome::Changed,
            };

            Evaluation {
                result: RunResult {
                    page_id: page.id,
                    url: page.url.clone(),
                    outcome,
                    old_value: previous,
                    new_value: Some(value.clone()),
                    error: None,
                },
                record: PageRecord {
                    last_value: Some(value),
                    last_checked_at: now,
                    last_error: None,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageSpec {
        PageSpec::new("https://example.com".into(), ".price".into(), None)
    }

    fn stored(value: Option<&str>, error: Option<&str>) -> PageRecord {
        PageRecord {
            last_value: value.map(|v| v.to_string()),
            last_checked_at: Utc::now() - chrono::Duration::hours(1),
            last_error: error.map(|e| e.to_string()),
        }
    }

    fn fetch_failure() -> Result<String, ExtractError> {
        Err(ExtractError::Fetch("connection refused".into()))
    }

    #[test]
    fn first_sighting_is_never_a_change() {
        let now = Utc::now();
        let eval = evaluate(&page(), None, Ok("10".into()), now);

        assert_eq!(eval.result.outcome, Outcome::Unchanged);
        assert_eq!(eval.result.old_value, None);
        assert_eq!(eval.result.new_value.as_deref(), Some("10"));
        assert_eq!(eval.record.last_value.as_deref(), Some("10"));
        assert_eq!(eval.record.last_checked_at, now);
        assert!(eval.record.last_error.is_none());
    }

    #[test]
    fn distinct_value_is_a_change_with_both_values() {
        let eval = evaluate(&page(), Some(stored(Some("10"), None)), Ok("12".into()), Utc::now());

        assert_eq!(eval.result.outcome, Outcome::Changed);
        assert_eq!(eval.result.old_value.as_deref(), Some("10"));
        assert_eq!(eval.result.new_value.as_deref(), Some("12"));
        assert_eq!(eval.record.last_value.as_deref(), Some("12"));
    }

    #[test]
    fn equal_value_is_unchanged_and_idempotent() {
        let first = evaluate(&page(), Some(stored(Some("10"), None)), Ok("10".into()), Utc::now());
        assert_eq!(first.result.outcome, Outcome::Unchanged);

        let second = evaluate(&page(), Some(first.record), Ok("10".into()), Utc::now());
        assert_eq!(second.result.outcome, Outcome::Unchanged);
        assert_eq!(second.record.last_value.as_deref(), Some("10"));
    }

    #[test]
    fn comparison_is_exact_no_normalization() {
        let eval = evaluate(&page(), Some(stored(Some("10"), None)), Ok("10 ".into()), Utc::now());
        assert_eq!(eval.result.outcome, Outcome::Changed);

        let eval = evaluate(&page(), Some(stored(Some("ok"), None)), Ok("OK".into()), Utc::now());
        assert_eq!(eval.result.outcome, Outcome::Changed);
    }

    #[test]
    fn failure_does_not_corrupt_the_stored_value() {
        let eval = evaluate(&page(), Some(stored(Some("10"), None)), fetch_failure(), Utc::now());

        assert_eq!(eval.result.outcome, Outcome::Error);
        assert_eq!(eval.result.old_value.as_deref(), Some("10"));
        assert_eq!(eval.result.new_value, None);
        assert!(eval.result.error.as_deref().unwrap().contains("connection refused"));
        // Only last_error and last_checked_at may move
        assert_eq!(eval.record.last_value.as_deref(), Some("10"));
        assert!(eval.record.last_error.is_some());
    }

    #[test]
    fn failure_on_a_new_page_creates_an_empty_record() {
        let eval = evaluate(&page(), None, fetch_failure(), Utc::now());

        assert_eq!(eval.result.outcome, Outcome::Error);
        assert_eq!(eval.result.old_value, None);
        assert!(eval.record.last_value.is_none());
        assert!(eval.record.last_error.is_some());
    }

    #[test]
    fn success_clears_a_previous_error() {
        let eval = evaluate(&page(), Some(stored(Some("10"), Some("timed out"))), Ok("10".into()), Utc::now());

        assert_eq!(eval.result.outcome, Outcome::Unchanged);
        assert!(eval.record.last_error.is_none());
    }

    #[test]
    fn recovery_after_outage_compares_against_pre_outage_value() {
        // Outage run
        let outage = evaluate(&page(), Some(stored(Some("10"), None)), fetch_failure(), Utc::now());
        // Recovery run with the same value as before the outage
        let recovery = evaluate(&page(), Some(outage.record), Ok("10".into()), Utc::now());

        assert_eq!(recovery.result.outcome, Outcome::Unchanged);
    }
}
