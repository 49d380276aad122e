use anyhow::{Result, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Persisted observation state for one monitored page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Last successfully observed text; None until the first successful
    /// extraction
    pub last_value: Option<String>,

    /// Timestamp of the last evaluation attempt, success or failure
    pub last_checked_at: DateTime<Utc>,

    /// Last failure detail; cleared on the next success
    pub last_error: Option<String>,
}

/// Trait for durable per-page record storage
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the record for a page. Absent for a page that has never
    /// been evaluated.
    async fn load(&self, page_id: Uuid) -> Result<Option<PageRecord>>;

    /// Atomically replace the record for a page
    async fn save(&self, page_id: Uuid, record: &PageRecord) -> Result<()>;

    /// Delete the record for a page
    async fn remove(&self, page_id: Uuid) -> Result<()>;
}

/// File-backed record store: one JSON file per page id, so each page's
/// record is an independent unit of persistence
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at the given directory, creating it if
    /// necessary
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .context(format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Self { data_dir })
    }

    fn record_path(&self, page_id: Uuid) -> PathBuf {
        self.data_dir.join(format!("{}.json", page_id))
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self, page_id: Uuid) -> Result<Option<PageRecord>> {
        let path = self.record_path(page_id);

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No record yet for page {}", page_id);
                return Ok(None);
            }
            Err(e) => {
                return Err(e).context(format!("Failed to read record file: {}", path.display()));
            }
        };

        match serde_json::from_str(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // A mangled record file must not take the page down;
                // treat it as a first observation
                warn!("Record file {} is corrupt ({}), treating page as new", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, page_id: Uuid, record: &PageRecord) -> Result<()> {
        let path = self.record_path(page_id);
        let tmp_path = self.data_dir.join(format!("{}.json.tmp", page_id));

        let contents = serde_json::to_string_pretty(record)
            .context("Failed to serialize page record")?;

        fs::write(&tmp_path, contents).await
            .context(format!("Failed to write record file: {}", tmp_path.display()))?;

        // Rename is atomic on the same filesystem; an interrupted save
        // leaves the previous record intact
        fs::rename(&tmp_path, &path).await
            .context(format!("Failed to replace record file: {}", path.display()))?;

        debug!("Saved record for page {}", page_id);

        Ok(())
    }

    async fn remove(&self, page_id: Uuid) -> Result<()> {
        let path = self.record_path(page_id);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed record for page {}", page_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("Failed to remove record file: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(value: Option<&str>, error: Option<&str>) -> PageRecord {
        PageRecord {
            last_value: value.map(|v| v.to_string()),
            last_checked_at: Utc::now(),
            last_error: error.map(|e| e.to_string()),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        let saved = record(Some("42"), None);
        store.save(id, &saved).await.unwrap();

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn load_absent_returns_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_record_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        std::fs::write(dir.path().join(format!("{}.json", id)), "{not json").unwrap();

        assert!(store.load(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        store.save(id, &record(Some("a"), None)).await.unwrap();
        store.save(id, &record(Some("b"), None)).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![format!("{}.json", id)]);

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.last_value.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn records_are_independent_per_page() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store.save(a, &record(Some("alpha"), None)).await.unwrap();
        store.save(b, &record(None, Some("timed out"))).await.unwrap();
        store.remove(a).await.unwrap();

        assert!(store.load(a).await.unwrap().is_none());
        let kept = store.load(b).await.unwrap().unwrap();
        assert_eq!(kept.last_error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn remove_absent_is_ok() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().to_path_buf()).unwrap();

        store.remove(Uuid::new_v4()).await.unwrap();
    }
}
