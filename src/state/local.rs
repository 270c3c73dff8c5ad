//! Local file-based result storage backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{CheckError, Result, StoreError};

use super::store::ResultStore;
use super::types::{CheckResults, RESULTS_VERSION};

/// Default results directory name.
const RESULTS_DIR: &str = ".configcheck";

/// Results file name.
const RESULTS_FILE: &str = "results.json";

/// Local file-based result store.
#[derive(Debug)]
pub struct LocalResultStore {
    base_dir: PathBuf,
    results_path: PathBuf,
}

impl LocalResultStore {
    /// Creates a store under `.configcheck` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| CheckError::internal(format!("Cannot determine current directory: {e}")))?
            .join(RESULTS_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let results_path = base_dir.join(RESULTS_FILE);
        Self {
            base_dir,
            results_path,
        }
    }

    /// Creates a store from a custom results file path.
    #[must_use]
    pub fn with_results_path(results_path: impl Into<PathBuf>) -> Self {
        let results_path = results_path.into();
        let base_dir = results_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            base_dir,
            results_path,
        }
    }

    /// Returns the results file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.results_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating results directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StoreError::write(format!("Failed to create results directory: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for LocalResultStore {
    async fn load(&self) -> Result<Option<CheckResults>> {
        if !self.results_path.exists() {
            debug!("Results file does not exist: {}", self.results_path.display());
            return Ok(None);
        }

        debug!("Loading results from: {}", self.results_path.display());

        let content = fs::read_to_string(&self.results_path)
            .await
            .map_err(|e| StoreError::Corrupted {
                message: format!("Failed to read results file: {e}"),
            })?;

        let results: CheckResults =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupted {
                message: format!("Failed to parse results file: {e}"),
            })?;

        if results.version != RESULTS_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: RESULTS_VERSION.to_string(),
                found: results.version,
            }
            .into());
        }

        Ok(Some(results))
    }

    async fn save(&self, results: &CheckResults) -> Result<()> {
        self.ensure_dir().await?;

        debug!("Saving results to: {}", self.results_path.display());

        let content = serde_json::to_string_pretty(results)
            .map_err(|e| StoreError::serialization(format!("Failed to serialize results: {e}")))?;

        let temp_path = self.results_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StoreError::write(format!("Failed to create temp results file: {e}")))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StoreError::write(format!("Failed to write results file: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| StoreError::write(format!("Failed to sync results file: {e}")))?;

        fs::rename(&temp_path, &self.results_path)
            .await
            .map_err(|e| StoreError::write(format!("Failed to rename results file: {e}")))?;

        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.results_path.exists() {
            info!("Deleting results file: {}", self.results_path.display());
            fs::remove_file(&self.results_path)
                .await
                .map_err(|e| StoreError::write(format!("Failed to delete results file: {e}")))?;
        }
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.results_path.exists())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::ValidationRecord;
    use crate::config::Fingerprint;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalResultStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalResultStore::with_base_dir(temp_dir.path().join("results"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();
        let fp = Fingerprint::parse("00000000000000aa").unwrap();

        let mut results = CheckResults::new();
        results.record(fp.clone(), ValidationRecord::invalid("rejected"));
        store.save(&results).await.expect("Failed to save results");

        let loaded = store
            .load()
            .await
            .expect("Failed to load results")
            .expect("Results should exist");

        assert_eq!(loaded, results);
        assert_eq!(loaded.verdict(&fp).map(|r| r.valid), Some(false));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.expect("Load should not fail").is_none());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (store, _temp) = create_test_store();
        assert!(!store.exists().await.unwrap());

        store.save(&CheckResults::new()).await.unwrap();
        assert!(store.exists().await.unwrap());

        store.delete().await.unwrap();
        assert!(!store.exists().await.unwrap());
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupted_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("results.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = LocalResultStore::with_results_path(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, CheckError::Store(StoreError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (store, _temp) = create_test_store();
        let results = CheckResults {
            version: String::from("0.1"),
            ..CheckResults::new()
        };
        store.save(&results).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(
            err,
            CheckError::Store(StoreError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_boxed_store() {
        let (store, _temp) = create_test_store();
        let boxed: Box<dyn ResultStore> = Box::new(store);

        assert_eq!(boxed.backend_type(), "local");
        boxed.save(&CheckResults::new()).await.unwrap();
        tokio_test::assert_ok!(boxed.load().await);
    }
}
