//! Result store trait definition.

use async_trait::async_trait;

use super::types::CheckResults;
use crate::error::Result;

/// Trait for result storage backends.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Loads the recorded results.
    ///
    /// Returns `None` if nothing has been stored yet.
    async fn load(&self) -> Result<Option<CheckResults>>;

    /// Saves the results.
    async fn save(&self, results: &CheckResults) -> Result<()>;

    /// Deletes the stored results.
    async fn delete(&self) -> Result<()>;

    /// Checks if results exist.
    async fn exists(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl ResultStore for Box<dyn ResultStore> {
    async fn load(&self) -> Result<Option<CheckResults>> {
        (**self).load().await
    }

    async fn save(&self, results: &CheckResults) -> Result<()> {
        (**self).save(results).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
