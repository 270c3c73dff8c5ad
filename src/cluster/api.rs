//! The orchestration API seam.

use async_trait::async_trait;

use crate::error::ClusterError;

use super::types::{ClusterObject, LabelSelector, ObjectKind};

/// Result type for orchestration API calls.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Object operations the checker needs from the orchestration API.
///
/// Implementations must report [`ClusterError::AlreadyExists`] on a create
/// conflict and [`ClusterError::NotFound`] for missing objects; the checker
/// treats both as success where that keeps its operations idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Creates an object and returns it as stored.
    async fn create(&self, object: ClusterObject) -> ClusterResult<ClusterObject>;

    /// Fetches an object by name.
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<ClusterObject>;

    /// Lists objects of a kind matching `selector`.
    async fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<ClusterObject>>;

    /// Deletes an object by name.
    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClusterResult<()>;

    /// Returns a short name of the backend for logs.
    fn backend_name(&self) -> &'static str;
}
