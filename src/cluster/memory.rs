//! In-process orchestration API.
//!
//! Keeps objects in a map and follows the same create/delete conflict rules
//! as the real API. Pods are stored with phase `Pending`; callers move them
//! through their lifecycle with [`MemoryCluster::set_pod_phase`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ClusterError;

use super::api::{ClusterApi, ClusterResult};
use super::types::{ClusterObject, LabelSelector, ObjectKind, PodPhase, PodStatus};

type ObjectKey = (ObjectKind, String, String);

/// Orchestration API backed by an in-memory map.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    objects: Mutex<BTreeMap<ObjectKey, ClusterObject>>,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<ObjectKey, ClusterObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(kind: ObjectKind, namespace: &str, name: &str) -> ObjectKey {
        (kind, namespace.to_string(), name.to_string())
    }

    /// Sets the reported phase of a pod. `None` clears it.
    ///
    /// Returns false if the pod does not exist.
    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: Option<&str>) -> bool {
        let mut objects = self.objects();
        match objects.get_mut(&Self::key(ObjectKind::Pod, namespace, name)) {
            Some(ClusterObject::Pod(pod)) => {
                pod.status = Some(PodStatus {
                    phase: phase.map(String::from),
                });
                true
            }
            _ => false,
        }
    }

    /// Returns true if the object exists.
    #[must_use]
    pub fn contains(&self, kind: ObjectKind, namespace: &str, name: &str) -> bool {
        self.objects()
            .contains_key(&Self::key(kind, namespace, name))
    }

    /// Returns the names of all objects of a kind, sorted.
    #[must_use]
    pub fn names(&self, kind: ObjectKind) -> Vec<String> {
        self.objects()
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Returns the number of objects of a kind.
    #[must_use]
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.names(kind).len()
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn create(&self, mut object: ClusterObject) -> ClusterResult<ClusterObject> {
        let meta = object.metadata();
        let key = Self::key(object.kind(), &meta.namespace, &meta.name);

        let mut objects = self.objects();
        if objects.contains_key(&key) {
            return Err(ClusterError::already_exists(key.0.to_string(), key.2));
        }

        if let ClusterObject::Pod(pod) = &mut object
            && pod.raw_phase().is_none()
        {
            pod.status = Some(PodStatus {
                phase: Some(PodPhase::Pending.to_string()),
            });
        }

        objects.insert(key, object.clone());
        Ok(object)
    }

    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<ClusterObject> {
        self.objects()
            .get(&Self::key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::not_found(kind.to_string(), name))
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<ClusterObject>> {
        Ok(self
            .objects()
            .iter()
            .filter(|((k, ns, _), object)| {
                *k == kind && ns == namespace && selector.matches(&object.metadata().labels)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClusterResult<()> {
        self.objects()
            .remove(&Self::key(kind, namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found(kind.to_string(), name))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::{ObjectMeta, Pod, PodSpec, Secret};

    fn labelled_secret(name: &str, role: &str) -> ClusterObject {
        let mut meta = ObjectMeta::new("logging", name);
        meta.labels.insert(String::from("role"), role.to_string());
        Secret::new(meta, BTreeMap::new()).into()
    }

    #[tokio::test]
    async fn test_create_conflict_and_delete_not_found() {
        let cluster = MemoryCluster::new();

        cluster.create(labelled_secret("a", "x")).await.unwrap();
        let err = cluster.create(labelled_secret("a", "x")).await.unwrap_err();
        assert!(err.is_already_exists());

        cluster.delete(ObjectKind::Secret, "logging", "a").await.unwrap();
        let err = cluster
            .delete(ObjectKind::Secret, "logging", "a")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_created_pod_is_pending() {
        let cluster = MemoryCluster::new();
        let pod = Pod::new(ObjectMeta::new("logging", "p"), PodSpec::default());

        let created = cluster.create(pod.into()).await.unwrap().into_pod().unwrap();
        assert_eq!(created.phase(), Ok(PodPhase::Pending));

        assert!(cluster.set_pod_phase("logging", "p", Some("Succeeded")));
        assert!(!cluster.set_pod_phase("logging", "missing", Some("Succeeded")));

        let fetched = cluster
            .get(ObjectKind::Pod, "logging", "p")
            .await
            .unwrap()
            .into_pod()
            .unwrap();
        assert_eq!(fetched.phase(), Ok(PodPhase::Succeeded));
    }

    #[tokio::test]
    async fn test_list_filters_kind_namespace_and_labels() {
        let cluster = MemoryCluster::new();
        cluster.create(labelled_secret("a", "check")).await.unwrap();
        cluster.create(labelled_secret("b", "other")).await.unwrap();
        cluster
            .create(Pod::new(ObjectMeta::new("logging", "a"), PodSpec::default()).into())
            .await
            .unwrap();

        let found = cluster
            .list(
                ObjectKind::Secret,
                "logging",
                &LabelSelector::new().with("role", "check"),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata().name, "a");

        let none = cluster
            .list(ObjectKind::Secret, "elsewhere", &LabelSelector::new())
            .await
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(cluster.count(ObjectKind::Secret), 2);
        assert_eq!(cluster.names(ObjectKind::Pod), vec![String::from("a")]);
    }
}
