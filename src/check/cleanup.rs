//! Garbage collection of validation artifacts.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterObject, ObjectKind};
use crate::config::Fingerprint;
use crate::error::{ClusterError, Result};

use super::artifacts::CheckNaming;
use super::orchestrator::ConfigChecker;

/// A fingerprint whose artifacts could not all be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    /// The fingerprint left behind.
    pub fingerprint: Fingerprint,
    /// Kind and name of the object that could not be deleted.
    pub resource: String,
    /// The API error.
    pub error: String,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Fingerprints whose artifacts are fully gone.
    pub removed: Vec<Fingerprint>,
    /// Fingerprints that still have artifacts.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl ConfigChecker<'_> {
    /// Removes the artifacts of every fingerprint not in `retained`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the existing artifacts cannot be listed;
    /// per-fingerprint deletion failures are reported in the result.
    pub async fn cleanup(&self, retained: &BTreeSet<Fingerprint>) -> Result<CleanupReport> {
        self.cleanup_with_known(retained, std::iter::empty()).await
    }

    /// Like [`ConfigChecker::cleanup`], also considering fingerprints the
    /// caller knows of that may no longer carry discoverable objects.
    ///
    /// # Errors
    ///
    /// Returns an error only if the existing artifacts cannot be listed.
    pub async fn cleanup_with_known(
        &self,
        retained: &BTreeSet<Fingerprint>,
        known: impl IntoIterator<Item = Fingerprint> + Send,
    ) -> Result<CleanupReport> {
        let mut candidates = self.discover().await?;
        candidates.extend(known);

        let mut report = CleanupReport::default();

        for fingerprint in candidates.difference(retained) {
            match self.remove(fingerprint).await {
                Ok(()) => {
                    info!("Removed config check artifacts for {fingerprint}");
                    report.removed.push(fingerprint.clone());
                }
                Err((resource, error)) => {
                    warn!("Failed to remove {resource} for {fingerprint}: {error}");
                    report.failures.push(CleanupFailure {
                        fingerprint: fingerprint.clone(),
                        resource,
                        error: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Lists the fingerprints that currently have pods or secrets.
    async fn discover(&self) -> Result<BTreeSet<Fingerprint>> {
        let naming = self.naming();
        let selector = naming.role_selector();
        let mut found = BTreeSet::new();

        for kind in [ObjectKind::Pod, ObjectKind::Secret] {
            let objects = self
                .cluster()
                .list(kind, naming.namespace(), &selector)
                .await?;

            found.extend(
                objects
                    .iter()
                    .map(ClusterObject::metadata)
                    .filter_map(CheckNaming::fingerprint_of),
            );
        }

        debug!("Found config check artifacts for {} fingerprint(s)", found.len());
        Ok(found)
    }

    /// Deletes the pod, then the config secret, then the output secret.
    async fn remove(
        &self,
        fingerprint: &Fingerprint,
    ) -> std::result::Result<(), (String, ClusterError)> {
        let naming = self.naming();
        let targets = [
            (ObjectKind::Pod, naming.pod_name(fingerprint)),
            (ObjectKind::Secret, naming.config_name(fingerprint)),
            (ObjectKind::Secret, naming.output_name(fingerprint)),
        ];

        for (kind, name) in targets {
            match self.cluster().delete(kind, naming.namespace(), &name).await {
                Ok(()) => debug!("Deleted {kind} {name}"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err((format!("{kind} {name}"), e)),
            }
        }

        Ok(())
    }
}
