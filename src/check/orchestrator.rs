//! Hash-keyed validation of rendered configurations.
//!
//! Each pass advances the validation of one fingerprint as far as it can
//! without waiting: ensure the artifacts, respect the throttle, then observe
//! or create the dry-run pod. Callers repeat the pass until the returned
//! record is ready.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterApi, ClusterObject, ObjectKind, PodPhase};
use crate::config::{CheckerSettings, ConfigHasher, Fingerprint, KeyValues};
use crate::error::{ClusterError, Result, ValidationError};
use crate::render::RenderedConfig;

use super::artifacts::{CheckNaming, DIGEST_ANNOTATION, ValidationArtifactSet};
use super::workload::dry_run_pod;

/// How far the validation of a fingerprint has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    /// Nothing is known about the fingerprint.
    Unknown,
    /// The artifact set exists; no workload has been observed yet.
    ArtifactsEnsured,
    /// The workload exists and has not terminated.
    WorkloadPendingOrRunning,
    /// The dry-run accepted the config.
    WorkloadSucceeded,
    /// The dry-run rejected the config.
    WorkloadFailed,
}

impl CheckState {
    /// Returns true if the verdict is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::WorkloadSucceeded | Self::WorkloadFailed)
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::ArtifactsEnsured => "artifacts-ensured",
            Self::WorkloadPendingOrRunning => "pending",
            Self::WorkloadSucceeded => "valid",
            Self::WorkloadFailed => "invalid",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// The dry-run accepted the config. Meaningful only when `ready`.
    pub valid: bool,
    /// A verdict has been reached.
    pub ready: bool,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// State reached by the pass.
    pub state: CheckState,
}

impl ValidationRecord {
    /// A final "valid" verdict.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            valid: true,
            ready: true,
            message: None,
            state: CheckState::WorkloadSucceeded,
        }
    }

    /// A final "invalid" verdict.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            ready: true,
            message: Some(message.into()),
            state: CheckState::WorkloadFailed,
        }
    }

    /// No verdict yet.
    #[must_use]
    pub fn not_ready(state: CheckState, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            ready: false,
            message: Some(message.into()),
            state,
        }
    }
}

/// Drives validation workloads against an orchestration API.
pub struct ConfigChecker<'a> {
    cluster: &'a dyn ClusterApi,
    settings: &'a CheckerSettings,
    naming: CheckNaming,
}

impl<'a> ConfigChecker<'a> {
    /// Creates a checker.
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterApi, settings: &'a CheckerSettings) -> Self {
        Self {
            cluster,
            settings,
            naming: CheckNaming::new(settings),
        }
    }

    /// Returns the naming scheme in use.
    #[must_use]
    pub const fn naming(&self) -> &CheckNaming {
        &self.naming
    }

    pub(super) fn cluster(&self) -> &'a dyn ClusterApi {
        self.cluster
    }

    /// Runs one validation pass for `fingerprint`.
    ///
    /// Returns `ready = false` while the verdict is pending, including when
    /// another validation workload is still active.
    ///
    /// # Errors
    ///
    /// Returns an error if an API call fails, the workload reports a phase
    /// that cannot be interpreted, or `fingerprint` already names artifacts
    /// of different content.
    pub async fn check_config(
        &self,
        fingerprint: &Fingerprint,
        rendered: &RenderedConfig,
        secrets: &KeyValues,
    ) -> Result<ValidationRecord> {
        let namespace = self.naming.namespace();
        debug!("Checking config {fingerprint} in namespace {namespace}");

        self.ensure_artifacts(fingerprint, rendered, secrets).await?;

        let pod_name = self.naming.pod_name(fingerprint);
        if let Some(record) = self.throttle(&pod_name).await? {
            return Ok(record);
        }

        match self.cluster.get(ObjectKind::Pod, namespace, &pod_name).await {
            Ok(object) => {
                let Some(pod) = object.into_pod() else {
                    return Err(ClusterError::InvalidResponse {
                        message: format!("{pod_name} is not a pod"),
                    }
                    .into());
                };

                let phase = pod.phase().map_err(|e| ValidationError::UnexpectedPhase {
                    name: pod_name.clone(),
                    phase: e.0,
                })?;

                Self::verdict(&pod_name, phase)
            }
            Err(e) if e.is_not_found() => {
                self.create_workload(fingerprint).await?;
                Ok(ValidationRecord::not_ready(
                    CheckState::WorkloadPendingOrRunning,
                    format!("created config check pod {pod_name}"),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn verdict(pod_name: &str, phase: PodPhase) -> Result<ValidationRecord> {
        match phase {
            PodPhase::Succeeded => {
                info!("Config check pod {pod_name} succeeded, config is valid");
                Ok(ValidationRecord::valid())
            }
            PodPhase::Failed => {
                warn!("Config check pod {pod_name} failed, config is invalid");
                Ok(ValidationRecord::invalid(format!(
                    "dry-run rejected the config, see the logs of pod {pod_name}"
                )))
            }
            PodPhase::Pending | PodPhase::Running => {
                debug!("Config check pod {pod_name} is {phase}");
                Ok(ValidationRecord::not_ready(
                    CheckState::WorkloadPendingOrRunning,
                    format!("config check pod {pod_name} is {phase}"),
                ))
            }
            PodPhase::Unknown => Err(ValidationError::UnexpectedPhase {
                name: pod_name.to_string(),
                phase: phase.to_string(),
            }
            .into()),
        }
    }

    /// Creates the config and output secrets, tolerating existing ones.
    async fn ensure_artifacts(
        &self,
        fingerprint: &Fingerprint,
        rendered: &RenderedConfig,
        secrets: &KeyValues,
    ) -> Result<()> {
        let set = ValidationArtifactSet::build(&self.naming, fingerprint, rendered, secrets);
        let config_name = set.config_secret.metadata.name.clone();

        match self.cluster.create(set.config_secret.into()).await {
            Ok(_) => info!("Created config check secret {config_name}"),
            Err(e) if e.is_already_exists() => {
                self.verify_digest(fingerprint, &config_name, &rendered.digest())
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        let output_name = set.output_secret.metadata.name.clone();
        match self.cluster.create(set.output_secret.into()).await {
            Ok(_) => info!("Created config check output secret {output_name}"),
            Err(e) if e.is_already_exists() => {
                debug!("Config check output secret {output_name} already exists");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    /// Compares the digest stored on an existing config secret with ours.
    async fn verify_digest(
        &self,
        fingerprint: &Fingerprint,
        name: &str,
        digest: &str,
    ) -> Result<()> {
        let annotations = self
            .cluster
            .get(ObjectKind::Secret, self.naming.namespace(), name)
            .await?
            .into_secret()
            .map(|secret| secret.metadata.annotations)
            .unwrap_or_default();

        match annotations.get(DIGEST_ANNOTATION) {
            Some(stored) if ConfigHasher::digests_match(stored, digest) => {
                debug!("Config check secret {name} already exists");
                Ok(())
            }
            Some(stored) => Err(ValidationError::FingerprintCollision {
                fingerprint: fingerprint.to_string(),
                stored: stored.clone(),
                rendered: digest.to_string(),
            }
            .into()),
            None => {
                warn!("Config check secret {name} carries no digest, trusting its name");
                Ok(())
            }
        }
    }

    /// Returns a back-off record if any validation workload is active.
    ///
    /// The record is `WorkloadPendingOrRunning` when the active workload is
    /// `own_pod`.
    async fn throttle(&self, own_pod: &str) -> Result<Option<ValidationRecord>> {
        let pods = self
            .cluster
            .list(
                ObjectKind::Pod,
                self.naming.namespace(),
                &self.naming.role_selector(),
            )
            .await?;

        for pod in pods.into_iter().filter_map(ClusterObject::into_pod) {
            match pod.phase() {
                Ok(phase) if phase.is_active() => {
                    info!(
                        "Config check pod {} is {phase}, backing off",
                        pod.metadata.name
                    );
                    let state = if pod.metadata.name == own_pod {
                        CheckState::WorkloadPendingOrRunning
                    } else {
                        CheckState::ArtifactsEnsured
                    };
                    return Ok(Some(ValidationRecord::not_ready(
                        state,
                        format!(
                            "there are {} configcheck pods, need to back off",
                            phase.as_str().to_lowercase()
                        ),
                    )));
                }
                Ok(_) => {}
                Err(e) => debug!("Ignoring config check pod {}: {e}", pod.metadata.name),
            }
        }

        Ok(None)
    }

    async fn create_workload(&self, fingerprint: &Fingerprint) -> Result<()> {
        let pod = dry_run_pod(self.settings, &self.naming, fingerprint);
        let name = pod.metadata.name.clone();

        match self.cluster.create(pod.into()).await {
            Ok(_) => {
                info!("Created config check pod {name}");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("Config check pod {name} was created concurrently");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
