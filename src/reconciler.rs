//! One full reconciliation pass.
//!
//! Validates the model, renders it, reuses a verdict recorded for the same
//! fingerprint or advances the dry-run, records the outcome, and removes the
//! artifacts of every other fingerprint.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::check::{CheckNaming, CleanupReport, ConfigChecker, ValidationRecord};
use crate::cluster::{ClusterApi, ClusterObject, ObjectKind};
use crate::config::{CheckConfig, ConfigValidator, Fingerprint};
use crate::error::{Result, ValidationError};
use crate::render::Renderer;
use crate::state::{CheckResults, RecordedResult, ResultStore};

/// Runs validation passes for one configuration.
pub struct Reconciler<'a, S: ResultStore> {
    config: &'a CheckConfig,
    store: &'a S,
    cluster: &'a dyn ClusterApi,
    renderer: Renderer,
    cleanup: bool,
}

/// Result of a reconciliation pass.
#[derive(Debug, Serialize)]
pub struct ReconciliationResult {
    /// Fingerprint of the rendered configuration.
    pub fingerprint: Fingerprint,
    /// Outcome of the pass.
    pub record: ValidationRecord,
    /// The verdict was taken from the result store.
    pub reused: bool,
    /// Cleanup outcome, if cleanup ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
    /// Non-fatal errors encountered.
    pub errors: Vec<String>,
}

impl ReconciliationResult {
    /// Returns true once a verdict has been reached.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.record.ready
    }
}

/// Polling settings of [`Reconciler::wait_for_verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Delay between passes while the dry-run is still running.
    pub interval: Duration,
    /// Give up once this much time has passed.
    pub timeout: Duration,
}

/// A validation workload as seen by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadStatus {
    /// Pod name.
    pub name: String,
    /// Fingerprint label, if readable.
    pub fingerprint: Option<Fingerprint>,
    /// Reported phase.
    pub phase: String,
}

/// Current configuration, its recorded result and live workloads.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Fingerprint of the configuration as it renders now.
    pub fingerprint: Fingerprint,
    /// Recorded result for that fingerprint.
    pub recorded: Option<RecordedResult>,
    /// Other fingerprints still recorded.
    pub stale: Vec<Fingerprint>,
    /// Validation pods present in the namespace.
    pub workloads: Vec<WorkloadStatus>,
}

impl<'a, S: ResultStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(config: &'a CheckConfig, store: &'a S, cluster: &'a dyn ClusterApi) -> Self {
        Self {
            config,
            store,
            cluster,
            renderer: Renderer::new(),
            cleanup: true,
        }
    }

    /// Enables or disables cleanup of other fingerprints after a pass.
    #[must_use]
    pub const fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    fn checker(&self) -> ConfigChecker<'a> {
        ConfigChecker::new(self.cluster, &self.config.checker)
    }

    async fn load_results(&self) -> Result<CheckResults> {
        Ok(self.store.load().await?.unwrap_or_default())
    }

    /// Performs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the results cannot
    /// be loaded, or the validation pass fails.
    pub async fn reconcile(&self) -> Result<ReconciliationResult> {
        let validation = ConfigValidator::new().validate(self.config)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let rendered = self.renderer.render(&self.config.agent)?;
        let fingerprint = rendered.fingerprint();
        info!("Reconciling config {fingerprint}");

        let mut results = self.load_results().await?;
        let checker = self.checker();

        let (record, reused) = if let Some(record) = results.verdict(&fingerprint).cloned() {
            debug!("Reusing recorded verdict for {fingerprint}");
            results.current = Some(fingerprint.clone());
            (record, true)
        } else {
            let record = checker
                .check_config(&fingerprint, &rendered, &self.config.agent.secrets)
                .await?;
            results.record(fingerprint.clone(), record.clone());
            (record, false)
        };

        let mut errors = Vec::new();
        let mut cleanup = None;

        if self.cleanup {
            let retained = BTreeSet::from([fingerprint.clone()]);
            let known: Vec<Fingerprint> = results.fingerprints().cloned().collect();

            match checker.cleanup_with_known(&retained, known).await {
                Ok(report) => {
                    for removed in &report.removed {
                        results.forget(removed);
                    }
                    errors.extend(report.failures.iter().map(|f| {
                        format!("Failed to remove {} of {}: {}", f.resource, f.fingerprint, f.error)
                    }));
                    cleanup = Some(report);
                }
                Err(e) => {
                    warn!("Cleanup failed: {e}");
                    errors.push(format!("Cleanup failed: {e}"));
                }
            }
        }

        if let Err(e) = self.store.save(&results).await {
            error!("Failed to save results: {e}");
            errors.push(format!("Failed to save results: {e}"));
        }

        Ok(ReconciliationResult {
            fingerprint,
            record,
            reused,
            cleanup,
            errors,
        })
    }

    /// Runs passes until a verdict is reached or `options.timeout` expires.
    ///
    /// A pass failing with a retryable error (rate limiting, network) is
    /// retried after the delay the error suggests. Any other error ends the
    /// wait.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error. At the deadline, returns the
    /// last retryable error, or [`ValidationError::Timeout`] if the last pass
    /// succeeded without a verdict.
    pub async fn wait_for_verdict(&self, options: WaitOptions) -> Result<ReconciliationResult> {
        let started = Instant::now();

        loop {
            let (delay, outcome) = match self.reconcile().await {
                Ok(result) if result.is_ready() => return Ok(result),
                Ok(result) => {
                    debug!(
                        "Config {} not ready ({}), checking again in {}s",
                        result.fingerprint,
                        result.record.state,
                        options.interval.as_secs()
                    );
                    (options.interval, Ok(result.fingerprint))
                }
                Err(e) if e.is_retryable() => {
                    let delay = e
                        .retry_delay_secs()
                        .map_or(options.interval, Duration::from_secs);
                    warn!("Check pass failed, retrying in {}s: {e}", delay.as_secs());
                    (delay, Err(e))
                }
                Err(e) => return Err(e),
            };

            if started.elapsed() >= options.timeout {
                return Err(match outcome {
                    Ok(fingerprint) => ValidationError::Timeout {
                        fingerprint: fingerprint.to_string(),
                        secs: options.timeout.as_secs(),
                    }
                    .into(),
                    Err(e) => e,
                });
            }

            tokio::time::sleep(delay).await;
        }
    }

    /// Removes the artifacts of every fingerprint not in `keep` and forgets
    /// their recorded results.
    ///
    /// # Errors
    ///
    /// Returns an error if the results cannot be loaded or saved, or the
    /// artifacts cannot be listed.
    pub async fn cleanup(&self, keep: &BTreeSet<Fingerprint>) -> Result<CleanupReport> {
        let mut results = self.load_results().await?;
        let known: Vec<Fingerprint> = results.fingerprints().cloned().collect();

        let report = self.checker().cleanup_with_known(keep, known).await?;

        if !report.removed.is_empty() {
            for removed in &report.removed {
                results.forget(removed);
            }
            self.store.save(&results).await?;
        }

        Ok(report)
    }

    /// Reports the current fingerprint, its recorded result, and the
    /// validation pods that exist.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering, loading results or listing pods fails.
    pub async fn status(&self) -> Result<StatusReport> {
        let fingerprint = self.renderer.render(&self.config.agent)?.fingerprint();
        let results = self.load_results().await?;

        let naming = CheckNaming::new(&self.config.checker);
        let pods = self
            .cluster
            .list(ObjectKind::Pod, naming.namespace(), &naming.role_selector())
            .await?;

        let workloads = pods
            .into_iter()
            .filter_map(ClusterObject::into_pod)
            .map(|pod| WorkloadStatus {
                fingerprint: CheckNaming::fingerprint_of(&pod.metadata),
                phase: pod.raw_phase().unwrap_or("Pending").to_string(),
                name: pod.metadata.name,
            })
            .collect();

        Ok(StatusReport {
            recorded: results.get(&fingerprint).cloned(),
            stale: results
                .fingerprints()
                .filter(|fp| **fp != fingerprint)
                .cloned()
                .collect(),
            fingerprint,
            workloads,
        })
    }
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match (self.record.ready, self.record.valid) {
            (false, _) => "pending",
            (true, true) => "valid",
            (true, false) => "invalid",
        };
        writeln!(f, "Config {}: {verdict}", self.fingerprint)?;
        if self.reused {
            writeln!(f, "  (recorded verdict)")?;
        }
        if let Some(message) = &self.record.message {
            writeln!(f, "  {message}")?;
        }
        if let Some(cleanup) = &self.cleanup
            && !cleanup.removed.is_empty()
        {
            writeln!(f, "  Removed: {}", cleanup.removed.len())?;
        }

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}
