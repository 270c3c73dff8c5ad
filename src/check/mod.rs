//! Validation of rendered configurations by dry-run workloads.
//!
//! A rendered configuration is identified by its fingerprint. For each
//! fingerprint the checker creates a config secret, an output secret and a
//! pod running the agent with `--dry-run`; the pod's terminal phase is the
//! verdict. Stale fingerprints are garbage collected by [`ConfigChecker::cleanup`].

mod artifacts;
mod cleanup;
mod orchestrator;
mod workload;

pub use artifacts::{
    COMPONENT_LABEL, CheckNaming, DIGEST_ANNOTATION, FINGERPRINT_LABEL, ValidationArtifactSet,
};
pub use cleanup::{CleanupFailure, CleanupReport};
pub use orchestrator::{CheckState, ConfigChecker, ValidationRecord};
pub use workload::dry_run_pod;
