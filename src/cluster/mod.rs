//! Orchestration API integration module.
//!
//! This module provides the object model for secrets and pods, the
//! [`ClusterApi`] seam the checker is written against, an HTTP client for a
//! real API server, and an in-memory implementation.

mod api;
mod client;
mod memory;
mod types;

#[cfg(test)]
pub use api::MockClusterApi;
pub use api::{ClusterApi, ClusterResult};
pub use client::KubeClient;
pub use memory::MemoryCluster;
pub use types::{
    ClusterObject, Container, LabelSelector, ObjectKind, ObjectMeta, Pod, PodPhase,
    PodSecurityContext, PodSpec, PodStatus, ResourceRequirements, SeLinuxOptions, Secret,
    SecretVolumeSource, SecurityContext, Toleration, UnknownPhase, Volume, VolumeMount,
};
