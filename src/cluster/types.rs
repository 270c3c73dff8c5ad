//! Object types exchanged with the orchestration API.
//!
//! Only the fields the checker reads or writes are modelled; everything else
//! the server returns is ignored on deserialization.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kinds of objects the checker manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// A secret holding configuration files.
    Secret,
    /// A pod running a dry-run.
    Pod,
}

impl ObjectKind {
    /// Returns the REST resource name for this kind.
    #[must_use]
    pub const fn resource(self) -> &'static str {
        match self {
            Self::Secret => "secrets",
            Self::Pod => "pods",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret => write!(f, "Secret"),
            Self::Pod => write!(f, "Pod"),
        }
    }
}

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name.
    #[serde(default)]
    pub name: String,
    /// Namespace of the object.
    #[serde(default)]
    pub namespace: String,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Creates metadata for a named object in a namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// A secret.
///
/// Data is written through `stringData`; the server answers with base64
/// `data`, which the checker never needs to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    /// Always `v1`.
    #[serde(default = "api_version_v1")]
    pub api_version: String,
    /// Always `Secret`.
    #[serde(default = "kind_secret")]
    pub kind: String,
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Plain-text data to store.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
    /// Encoded data as returned by the server.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Creates a secret holding `string_data`.
    #[must_use]
    pub fn new(metadata: ObjectMeta, string_data: BTreeMap<String, String>) -> Self {
        Self {
            api_version: api_version_v1(),
            kind: kind_secret(),
            metadata,
            string_data,
            data: BTreeMap::new(),
        }
    }
}

/// A pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    /// Always `v1`.
    #[serde(default = "api_version_v1")]
    pub api_version: String,
    /// Always `Pod`.
    #[serde(default = "kind_pod")]
    pub kind: String,
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: PodSpec,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

impl Pod {
    /// Creates a pod from its spec.
    #[must_use]
    pub fn new(metadata: ObjectMeta, spec: PodSpec) -> Self {
        Self {
            api_version: api_version_v1(),
            kind: kind_pod(),
            metadata,
            spec,
            status: None,
        }
    }

    /// Returns the reported phase string, if any.
    #[must_use]
    pub fn raw_phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }

    /// Parses the reported phase.
    ///
    /// A pod the scheduler has not reported on yet is `Pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the phase string is not a known phase.
    pub fn phase(&self) -> Result<PodPhase, UnknownPhase> {
        self.raw_phase()
            .map_or(Ok(PodPhase::Pending), |phase| phase.parse())
    }
}

/// Pod specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Restart policy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub restart_policy: String,
    /// Service account name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Node selector.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Containers.
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Taints the pod tolerates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    /// Scheduling affinity, passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<serde_json::Value>,
    /// Priority class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    /// Pod-level security context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,
}

/// A container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Image pull policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Volume mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Container-level security context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    /// Compute resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// A pod toleration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    /// Taint key matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// `Exists` or `Equal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Taint value matched by `Equal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Taint effect matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    /// How long a `NoExecute` taint is tolerated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

/// Security attributes applied to every container of a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    /// Refuse to start containers running as root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    /// User id of container processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    /// Group id of container processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    /// Group owning mounted volumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<i64>,
}

/// Security attributes of a single container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    /// User id of the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    /// Group id of the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    /// Refuse to start as root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    /// Mount the root filesystem read-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_root_filesystem: Option<bool>,
    /// Allow gaining more privileges than the parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,
    /// Run privileged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    /// SELinux labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub se_linux_options: Option<SeLinuxOptions>,
}

/// SELinux labels of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeLinuxOptions {
    /// SELinux user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// SELinux role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// SELinux type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// SELinux level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Resource limits and requests, as quantity strings (`100m`, `64Mi`).
///
/// Plain numbers are accepted on input and kept in their decimal form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Maximum amounts.
    #[serde(
        default,
        deserialize_with = "deserialize_quantities",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub limits: BTreeMap<String, String>,
    /// Guaranteed amounts.
    #[serde(
        default,
        deserialize_with = "deserialize_quantities",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub requests: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Text(String),
    Integer(i64),
    Decimal(f64),
}

fn deserialize_quantities<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Quantity>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, quantity)| {
            let text = match quantity {
                Quantity::Text(text) => text,
                Quantity::Integer(value) => value.to_string(),
                Quantity::Decimal(value) => value.to_string(),
            };
            (name, text)
        })
        .collect())
}

/// A volume mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name.
    pub name: String,
    /// Mount path.
    pub mount_path: String,
    /// Read-only flag.
    #[serde(default)]
    pub read_only: bool,
}

/// A pod volume.
///
/// Only secret sources are modelled. Volumes of other types, such as the
/// projected service-account token the API server injects, decode with no
/// source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name.
    pub name: String,
    /// Secret source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretVolumeSource>,
}

/// Secret volume source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVolumeSource {
    /// Name of the mounted secret.
    pub secret_name: String,
}

/// Observed pod state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    /// Lifecycle phase as reported.
    #[serde(default)]
    pub phase: Option<String>,
}

/// Pod lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    /// Accepted but not all containers are running.
    Pending,
    /// Bound to a node with containers running.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// At least one container terminated in failure.
    Failed,
    /// State could not be obtained.
    Unknown,
}

impl PodPhase {
    /// Returns true for phases that will still change.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Returns the phase as reported by the API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase string that is not one of the known phases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pod phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for PodPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Running" => Ok(Self::Running),
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            "Unknown" => Ok(Self::Unknown),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// An object of any managed kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterObject {
    /// A secret.
    Secret(Secret),
    /// A pod.
    Pod(Pod),
}

impl ClusterObject {
    /// Returns the kind of the object.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Secret(_) => ObjectKind::Secret,
            Self::Pod(_) => ObjectKind::Pod,
        }
    }

    /// Returns the object metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Secret(secret) => &secret.metadata,
            Self::Pod(pod) => &pod.metadata,
        }
    }

    /// Returns mutable object metadata.
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Secret(secret) => &mut secret.metadata,
            Self::Pod(pod) => &mut pod.metadata,
        }
    }

    /// Returns the pod, if this is one.
    #[must_use]
    pub fn into_pod(self) -> Option<Pod> {
        match self {
            Self::Pod(pod) => Some(pod),
            Self::Secret(_) => None,
        }
    }

    /// Returns the secret, if this is one.
    #[must_use]
    pub fn into_secret(self) -> Option<Secret> {
        match self {
            Self::Secret(secret) => Some(secret),
            Self::Pod(_) => None,
        }
    }
}

impl From<Secret> for ClusterObject {
    fn from(secret: Secret) -> Self {
        Self::Secret(secret)
    }
}

impl From<Pod> for ClusterObject {
    fn from(pod: Pod) -> Self {
        Self::Pod(pod)
    }
}

/// Equality-based label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    /// Creates an empty selector, which matches everything.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a `key=value` requirement.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns true if `labels` satisfy every requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }

    /// Renders the selector in query form (`a=b,c=d`).
    #[must_use]
    pub fn to_query(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn api_version_v1() -> String {
    String::from("v1")
}

fn kind_secret() -> String {
    String::from("Secret")
}

fn kind_pod() -> String {
    String::from("Pod")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parsing() {
        assert_eq!("Pending".parse::<PodPhase>(), Ok(PodPhase::Pending));
        assert_eq!("Succeeded".parse::<PodPhase>(), Ok(PodPhase::Succeeded));
        assert_eq!("Unknown".parse::<PodPhase>(), Ok(PodPhase::Unknown));
        assert_eq!(
            "Evicted".parse::<PodPhase>(),
            Err(UnknownPhase(String::from("Evicted")))
        );
        assert!(PodPhase::Running.is_active());
        assert!(!PodPhase::Failed.is_active());
    }

    #[test]
    fn test_missing_phase_is_pending() {
        let pod = Pod::new(ObjectMeta::new("logging", "p"), PodSpec::default());
        assert_eq!(pod.phase(), Ok(PodPhase::Pending));
    }

    #[test]
    fn test_secret_serializes_string_data() {
        let mut data = BTreeMap::new();
        data.insert(String::from("fluent-bit.conf"), String::from("[SERVICE]\n"));
        let secret = Secret::new(ObjectMeta::new("logging", "cfg"), data);

        let json = serde_json::to_value(&secret).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "Secret");
        assert_eq!(json["stringData"]["fluent-bit.conf"], "[SERVICE]\n");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_pod_deserializes_server_response() {
        let json = r#"{
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "p", "namespace": "logging", "uid": "123"},
            "spec": {"restartPolicy": "Never", "containers": [{"name": "c", "image": "i"}]},
            "status": {"phase": "Running", "hostIP": "10.0.0.1"}
        }"#;
        let pod: Pod = serde_json::from_str(json).unwrap();

        assert_eq!(pod.spec.restart_policy, "Never");
        assert_eq!(pod.phase(), Ok(PodPhase::Running));
    }

    #[test]
    fn test_pod_volumes_without_secret_source() {
        let json = r#"{
            "metadata": {"name": "p"},
            "spec": {
                "containers": [{
                    "name": "c",
                    "image": "i",
                    "resources": {"limits": {"cpu": "500m", "memory": "64Mi"}}
                }],
                "volumes": [
                    {"name": "config", "secret": {"secretName": "cfg"}},
                    {"name": "kube-api-access-x7k2p", "projected": {"sources": []}}
                ]
            }
        }"#;
        let pod: Pod = serde_json::from_str(json).unwrap();

        assert_eq!(pod.spec.volumes.len(), 2);
        assert!(pod.spec.volumes[1].secret.is_none());
        let resources = pod.spec.containers[0].resources.as_ref().unwrap();
        assert_eq!(resources.limits.get("cpu").map(String::as_str), Some("500m"));
        assert!(resources.requests.is_empty());
    }

    #[test]
    fn test_numeric_quantities_become_strings() {
        let resources: ResourceRequirements =
            serde_json::from_str(r#"{"requests": {"cpu": 0.5, "nvidia.com/gpu": 1}}"#).unwrap();

        assert_eq!(resources.requests.get("cpu").map(String::as_str), Some("0.5"));
        assert_eq!(
            resources.requests.get("nvidia.com/gpu").map(String::as_str),
            Some("1")
        );
        assert_eq!(
            serde_json::to_value(&resources).unwrap(),
            serde_json::json!({"requests": {"cpu": "0.5", "nvidia.com/gpu": "1"}})
        );
    }

    #[test]
    fn test_label_selector() {
        let selector = LabelSelector::new()
            .with("app.kubernetes.io/component", "configcheck")
            .with("app.kubernetes.io/managed-by", "logship");

        let mut labels = BTreeMap::new();
        labels.insert(String::from("app.kubernetes.io/component"), String::from("configcheck"));
        assert!(!selector.matches(&labels));

        labels.insert(String::from("app.kubernetes.io/managed-by"), String::from("logship"));
        assert!(selector.matches(&labels));
        assert!(LabelSelector::new().matches(&BTreeMap::new()));
        assert_eq!(
            selector.to_query(),
            "app.kubernetes.io/component=configcheck,app.kubernetes.io/managed-by=logship"
        );
    }
}
