//! Configuration specification types for the config check core.
//!
//! This module defines the structs that map to the `configcheck.yaml` file:
//! the checker settings (where and how dry-runs are executed) and the agent
//! model that gets rendered into the agent's own configuration format.

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::cluster::{PodSecurityContext, ResourceRequirements, SecurityContext, Toleration};
use crate::render::STOCK_CONFIG_PATH;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckConfig {
    /// Settings for the validation workloads.
    #[serde(default)]
    pub checker: CheckerSettings,
    /// The agent configuration model to render and validate.
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Settings controlling where and how validation workloads run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckerSettings {
    /// Namespace holding the validation artifacts and workloads.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Prefix of every artifact name (`<prefix>-configcheck-<fingerprint>`).
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Agent image used for dry-runs.
    #[serde(default = "default_image")]
    pub image: String,
    /// Image pull policy of the dry-run container.
    #[serde(default)]
    pub image_pull_policy: Option<String>,
    /// Service account of the dry-run pod.
    #[serde(default)]
    pub service_account: Option<String>,
    /// Node selector of the dry-run pod.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    /// Extra annotations of the dry-run pod.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Tolerations of the dry-run pod.
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
    /// Affinity of the dry-run pod, in the orchestrator's own schema.
    #[serde(default)]
    pub affinity: Option<serde_json::Value>,
    /// Priority class of the dry-run pod.
    #[serde(default)]
    pub priority_class_name: Option<String>,
    /// Pod-level security context of the dry-run pod.
    #[serde(default)]
    pub pod_security_context: Option<PodSecurityContext>,
    /// Security context of the dry-run container.
    #[serde(default)]
    pub security_context: Option<SecurityContext>,
    /// Resource limits and requests of the dry-run container.
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    /// Secret holding the forward output TLS material, mounted when set.
    #[serde(default)]
    pub tls_secret: Option<String>,
    /// Orchestration API connection settings.
    #[serde(default)]
    pub cluster: ClusterSettings,
    /// Path of the local result store directory.
    #[serde(default)]
    pub results_path: Option<String>,
}

/// Orchestration API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterSettings {
    /// Base URL of the API server.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token. Prefer `KUBE_TOKEN` over storing it in the file.
    #[serde(default)]
    pub token: Option<String>,
    /// PEM bundle trusted for the API server certificate.
    #[serde(default)]
    pub ca_file: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// The agent configuration model.
///
/// Field order here is the section order of the rendered file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    /// Service-wide settings.
    #[serde(default)]
    pub service: ServiceConfig,
    /// The tail input.
    #[serde(default)]
    pub input: InputConfig,
    /// Skips the kubernetes metadata filter.
    #[serde(default)]
    pub disable_kubernetes_filter: bool,
    /// Kubernetes filter entries.
    #[serde(default)]
    pub kubernetes_filter: KeyValues,
    /// AWS metadata filter entries; the filter is emitted when present.
    #[serde(default)]
    pub aws_filter: Option<KeyValues>,
    /// Modify filters, one block each.
    #[serde(default)]
    pub filter_modify: Vec<ModifyFilter>,
    /// Forward protocol output.
    #[serde(default)]
    pub forward_output: Option<ForwardOutput>,
    /// TCP json-lines output.
    #[serde(default)]
    pub tcp_output: Option<TcpOutput>,
    /// Custom parser definitions, rendered verbatim into their own file.
    #[serde(default)]
    pub custom_parsers: Option<String>,
    /// Secret data the outputs reference (credentials and the like).
    #[serde(default)]
    pub secrets: KeyValues,
}

/// Service-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Flush interval in seconds.
    #[serde(default = "default_flush")]
    pub flush: u32,
    /// Grace period on shutdown in seconds.
    #[serde(default = "default_grace")]
    pub grace: u32,
    /// Agent log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Stock parsers file.
    #[serde(default = "default_parsers")]
    pub default_parsers: String,
    /// Coroutine stack size in bytes.
    #[serde(default = "default_coro_stack_size")]
    pub coro_stack_size: u32,
    /// Built-in HTTP monitoring server.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Buffer storage entries (`storage.*`).
    #[serde(default)]
    pub buffer_storage: KeyValues,
}

/// Built-in HTTP monitoring server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Whether the monitoring server is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Listening port.
    #[serde(default = "default_monitor_port")]
    pub port: u16,
}

/// The tail input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputConfig {
    /// Input entries in emission order.
    #[serde(default)]
    pub values: KeyValues,
    /// Extra parsers, emitted as `Parser_<index>`.
    #[serde(default)]
    pub parser_n: Vec<String>,
    /// Multiline parser chain.
    #[serde(default)]
    pub multiline_parser: Vec<String>,
}

/// A modify filter block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifyFilter {
    /// Conditions gating the rules.
    #[serde(default)]
    pub conditions: Vec<ModifyOperation>,
    /// Rules applied to matching records.
    #[serde(default)]
    pub rules: Vec<ModifyOperation>,
}

/// A single modify condition or rule: `Op Key [Value]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifyOperation {
    /// Operation name, e.g. `Rename` or `Key_value_equals`.
    pub op: String,
    /// Record key.
    pub key: String,
    /// Optional operand.
    #[serde(default)]
    pub value: Option<String>,
}

/// A destination endpoint, optionally scoped to a namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputTarget {
    /// Destination host.
    pub host: String,
    /// Destination port.
    pub port: u16,
    /// Namespace whose records are routed here; `*` means all.
    #[serde(default = "default_target_namespace")]
    pub namespace: String,
}

/// Forward protocol output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardOutput {
    /// One output block per target.
    #[serde(default)]
    pub targets: Vec<OutputTarget>,
    /// Upstream (load-balanced node list) settings.
    #[serde(default)]
    pub upstream: UpstreamSettings,
    /// TLS settings.
    #[serde(default)]
    pub tls: TlsSettings,
    /// Network options.
    #[serde(default)]
    pub network: NetworkOptions,
    /// Additional output entries in emission order.
    #[serde(default)]
    pub options: KeyValues,
}

/// TCP json-lines output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TcpOutput {
    /// One output block per target.
    #[serde(default)]
    pub targets: Vec<OutputTarget>,
    /// Key holding the record timestamp.
    #[serde(default)]
    pub json_date_key: String,
    /// Timestamp format.
    #[serde(default)]
    pub json_date_format: String,
    /// Number of output workers.
    #[serde(default)]
    pub workers: Option<u32>,
    /// Network options.
    #[serde(default)]
    pub network: NetworkOptions,
}

/// Upstream settings of the forward output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Route through the upstream file instead of host/port.
    #[serde(default)]
    pub enabled: bool,
    /// Upstream definition.
    #[serde(default)]
    pub config: UpstreamConfig,
}

/// Upstream definition rendered into its own file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Upstream name.
    #[serde(default = "default_upstream_name")]
    pub name: String,
    /// Nodes in emission order.
    #[serde(default)]
    pub nodes: Vec<UpstreamNode>,
}

/// A single upstream node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamNode {
    /// Node name.
    pub name: String,
    /// Node host.
    pub host: String,
    /// Node port.
    pub port: u16,
}

/// TLS settings of the forward output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsSettings {
    /// Whether TLS is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Shared key for the forward handshake.
    #[serde(default)]
    pub shared_key: String,
}

/// Network options shared by the outputs.
///
/// `Option` fields distinguish unset from an explicit `false` or `0`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkOptions {
    /// `net.connect_timeout` in seconds.
    #[serde(default)]
    pub connect_timeout: Option<u32>,
    /// `net.connect_timeout_log_error`.
    #[serde(default)]
    pub connect_timeout_log_error: Option<bool>,
    /// `net.dns.mode` (`UDP` or `TCP`).
    #[serde(default)]
    pub dns_mode: String,
    /// `net.dns.prefer_ipv4`.
    #[serde(default)]
    pub dns_prefer_ipv4: Option<bool>,
    /// `net.dns.resolver` (`LEGACY` or `ASYNC`).
    #[serde(default)]
    pub dns_resolver: String,
    /// `net.keepalive`.
    #[serde(default)]
    pub keepalive: Option<bool>,
    /// `net.keepalive_idle_timeout` in seconds.
    #[serde(default)]
    pub keepalive_idle_timeout: Option<u32>,
    /// `net.keepalive_max_recycle`.
    #[serde(default)]
    pub keepalive_max_recycle: Option<u32>,
    /// `net.source_address`.
    #[serde(default)]
    pub source_address: String,
}

/// Ordered key/value entries.
///
/// Serialized as a mapping; insertion order is kept because it is the order
/// in which lines are emitted. Scalar values of any YAML type are accepted
/// and stored as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues(Vec<(String, String)>);

// Default value functions

fn default_namespace() -> String {
    String::from("logging")
}

fn default_name_prefix() -> String {
    String::from("fluentbit")
}

fn default_image() -> String {
    String::from("fluent/fluent-bit:3.1.4")
}

fn default_api_url() -> String {
    String::from("https://kubernetes.default.svc")
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_flush() -> u32 {
    1
}

const fn default_grace() -> u32 {
    5
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_parsers() -> String {
    format!("{STOCK_CONFIG_PATH}/parsers.conf")
}

const fn default_coro_stack_size() -> u32 {
    24576
}

const fn default_monitor_port() -> u16 {
    2020
}

fn default_target_namespace() -> String {
    String::from("*")
}

fn default_upstream_name() -> String {
    String::from("forward-upstream")
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            name_prefix: default_name_prefix(),
            image: default_image(),
            image_pull_policy: None,
            service_account: None,
            node_selector: BTreeMap::new(),
            annotations: BTreeMap::new(),
            tolerations: Vec::new(),
            affinity: None,
            priority_class_name: None,
            pod_security_context: None,
            security_context: None,
            resources: None,
            tls_secret: None,
            cluster: ClusterSettings::default(),
            results_path: None,
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            ca_file: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            input: InputConfig::default(),
            disable_kubernetes_filter: false,
            kubernetes_filter: KeyValues::default(),
            aws_filter: None,
            filter_modify: Vec::new(),
            forward_output: None,
            tcp_output: None,
            custom_parsers: None,
            secrets: KeyValues::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            flush: default_flush(),
            grace: default_grace(),
            log_level: default_log_level(),
            default_parsers: default_parsers(),
            coro_stack_size: default_coro_stack_size(),
            monitor: MonitorConfig::default(),
            buffer_storage: KeyValues::default(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_monitor_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: default_upstream_name(),
            nodes: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Returns true if the forward output routes through the upstream file.
    #[must_use]
    pub fn upstream_enabled(&self) -> bool {
        self.forward_output
            .as_ref()
            .is_some_and(|out| out.upstream.enabled)
    }

    /// Returns the number of output blocks the model produces.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.forward_output.as_ref().map_or(0, |o| o.targets.len())
            + self.tcp_output.as_ref().map_or(0, |o| o.targets.len())
    }

    /// Returns the custom parser definitions if they are non-blank.
    #[must_use]
    pub fn custom_parsers(&self) -> Option<&str> {
        self.custom_parsers
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

impl OutputTarget {
    /// Creates a target routing every namespace.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            namespace: default_target_namespace(),
        }
    }

    /// Scopes the target to a namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Returns the `Match` pattern selecting this target's records.
    #[must_use]
    pub fn match_pattern(&self) -> String {
        if self.namespace.is_empty() || self.namespace == "*" {
            String::from("*")
        } else {
            format!("*_{}_*", self.namespace)
        }
    }
}

impl ModifyOperation {
    /// Creates an operation.
    #[must_use]
    pub fn new(op: impl Into<String>, key: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            op: op.into(),
            key: key.into(),
            value: value.map(String::from),
        }
    }
}

impl KeyValues {
    /// Creates an empty set of entries.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an entry, replacing the value in place if the key exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Builder-style [`KeyValues::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (key, value) in iter {
            values.insert(key, value);
        }
        values
    }
}

impl Serialize for KeyValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for KeyValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyValuesVisitor;

        impl<'de> Visitor<'de> for KeyValuesVisitor {
            type Value = KeyValues;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of keys to scalar values")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(KeyValues::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut values = KeyValues::new();
                while let Some((key, ScalarString(value))) = map.next_entry::<String, ScalarString>()? {
                    values.insert(key, value);
                }
                Ok(values)
            }
        }

        deserializer.deserialize_any(KeyValuesVisitor)
    }
}

/// A YAML scalar of any type, kept as its string form.
struct ScalarString(String);

impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl Visitor<'_> for ScalarVisitor {
            type Value = ScalarString;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(ScalarString(v))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(ScalarString(if v { "On" } else { "Off" }.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(ScalarString(String::new()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}
