//! Configuration validation for check configurations.
//!
//! Catches model mistakes that would otherwise only surface as a failed
//! dry-run, and checks the settings the artifacts are named from.

use crate::error::{CheckError, ConfigError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{
    AgentConfig, CheckConfig, CheckerSettings, ForwardOutput, ModifyOperation, OutputTarget,
};

/// Longest prefix that still leaves room for the suffix and fingerprint
/// inside a 63-character resource name.
const MAX_NAME_PREFIX_LEN: usize = 28;

/// Validator for check configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<FieldError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a check configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &CheckConfig) -> Result<ValidationResult> {
        let result = self.inspect(config);

        if let Some(first_error) = result.errors.first() {
            return Err(CheckError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn inspect(&self, config: &CheckConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_checker(&config.checker, &mut result);
        Self::validate_agent(&config.agent, &mut result);

        result
    }

    fn validate_checker(checker: &CheckerSettings, result: &mut ValidationResult) {
        if checker.namespace.is_empty() {
            result.error("checker.namespace", "Namespace cannot be empty");
        }

        if checker.image.is_empty() {
            result.error("checker.image", "Agent image cannot be empty");
        } else if checker.image.ends_with(":latest") || !checker.image.contains(':') {
            result.warnings.push(format!(
                "checker.image: '{}' is not pinned; fingerprints stay stable but the dry-run binary may change",
                checker.image
            ));
        }

        if !is_valid_name(&checker.name_prefix) {
            result.error(
                "checker.name_prefix",
                format!(
                    "Name prefix '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    checker.name_prefix
                ),
            );
        } else if checker.name_prefix.len() > MAX_NAME_PREFIX_LEN {
            result.error(
                "checker.name_prefix",
                format!("Name prefix must be at most {MAX_NAME_PREFIX_LEN} characters"),
            );
        }

        if !checker.cluster.api_url.starts_with("https://")
            && !checker.cluster.api_url.starts_with("http://")
        {
            result.error(
                "checker.cluster.api_url",
                format!("API URL '{}' must be http(s)", checker.cluster.api_url),
            );
        }
    }

    fn validate_agent(agent: &AgentConfig, result: &mut ValidationResult) {
        if agent.output_count() == 0 {
            result
                .warnings
                .push(String::from("agent: No output targets defined; records are dropped"));
        }

        if agent.service.log_level.is_empty() {
            result.warnings.push(String::from(
                "agent.service.log_level: empty, the agent default applies",
            ));
        }

        for (i, modify) in agent.filter_modify.iter().enumerate() {
            let prefix = format!("agent.filter_modify[{i}]");

            if modify.rules.is_empty() {
                result
                    .warnings
                    .push(format!("{prefix}: Filter has no rules and is not rendered"));
            }

            Self::validate_operations(&modify.conditions, &format!("{prefix}.conditions"), result);
            Self::validate_operations(&modify.rules, &format!("{prefix}.rules"), result);
        }

        if let Some(forward) = &agent.forward_output {
            Self::validate_forward(forward, result);
        }

        if let Some(tcp) = &agent.tcp_output {
            Self::validate_targets(&tcp.targets, "agent.tcp_output", result);
        }
    }

    fn validate_operations(ops: &[ModifyOperation], prefix: &str, result: &mut ValidationResult) {
        for (i, op) in ops.iter().enumerate() {
            if op.op.trim().is_empty() || op.key.trim().is_empty() {
                result.error(
                    format!("{prefix}[{i}]"),
                    "Modify operation needs both an op and a key",
                );
            }
        }
    }

    fn validate_forward(forward: &ForwardOutput, result: &mut ValidationResult) {
        let prefix = "agent.forward_output";

        if forward.upstream.enabled {
            if forward.upstream.config.nodes.is_empty() {
                result.error(
                    format!("{prefix}.upstream.config.nodes"),
                    "Upstream is enabled but no nodes are defined",
                );
            }

            let mut seen_names = HashSet::new();
            for (i, node) in forward.upstream.config.nodes.iter().enumerate() {
                let field = format!("{prefix}.upstream.config.nodes[{i}]");
                if !seen_names.insert(node.name.as_str()) {
                    result.error(
                        format!("{field}.name"),
                        format!("Duplicate upstream node name: {}", node.name),
                    );
                }
                if node.host.is_empty() {
                    result.error(format!("{field}.host"), "Upstream node host cannot be empty");
                }
                if node.port == 0 {
                    result.error(format!("{field}.port"), "Upstream node port cannot be 0");
                }
            }
        }

        if forward.targets.is_empty() {
            result
                .warnings
                .push(format!("{prefix}: No targets; no forward output is rendered"));
        } else if !forward.upstream.enabled {
            Self::validate_targets(&forward.targets, prefix, result);
        }

        if !forward.tls.enabled && !forward.tls.shared_key.is_empty() {
            result.error(
                format!("{prefix}.tls.shared_key"),
                "Shared key is set but TLS is disabled",
            );
        }
    }

    fn validate_targets(targets: &[OutputTarget], prefix: &str, result: &mut ValidationResult) {
        for (i, target) in targets.iter().enumerate() {
            let field = format!("{prefix}.targets[{i}]");
            if target.host.is_empty() {
                result.error(format!("{field}.host"), "Target host cannot be empty");
            }
            if target.port == 0 {
                result.error(format!("{field}.port"), "Target port cannot be 0");
            }
        }
    }
}

/// Validates that a name follows the resource naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ModifyFilter, TcpOutput, TlsSettings, UpstreamConfig, UpstreamNode, UpstreamSettings,
    };

    fn config_with(agent: AgentConfig) -> CheckConfig {
        CheckConfig {
            checker: CheckerSettings::default(),
            agent,
        }
    }

    fn fields(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("fluentbit"));
        assert!(is_valid_name("log-shipper-2"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Fluentbit"));
        assert!(!is_valid_name("1fluentbit"));
        assert!(!is_valid_name("fluent_bit"));
        assert!(!is_valid_name("fluent-"));
        assert!(!is_valid_name("fluent--bit"));
    }

    #[test]
    fn test_default_config_is_valid_with_warning() {
        let result = ConfigValidator::new()
            .validate(&config_with(AgentConfig::default()))
            .unwrap();

        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_checker_errors() {
        let mut config = config_with(AgentConfig::default());
        config.checker.namespace = String::new();
        config.checker.image = String::new();
        config.checker.name_prefix = String::from("Bad_Prefix");

        let result = ConfigValidator::new().inspect(&config);
        assert_eq!(
            fields(&result),
            vec!["checker.namespace", "checker.image", "checker.name_prefix"]
        );
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_target_host_and_port() {
        let agent = AgentConfig {
            tcp_output: Some(TcpOutput {
                targets: vec![OutputTarget::new("", 0)],
                ..TcpOutput::default()
            }),
            ..AgentConfig::default()
        };

        let result = ConfigValidator::new().inspect(&config_with(agent));
        assert_eq!(
            fields(&result),
            vec!["agent.tcp_output.targets[0].host", "agent.tcp_output.targets[0].port"]
        );
    }

    #[test]
    fn test_upstream_rules() {
        let node = |name: &str| UpstreamNode {
            name: name.to_string(),
            host: String::from("agg.logging.svc"),
            port: 24240,
        };

        let mut agent = AgentConfig {
            forward_output: Some(ForwardOutput {
                targets: vec![OutputTarget::new("", 0)],
                upstream: UpstreamSettings {
                    enabled: true,
                    config: UpstreamConfig::default(),
                },
                ..ForwardOutput::default()
            }),
            ..AgentConfig::default()
        };

        let result = ConfigValidator::new().inspect(&config_with(agent.clone()));
        assert_eq!(fields(&result), vec!["agent.forward_output.upstream.config.nodes"]);

        if let Some(forward) = agent.forward_output.as_mut() {
            forward.upstream.config.nodes = vec![node("n0"), node("n0")];
        }
        let result = ConfigValidator::new().inspect(&config_with(agent));
        assert_eq!(
            fields(&result),
            vec!["agent.forward_output.upstream.config.nodes[1].name"]
        );
    }

    #[test]
    fn test_shared_key_without_tls() {
        let agent = AgentConfig {
            forward_output: Some(ForwardOutput {
                targets: vec![OutputTarget::new("agg", 24240)],
                tls: TlsSettings {
                    enabled: false,
                    shared_key: String::from("s3cr3t"),
                },
                ..ForwardOutput::default()
            }),
            ..AgentConfig::default()
        };

        let result = ConfigValidator::new().inspect(&config_with(agent));
        assert_eq!(fields(&result), vec!["agent.forward_output.tls.shared_key"]);
    }

    #[test]
    fn test_modify_operations() {
        let agent = AgentConfig {
            filter_modify: vec![
                ModifyFilter {
                    conditions: vec![],
                    rules: vec![ModifyOperation::new("", "key", None)],
                },
                ModifyFilter::default(),
            ],
            ..AgentConfig::default()
        };

        let result = ConfigValidator::new().inspect(&config_with(agent));
        assert_eq!(fields(&result), vec!["agent.filter_modify[0].rules[0]"]);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.starts_with("agent.filter_modify[1]"))
        );
    }
}
