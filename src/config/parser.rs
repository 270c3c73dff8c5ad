//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{CheckError, ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::CheckConfig;

/// Token file mounted into pods running with a service account.
const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Configuration parser for loading check configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<CheckConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(CheckError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CheckError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// An empty document yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<CheckConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(CheckConfig::default());
        }

        let config: CheckConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            CheckError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration: namespace {}, {} output block(s)",
            config.checker.namespace,
            config.agent.output_count()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<CheckConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies overrides from `lookup` (normally the process environment).
    pub fn apply_env_overrides(
        config: &mut CheckConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) {
        let checker = &mut config.checker;

        if let Some(namespace) = lookup("CONFIGCHECK_NAMESPACE") {
            debug!("Overriding checker.namespace from environment");
            checker.namespace = namespace;
        }

        if let Some(image) = lookup("CONFIGCHECK_IMAGE") {
            debug!("Overriding checker.image from environment");
            checker.image = image;
        }

        if let Some(account) = lookup("CONFIGCHECK_SERVICE_ACCOUNT") {
            debug!("Overriding checker.service_account from environment");
            checker.service_account = Some(account);
        }

        if let Some(url) = lookup("KUBE_API_URL") {
            debug!("Overriding checker.cluster.api_url from environment");
            checker.cluster.api_url = url;
        }

        if let Some(token) = lookup("KUBE_TOKEN") {
            debug!("Overriding checker.cluster.token from environment");
            checker.cluster.token = Some(token);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                CheckError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Resolves the API bearer token.
    ///
    /// The configured token wins; otherwise the in-cluster service account
    /// token is read.
    ///
    /// # Errors
    ///
    /// Returns an error if neither source provides a token.
    pub fn cluster_token(config: &CheckConfig) -> Result<String> {
        if let Some(token) = config
            .checker
            .cluster
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
        {
            return Ok(token.to_string());
        }

        match std::fs::read_to_string(IN_CLUSTER_TOKEN_PATH) {
            Ok(token) if !token.trim().is_empty() => {
                debug!("Using in-cluster service account token");
                Ok(token.trim().to_string())
            }
            _ => Err(CheckError::Config(ConfigError::MissingEnvVar {
                name: String::from("KUBE_TOKEN"),
            })),
        }
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["configcheck.yaml", "configcheck.yml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(CheckError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
checker:
  namespace: observability
agent:
  disable_kubernetes_filter: true
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(config.checker.namespace, "observability");
        assert_eq!(config.checker.name_prefix, "fluentbit");
        assert!(config.agent.disable_kubernetes_filter);
        assert_eq!(config.agent.service.flush, 1);
    }

    #[test]
    fn test_parse_empty_document_is_default() {
        let config = ConfigParser::new().parse_yaml("   \n", None).unwrap();
        assert_eq!(config.checker.namespace, "logging");
        assert_eq!(config.agent.output_count(), 0);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
checker:
  namespace: logging
  name_prefix: shipper
  image: fluent/fluent-bit:3.1.4
  service_account: shipper
  tls_secret: forward-tls
  node_selector:
    kubernetes.io/os: linux
  cluster:
    api_url: https://10.0.0.1:6443
    timeout_secs: 10

agent:
  service:
    flush: 2
    log_level: debug
    buffer_storage:
      storage.path: /buffers
      storage.sync: normal
  input:
    values:
      Path: /var/log/containers/*.log
      Refresh_Interval: 5
      Skip_Long_Lines: true
    multiline_parser: [docker, cri]
  kubernetes_filter:
    Match: kubernetes.*
  filter_modify:
    - rules:
        - op: Remove
          key: password
  forward_output:
    targets:
      - host: aggregator.logging.svc
        port: 24240
      - host: team-a.logging.svc
        port: 24240
        namespace: team-a
    tls:
      enabled: true
      shared_key: s3cr3t
    network:
      keepalive: false
  tcp_output:
    targets:
      - host: syslog-ng.logging.svc
        port: 601
    workers: 2
  secrets:
    password: hunter2
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(config.checker.name_prefix, "shipper");
        assert_eq!(config.checker.cluster.timeout_secs, 10);
        assert_eq!(config.agent.service.flush, 2);
        assert_eq!(config.agent.input.values.get("Refresh_Interval"), Some("5"));
        assert_eq!(config.agent.input.values.get("Skip_Long_Lines"), Some("On"));
        assert_eq!(config.agent.output_count(), 3);

        let forward = config.agent.forward_output.as_ref().unwrap();
        assert_eq!(forward.targets[1].match_pattern(), "*_team-a_*");
        assert_eq!(forward.network.keepalive, Some(false));
        assert_eq!(forward.network.connect_timeout, None);
        assert_eq!(config.agent.secrets.get("password"), Some("hunter2"));
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = ConfigParser::new()
            .parse_yaml("checker: [", Some(Path::new("broken.yaml")))
            .unwrap_err();

        match err {
            CheckError::Config(ConfigError::ParseError { location, .. }) => {
                assert_eq!(location.as_deref(), Some("broken.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONFIGCHECK_NAMESPACE", "ops"),
            ("CONFIGCHECK_IMAGE", "fluent/fluent-bit:3.2.0"),
            ("KUBE_TOKEN", "abc"),
        ]
        .into_iter()
        .collect();

        let mut config = ConfigParser::new().parse_yaml("", None).unwrap();
        ConfigParser::apply_env_overrides(&mut config, |name| {
            vars.get(name).map(ToString::to_string)
        });

        assert_eq!(config.checker.namespace, "ops");
        assert_eq!(config.checker.image, "fluent/fluent-bit:3.2.0");
        assert_eq!(config.checker.cluster.token.as_deref(), Some("abc"));
        assert_eq!(config.checker.service_account, None);
        assert_eq!(ConfigParser::cluster_token(&config).unwrap(), "abc");
    }

    #[test]
    fn test_load_and_find_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join("configcheck.yaml"),
            "checker:\n  name_prefix: found\n",
        )
        .unwrap();

        let path = find_config_file(&nested).unwrap();
        assert_eq!(path, dir.path().join("configcheck.yaml"));

        let config = ConfigParser::new().load_file(&path).unwrap();
        assert_eq!(config.checker.name_prefix, "found");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigParser::new()
            .load_file(dir.path().join("missing.yaml"))
            .unwrap_err();

        assert!(matches!(err, CheckError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_dotenv_absent_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigParser::new().with_base_path(dir.path()).load_dotenv().is_ok());
    }
}
