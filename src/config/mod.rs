//! Configuration module for the config check core.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `configcheck.yaml`
//! - Validation of the agent model before anything is rendered
//! - Fingerprinting rendered configurations

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    AgentConfig, CheckConfig, CheckerSettings, ClusterSettings, ForwardOutput, InputConfig,
    KeyValues, ModifyFilter, ModifyOperation, MonitorConfig, NetworkOptions, OutputTarget,
    ServiceConfig, TcpOutput, TlsSettings, UpstreamConfig, UpstreamNode, UpstreamSettings,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use validator::{ConfigValidator, FieldError, ValidationResult};
pub use hash::{ConfigHasher, FINGERPRINT_LEN, Fingerprint};
