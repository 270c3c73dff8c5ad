//! Rendering of the agent configuration model.
//!
//! This module turns an [`AgentConfig`](crate::config::AgentConfig) into the
//! files the agent reads. Rendering is pure and deterministic: equal models
//! produce byte-identical files, which is what makes the fingerprint a
//! meaningful deduplication key.

mod rendered;
mod template;

pub use rendered::{ConfigFile, RenderedConfig};
pub use template::Renderer;

/// Main configuration file name.
pub const BASE_CONFIG_NAME: &str = "fluent-bit.conf";

/// Upstream node list file name.
pub const UPSTREAM_CONFIG_NAME: &str = "upstream.conf";

/// Custom parsers file name.
pub const CUSTOM_PARSERS_CONFIG_NAME: &str = "custom-parsers.conf";

/// Directory of the stock configuration shipped with the agent image.
pub const STOCK_CONFIG_PATH: &str = "/fluent-bit/etc";

/// Agent binary inside the image.
pub const STOCK_BIN_PATH: &str = "/fluent-bit/bin/fluent-bit";

/// Directory the rendered files are mounted at.
pub const OPERATOR_CONFIG_PATH: &str = "/fluent-bit/etc-operator";

/// Directory the output secret data is mounted at.
pub const SECRET_PATH: &str = "/fluent-bit/etc-secret";

/// Directory the forward TLS material is mounted at.
pub const TLS_PATH: &str = "/fluent-bit/tls";
