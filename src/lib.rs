// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # logship-configcheck
//!
//! Rendering and dry-run validation of log shipper (fluent-bit)
//! configurations on Kubernetes.
//!
//! ## Overview
//!
//! A configuration model is rendered into the agent's own file format, byte
//! for byte deterministically. The rendered bytes are fingerprinted, and the
//! fingerprint is the identity of a validation attempt:
//!
//! - the rendered files go into a secret named after the fingerprint
//! - a pod runs the agent with `--dry-run` against that secret
//! - the pod's terminal phase is the verdict
//! - artifacts of fingerprints that are no longer wanted are removed
//!
//! Nothing is locked. Deterministic names and list-before-create keep at most
//! one validation pod active at a time.
//!
//! ## Modules
//!
//! - [`config`]: Configuration model, parsing, validation and fingerprints
//! - [`render`]: The agent config renderer
//! - [`cluster`]: Orchestration API trait, Kubernetes client and in-memory fake
//! - [`check`]: Validation orchestrator and cleanup
//! - [`state`]: Recorded validation results
//! - [`reconciler`]: One full validation pass
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! checker:
//!   namespace: logging
//!   name_prefix: shipper
//!   image: fluent/fluent-bit:3.1.4
//!
//! agent:
//!   input:
//!     values:
//!       Path: /var/log/containers/*.log
//!   forward_output:
//!     targets:
//!       - host: aggregator.logging.svc
//!         port: 24240
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod check;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod render;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use check::{CleanupReport, ConfigChecker, ValidationRecord};
pub use cli::{Cli, Commands, OutputFormatter};
pub use cluster::{ClusterApi, KubeClient, MemoryCluster};
pub use config::{CheckConfig, ConfigHasher, ConfigParser, ConfigValidator, Fingerprint};
pub use error::{CheckError, Result};
pub use reconciler::{ReconciliationResult, Reconciler, StatusReport, WaitOptions};
pub use render::{RenderedConfig, Renderer};
pub use state::{CheckResults, LocalResultStore, ResultStore};
