//! Persistence of validation results between runs.
//!
//! A process that restarts reuses the verdicts it already reached and learns
//! which fingerprints it left artifacts behind for.

mod local;
mod store;
mod types;

pub use local::LocalResultStore;
pub use store::ResultStore;
pub use types::{CheckResults, RESULTS_VERSION, RecordedResult};
