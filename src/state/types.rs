//! Recorded validation results.
//!
//! Results are keyed by fingerprint, so a verdict reached once is reused for
//! as long as the rendered config does not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::check::ValidationRecord;
use crate::config::Fingerprint;

/// Current version of the results format.
pub const RESULTS_VERSION: &str = "1.0";

/// Every recorded validation result of one checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResults {
    /// Results format version.
    pub version: String,
    /// Fingerprint of the config applied last, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Fingerprint>,
    /// Latest record per fingerprint.
    #[serde(default)]
    pub results: BTreeMap<Fingerprint, RecordedResult>,
    /// When the results were last updated.
    pub last_updated: DateTime<Utc>,
}

/// A validation record and when it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResult {
    /// The record.
    pub record: ValidationRecord,
    /// When the record was produced.
    pub checked_at: DateTime<Utc>,
}

impl Default for CheckResults {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckResults {
    /// Creates empty results.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: RESULTS_VERSION.to_string(),
            current: None,
            results: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Returns the record of a fingerprint.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&RecordedResult> {
        self.results.get(fingerprint)
    }

    /// Returns the final verdict of a fingerprint, if one was reached.
    #[must_use]
    pub fn verdict(&self, fingerprint: &Fingerprint) -> Option<&ValidationRecord> {
        self.get(fingerprint)
            .map(|r| &r.record)
            .filter(|record| record.ready && record.state.is_terminal())
    }

    /// Records the outcome of a pass and marks `fingerprint` as current.
    pub fn record(&mut self, fingerprint: Fingerprint, record: ValidationRecord) {
        let now = Utc::now();
        self.current = Some(fingerprint.clone());
        self.results.insert(
            fingerprint,
            RecordedResult {
                record,
                checked_at: now,
            },
        );
        self.last_updated = now;
    }

    /// Drops the record of a fingerprint.
    pub fn forget(&mut self, fingerprint: &Fingerprint) -> Option<RecordedResult> {
        let removed = self.results.remove(fingerprint);
        if removed.is_some() {
            if self.current.as_ref() == Some(fingerprint) {
                self.current = None;
            }
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Returns every recorded fingerprint.
    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.results.keys()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckState;

    fn fp(n: u8) -> Fingerprint {
        Fingerprint::parse(&format!("{n:016x}")).unwrap()
    }

    #[test]
    fn test_verdict_only_for_terminal_records() {
        let mut results = CheckResults::new();
        results.record(
            fp(1),
            ValidationRecord::not_ready(CheckState::WorkloadPendingOrRunning, "pending"),
        );
        assert!(results.get(&fp(1)).is_some());
        assert!(results.verdict(&fp(1)).is_none());

        results.record(fp(1), ValidationRecord::valid());
        assert_eq!(results.verdict(&fp(1)), Some(&ValidationRecord::valid()));
        assert_eq!(results.current, Some(fp(1)));
    }

    #[test]
    fn test_forget_clears_current() {
        let mut results = CheckResults::new();
        results.record(fp(1), ValidationRecord::invalid("bad"));
        results.record(fp(2), ValidationRecord::valid());

        assert!(results.forget(&fp(1)).is_some());
        assert_eq!(results.current, Some(fp(2)));
        assert!(results.forget(&fp(2)).is_some());
        assert_eq!(results.current, None);
        assert!(results.forget(&fp(2)).is_none());
        assert!(results.is_empty());
    }

    #[test]
    fn test_json_keys_are_fingerprints() {
        let mut results = CheckResults::new();
        results.record(fp(3), ValidationRecord::valid());

        let json = serde_json::to_value(&results).unwrap();
        assert!(json["results"]["0000000000000003"]["record"]["valid"]
            .as_bool()
            .unwrap());

        let back: CheckResults = serde_json::from_value(json).unwrap();
        assert_eq!(back, results);
    }
}
