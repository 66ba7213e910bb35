//! Per-run outcome reporting.

use crate::engine::scanner::EnumerationError;
use crate::engine::scheduler::RunState;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Why a resource was left in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "lowercase")]
pub enum SkipReason {
    /// The handle's own filter refused removal.
    Filtered(String),
    /// A configured keep rule matched.
    Rule(String),
    /// The run was cancelled before the resource was dispatched.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Filtered(reason) | SkipReason::Rule(reason) => write!(f, "{reason}"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal outcome of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    /// Removed, or already gone.
    Removed { attempts: u32 },
    Skipped { reason: SkipReason },
    Failed {
        error: String,
        /// Failed only because transient errors outlasted the retry budget.
        retryable: bool,
        attempts: u32,
    },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    /// Remove calls issued for the resource.
    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Removed { attempts } | Outcome::Failed { attempts, .. } => *attempts,
            Outcome::Skipped { .. } => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Removed { .. } => write!(f, "removed"),
            Outcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            Outcome::Failed {
                error, retryable, ..
            } => {
                if *retryable {
                    write!(f, "failed (retryable): {error}")
                } else {
                    write!(f, "failed: {error}")
                }
            }
        }
    }
}

/// Report line for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub type_name: String,
    pub region: Option<String>,
    pub identity: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// A resource reported removed that a verification scan still found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LingeringResource {
    pub type_name: String,
    pub region: Option<String>,
    pub identity: String,
}

/// Summary of run results.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub removed_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    /// Failures that a later run may clear.
    pub retryable_count: usize,
    pub enumeration_error_count: usize,
    pub lingering_count: usize,
}

/// Everything that happened during one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// `Completed` once every group was processed.
    pub state: RunState,
    pub entries: Vec<ReportEntry>,
    pub enumeration_errors: Vec<EnumerationError>,
    pub lingering: Vec<LingeringResource>,
}

impl RunReport {
    /// Get summary statistics.
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            enumeration_error_count: self.enumeration_errors.len(),
            lingering_count: self.lingering.len(),
            ..Default::default()
        };

        for entry in &self.entries {
            match &entry.outcome {
                Outcome::Removed { .. } => summary.removed_count += 1,
                Outcome::Skipped { .. } => summary.skipped_count += 1,
                Outcome::Failed { retryable, .. } => {
                    summary.failed_count += 1;
                    if *retryable {
                        summary.retryable_count += 1;
                    }
                }
            }
        }

        summary
    }

    /// Whether any resource ended up failed.
    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_failed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    /// Find the entry for a resource.
    pub fn entry(&self, type_name: &str, identity: &str) -> Option<&ReportEntry> {
        self.entries
            .iter()
            .find(|e| e.type_name == type_name && e.identity == identity)
    }
}

/// Append-only log shared by removal workers.
#[derive(Debug, Default)]
pub(crate) struct ReportLog {
    entries: Mutex<Vec<ReportEntry>>,
}

impl ReportLog {
    pub(crate) fn record(&self, entry: ReportEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Entries recorded so far for one type.
    pub(crate) fn removed_of_type(&self, type_name: &str) -> Vec<ReportEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.type_name == type_name && matches!(e.outcome, Outcome::Removed { .. }))
            .cloned()
            .collect()
    }

    pub(crate) fn into_entries(self) -> Vec<ReportEntry> {
        self.entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(identity: &str, outcome: Outcome) -> ReportEntry {
        ReportEntry {
            type_name: "EC2SecurityGroup".into(),
            region: Some("us-east-1".into()),
            identity: identity.into(),
            outcome,
        }
    }

    #[test]
    fn test_summarize() {
        let report = RunReport {
            state: RunState::Completed,
            entries: vec![
                entry("sg-1", Outcome::Removed { attempts: 1 }),
                entry("sg-2", Outcome::Removed { attempts: 3 }),
                entry(
                    "sg-3",
                    Outcome::Failed {
                        error: "throttled".into(),
                        retryable: true,
                        attempts: 5,
                    },
                ),
                entry(
                    "sg-4",
                    Outcome::Failed {
                        error: "access denied".into(),
                        retryable: false,
                        attempts: 1,
                    },
                ),
                entry(
                    "sg-default",
                    Outcome::Skipped {
                        reason: SkipReason::Filtered("cannot delete default group".into()),
                    },
                ),
            ],
            enumeration_errors: vec![],
            lingering: vec![],
        };

        let summary = report.summary();
        assert_eq!(summary.removed_count, 2);
        assert_eq!(summary.failed_count, 2);
        assert_eq!(summary.retryable_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert!(report.has_failures());
        assert_eq!(report.failures().count(), 2);
    }

    #[test]
    fn test_empty_report_has_no_failures() {
        let report = RunReport::default();
        assert!(!report.has_failures());
        assert_eq!(report.summary(), RunSummary::default());
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::Filtered("cannot delete default group".into()).to_string(),
            "cannot delete default group"
        );
        assert_eq!(SkipReason::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_outcome_display() {
        let failed = Outcome::Failed {
            error: "rate limit".into(),
            retryable: true,
            attempts: 5,
        };
        assert_eq!(failed.to_string(), "failed (retryable): rate limit");
        assert_eq!(failed.attempts(), 5);
        assert_eq!(Outcome::Removed { attempts: 2 }.to_string(), "removed");
    }

    #[test]
    fn test_entry_serializes_flat() {
        let json = serde_json::to_value(entry("sg-1", Outcome::Removed { attempts: 1 })).unwrap();
        assert_eq!(json["outcome"], "removed");
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["identity"], "sg-1");
    }

    #[test]
    fn test_report_log_collects_entries() {
        let log = ReportLog::default();
        log.record(entry("sg-1", Outcome::Removed { attempts: 1 }));
        log.record(entry(
            "sg-2",
            Outcome::Skipped {
                reason: SkipReason::Cancelled,
            },
        ));

        assert_eq!(log.removed_of_type("EC2SecurityGroup").len(), 1);
        assert_eq!(log.into_entries().len(), 2);
    }
}
