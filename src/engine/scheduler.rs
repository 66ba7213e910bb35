//! Dependency-ordered removal with bounded parallelism and retries.

use crate::config::RetryConfig;
use crate::engine::plan::ExecutionPlan;
use crate::engine::report::{LingeringResource, Outcome, ReportEntry, ReportLog, RunReport, SkipReason};
use crate::engine::scanner::{panic_message, ScannedResource};
use crate::error::{RemovalError, Result};
use crate::resources::ExecContext;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Exponential backoff applied to transient removal errors.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Remove calls per resource, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delays between attempts; yields `max_attempts - 1` values.
    pub fn delays(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(self.multiplier as f32)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Planned,
    Executing,
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Planned => write!(f, "planned"),
            RunState::Executing => write!(f, "executing"),
            RunState::Completed => write!(f, "completed"),
        }
    }
}

struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: RunState::Planned,
        }
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
    }
}

/// Re-enumerates a type after its removal group finished.
pub trait RemovalVerifier: Sync {
    /// `(region, identity)` of every resource of the type still present, or
    /// `None` when re-listing failed.
    fn present(&self, type_name: &str) -> Option<HashSet<(Option<String>, String)>>;
}

/// Executes a plan group by group.
///
/// All removals of one type finish before the next type starts; within a
/// type at most `parallelism` removals are in flight.
pub struct Scheduler {
    pool: rayon::ThreadPool,
    retry: RetryPolicy,
}

impl Scheduler {
    pub fn new(parallelism: usize, retry: RetryPolicy) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .thread_name(|i| format!("remove-{i}"))
            .build()?;
        Ok(Self { pool, retry })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run every group of the plan and report the outcome of each resource.
    pub fn execute(
        &self,
        plan: ExecutionPlan,
        ctx: &ExecContext,
        verifier: Option<&dyn RemovalVerifier>,
    ) -> RunReport {
        let mut tracker = RunTracker::new();
        let (_target, groups, enumeration_errors) = plan.into_parts();
        let group_index: HashMap<String, usize> = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.type_name.clone(), i))
            .collect();

        let log = ReportLog::default();
        let mut lingering = Vec::new();
        tracker.advance(RunState::Executing);

        for group in groups {
            for (resource, reason) in group.skipped {
                log.record(entry(&resource, Outcome::Skipped { reason }));
            }

            if ctx.cancel.is_cancelled() {
                for resource in &group.remove {
                    log.record(entry(
                        resource,
                        Outcome::Skipped {
                            reason: SkipReason::Cancelled,
                        },
                    ));
                }
                continue;
            }

            if group.remove.is_empty() {
                continue;
            }

            tracing::info!(
                type_name = %group.type_name,
                count = group.remove.len(),
                "Removing resources"
            );

            self.pool.install(|| {
                group.remove.par_iter().for_each(|resource| {
                    let outcome = if ctx.cancel.is_cancelled() {
                        Outcome::Skipped {
                            reason: SkipReason::Cancelled,
                        }
                    } else {
                        self.remove_with_retry(resource, ctx)
                    };
                    log.record(entry(resource, outcome));
                });
            });

            if let Some(verifier) = verifier {
                if !ctx.cancel.is_cancelled() {
                    lingering.extend(verify_group(&group.type_name, &log, verifier));
                }
            }
        }

        let mut entries = log.into_entries();
        entries.sort_by(|a, b| {
            let ka = group_index.get(&a.type_name).copied().unwrap_or(usize::MAX);
            let kb = group_index.get(&b.type_name).copied().unwrap_or(usize::MAX);
            (ka, &a.region, &a.identity).cmp(&(kb, &b.region, &b.identity))
        });

        tracker.advance(RunState::Completed);

        let report = RunReport {
            state: tracker.state,
            entries,
            enumeration_errors,
            lingering,
        };
        let summary = report.summary();
        tracing::info!(
            removed = summary.removed_count,
            skipped = summary.skipped_count,
            failed = summary.failed_count,
            "Run finished"
        );
        report
    }

    fn remove_with_retry(&self, resource: &ScannedResource, ctx: &ExecContext) -> Outcome {
        let identity = resource.identity();
        let mut delays = self.retry.delays();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = panic::catch_unwind(AssertUnwindSafe(|| resource.handle.remove(ctx)));
            let error = match result {
                Ok(Ok(())) => {
                    tracing::debug!(type_name = %resource.type_name, %identity, attempts, "Removed");
                    return Outcome::Removed { attempts };
                }
                Ok(Err(error)) if error.is_not_found() => {
                    tracing::debug!(
                        type_name = %resource.type_name,
                        %identity,
                        "Resource already gone"
                    );
                    return Outcome::Removed { attempts };
                }
                Ok(Err(error)) => error,
                Err(payload) => RemovalError::other(format!(
                    "remove panicked: {}",
                    panic_message(payload.as_ref())
                )),
            };

            if !error.is_transient() {
                tracing::warn!(type_name = %resource.type_name, %identity, %error, "Removal failed");
                return Outcome::Failed {
                    error: error.to_string(),
                    retryable: false,
                    attempts,
                };
            }

            let Some(delay) = delays.next() else {
                tracing::warn!(
                    type_name = %resource.type_name,
                    %identity,
                    attempts,
                    %error,
                    "Giving up after transient errors"
                );
                return Outcome::Failed {
                    error: error.to_string(),
                    retryable: true,
                    attempts,
                };
            };

            tracing::debug!(
                type_name = %resource.type_name,
                %identity,
                attempts,
                delay_ms = delay.as_millis() as u64,
                %error,
                "Retrying removal"
            );
            if !ctx.cancel.sleep(delay) {
                return Outcome::Failed {
                    error: format!("{error} (retry interrupted by cancellation)"),
                    retryable: true,
                    attempts,
                };
            }
        }
    }
}

fn entry(resource: &ScannedResource, outcome: Outcome) -> ReportEntry {
    ReportEntry {
        type_name: resource.type_name.clone(),
        region: resource.region.clone(),
        identity: resource.identity(),
        outcome,
    }
}

fn verify_group(
    type_name: &str,
    log: &ReportLog,
    verifier: &dyn RemovalVerifier,
) -> Vec<LingeringResource> {
    let removed = log.removed_of_type(type_name);
    if removed.is_empty() {
        return Vec::new();
    }

    let Some(present) = verifier.present(type_name) else {
        tracing::warn!(type_name, "Could not verify removals");
        return Vec::new();
    };

    removed
        .into_iter()
        .filter(|e| present.contains(&(e.region.clone(), e.identity.clone())))
        .map(|e| {
            tracing::warn!(type_name, identity = %e.identity, "Resource still present after removal");
            LingeringResource {
                type_name: e.type_name,
                region: e.region,
                identity: e.identity,
            }
        })
        .collect()
}
