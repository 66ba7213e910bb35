//! Parallel enumeration of resource types.

use crate::cancel::CancelToken;
use crate::error::{ListError, Result};
use crate::resources::{Lister, ResourceHandle, ResourceTypeDescriptor, ScanContext, Scope};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// How often the collector re-checks cancellation while listers run.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Account and regions a run operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanTarget {
    pub account_id: String,
    pub regions: Vec<String>,
}

impl ScanTarget {
    pub fn new(account_id: impl Into<String>, regions: Vec<String>) -> Self {
        Self {
            account_id: account_id.into(),
            regions,
        }
    }
}

/// A handle together with where it was found.
#[derive(Clone)]
pub struct ScannedResource {
    pub type_name: String,
    pub region: Option<String>,
    pub handle: Arc<dyn ResourceHandle>,
}

impl ScannedResource {
    pub fn identity(&self) -> String {
        self.handle.identity()
    }
}

impl fmt::Debug for ScannedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannedResource")
            .field("type_name", &self.type_name)
            .field("region", &self.region)
            .field("identity", &self.handle.identity())
            .finish()
    }
}

/// Why a lister contributed no resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnumerationFailure {
    /// The lister returned an error.
    ListerFailed,
    /// The lister panicked.
    Panicked,
    /// The run was cancelled before the lister finished.
    Cancelled,
    /// The scan deadline passed before the lister finished.
    TimedOut,
}

/// Enumeration failure of one type in one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumerationError {
    pub type_name: String,
    pub region: Option<String>,
    pub kind: EnumerationFailure,
    pub message: String,
}

impl fmt::Display for EnumerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{} ({}): {}", self.type_name, region, self.message),
            None => write!(f, "{}: {}", self.type_name, self.message),
        }
    }
}

/// Result of one scan pass.
#[derive(Debug, Default)]
pub struct ScanOutput {
    /// Handles grouped by job, in the order types were passed in.
    pub resources: Vec<ScannedResource>,
    pub errors: Vec<EnumerationError>,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Number of listers run at once.
    pub jobs: usize,
    /// Overall deadline across all in-flight listers.
    pub timeout: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            jobs: 8,
            timeout: None,
        }
    }
}

/// One lister invocation.
struct ScanJob {
    type_name: String,
    region: Option<String>,
    lister: Arc<dyn Lister>,
}

type ListOutcome = std::result::Result<
    std::result::Result<Vec<Box<dyn ResourceHandle>>, ListError>,
    Box<dyn Any + Send>,
>;

enum JobMessage {
    NotStarted,
    Finished(ListOutcome),
}

/// Scanner invoking listers on a bounded worker pool.
///
/// Each pass gets its own pool, so listers abandoned at a deadline never
/// occupy the workers of a later pass.
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    /// Create a new scanner with the given options.
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    fn worker_pool(&self) -> Result<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .thread_name(|i| format!("scan-{i}"))
            .build()?)
    }

    /// Enumerate every given type.
    ///
    /// Account-scoped types are listed once, region-scoped types once per
    /// target region. A failing, panicking or overdue lister is recorded as an
    /// [`EnumerationError`] and contributes no resources.
    pub fn scan(
        &self,
        target: &ScanTarget,
        descriptors: &[&ResourceTypeDescriptor],
        cancel: &CancelToken,
    ) -> ScanOutput {
        let jobs = Self::plan_jobs(target, descriptors);
        let pool = match self.worker_pool() {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start scan workers");
                let message = format!("failed to start scan workers: {e}");
                return ScanOutput {
                    resources: Vec::new(),
                    errors: jobs
                        .iter()
                        .map(|job| job.failure(EnumerationFailure::ListerFailed, message.clone()))
                        .collect(),
                };
            }
        };
        let scan_cancel = cancel.child(self.options.timeout);
        let (tx, rx) = mpsc::channel::<(usize, JobMessage)>();

        for (index, job) in jobs.iter().enumerate() {
            let tx = tx.clone();
            let lister = Arc::clone(&job.lister);
            let ctx = ScanContext {
                account_id: target.account_id.clone(),
                region: job.region.clone(),
                cancel: scan_cancel.clone(),
            };

            pool.spawn(move || {
                if ctx.cancel.is_cancelled() {
                    let _ = tx.send((index, JobMessage::NotStarted));
                    return;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| lister.list(&ctx)));
                // The collector may have stopped waiting; late results are dropped.
                let _ = tx.send((index, JobMessage::Finished(outcome)));
            });
        }
        drop(tx);

        let mut messages: Vec<Option<JobMessage>> = jobs.iter().map(|_| None).collect();
        let mut pending = jobs.len();
        while pending > 0 && !scan_cancel.is_cancelled() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok((index, message)) => {
                    messages[index] = Some(message);
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for (index, message) in rx.try_iter() {
            messages[index] = Some(message);
        }

        let timed_out = scan_cancel.deadline_passed() && !cancel.is_cancelled();
        let mut output = ScanOutput::default();

        for (job, message) in jobs.into_iter().zip(messages) {
            match message {
                Some(JobMessage::Finished(Ok(Ok(handles)))) => {
                    tracing::debug!(
                        type_name = %job.type_name,
                        region = job.region.as_deref().unwrap_or("-"),
                        count = handles.len(),
                        "Listed resources"
                    );
                    output
                        .resources
                        .extend(handles.into_iter().map(|handle| ScannedResource {
                            type_name: job.type_name.clone(),
                            region: job.region.clone(),
                            handle: Arc::from(handle),
                        }));
                }
                Some(JobMessage::Finished(Ok(Err(err)))) => {
                    output
                        .errors
                        .push(job.failure(EnumerationFailure::ListerFailed, err.message));
                }
                Some(JobMessage::Finished(Err(payload))) => {
                    let message = format!("lister panicked: {}", panic_message(payload.as_ref()));
                    output
                        .errors
                        .push(job.failure(EnumerationFailure::Panicked, message));
                }
                Some(JobMessage::NotStarted) | None if timed_out => {
                    output.errors.push(job.failure(
                        EnumerationFailure::TimedOut,
                        "scan deadline exceeded".to_string(),
                    ));
                }
                Some(JobMessage::NotStarted) | None => {
                    output.errors.push(
                        job.failure(EnumerationFailure::Cancelled, "scan cancelled".to_string()),
                    );
                }
            }
        }

        for err in &output.errors {
            tracing::warn!(
                type_name = %err.type_name,
                region = err.region.as_deref().unwrap_or("-"),
                kind = ?err.kind,
                "Enumeration failed: {}",
                err.message
            );
        }

        output
    }

    fn plan_jobs(target: &ScanTarget, descriptors: &[&ResourceTypeDescriptor]) -> Vec<ScanJob> {
        let mut jobs = Vec::new();
        for descriptor in descriptors {
            let regions: Vec<Option<String>> = match descriptor.scope() {
                Scope::Account => vec![None],
                Scope::Region => target.regions.iter().cloned().map(Some).collect(),
            };
            if regions.is_empty() {
                tracing::debug!(
                    type_name = descriptor.name(),
                    "No target regions for region-scoped type"
                );
            }
            for region in regions {
                jobs.push(ScanJob {
                    type_name: descriptor.name().to_string(),
                    region,
                    lister: Arc::clone(descriptor.lister()),
                });
            }
        }
        jobs
    }
}

impl ScanJob {
    fn failure(&self, kind: EnumerationFailure, message: String) -> EnumerationError {
        EnumerationError {
            type_name: self.type_name.clone(),
            region: self.region.clone(),
            kind,
            message,
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
