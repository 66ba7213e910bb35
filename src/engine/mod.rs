//! Run orchestration: scan, classify, order and remove.

pub mod filter;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod scheduler;

pub use filter::{Classification, FilterEngine};
pub use plan::{ExecutionPlan, PlanDecision, PlanGroup};
pub use report::{LingeringResource, Outcome, ReportEntry, RunReport, RunSummary, SkipReason};
pub use resolver::{resolve_order, ExecutionOrder};
pub use scanner::{
    EnumerationError, EnumerationFailure, ScanOptions, ScanOutput, ScanTarget, ScannedResource,
    Scanner,
};
pub use scheduler::{RemovalVerifier, RetryPolicy, RunState, Scheduler};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Result;
use crate::resources::{ExecContext, ResourceTypeDescriptor, ResourceTypeRegistry};
use std::collections::HashSet;
use std::sync::Arc;

/// Tunables of a [`Sweeper`].
#[derive(Debug, Clone)]
pub struct SweeperOptions {
    pub scan: ScanOptions,
    /// Concurrent removals within one type.
    pub parallel_jobs: usize,
    pub retry: RetryPolicy,
    /// Re-list each type after removing it.
    pub verify_removals: bool,
    /// Types to process; empty means all.
    pub includes: Vec<String>,
    /// Types never processed.
    pub excludes: Vec<String>,
}

impl Default for SweeperOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SweeperOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan: ScanOptions {
                jobs: config.run.scan_jobs,
                timeout: config.run.scan_timeout(),
            },
            parallel_jobs: config.run.parallel_jobs,
            retry: RetryPolicy::from(&config.retry),
            verify_removals: config.run.verify_removals,
            includes: config.resource_types.includes.clone(),
            excludes: config.resource_types.excludes.clone(),
        }
    }
}

/// Entry point of the engine.
///
/// Construction resolves the type order, so a registry with a dependency
/// cycle is rejected before anything is listed or removed.
pub struct Sweeper {
    registry: Arc<ResourceTypeRegistry>,
    order: ExecutionOrder,
    selected: Vec<String>,
    scanner: Scanner,
    scheduler: Scheduler,
    verify_removals: bool,
}

impl Sweeper {
    pub fn new(registry: Arc<ResourceTypeRegistry>, options: SweeperOptions) -> Result<Self> {
        let order = resolve_order(&registry)?;

        let includes: HashSet<String> = registry
            .canonical_names(&options.includes)?
            .into_iter()
            .collect();
        let excludes: HashSet<String> = registry
            .canonical_names(&options.excludes)?
            .into_iter()
            .collect();

        let selected: Vec<String> = order
            .names()
            .iter()
            .filter(|name| includes.is_empty() || includes.contains(*name))
            .filter(|name| !excludes.contains(*name))
            .cloned()
            .collect();

        tracing::debug!(
            types = selected.len(),
            excluded = order.len() - selected.len(),
            "Resolved execution order"
        );

        Ok(Self {
            scanner: Scanner::new(options.scan),
            scheduler: Scheduler::new(options.parallel_jobs, options.retry)?,
            registry,
            order,
            selected,
            verify_removals: options.verify_removals,
        })
    }

    pub fn registry(&self) -> &ResourceTypeRegistry {
        &self.registry
    }

    /// Full dependency order over all registered types.
    pub fn order(&self) -> &ExecutionOrder {
        &self.order
    }

    /// Types this sweeper processes, in execution order.
    pub fn selected_types(&self) -> &[String] {
        &self.selected
    }

    fn selected_descriptors(&self) -> Vec<&ResourceTypeDescriptor> {
        self.selected
            .iter()
            .filter_map(|name| self.registry.resolve(name))
            .collect()
    }

    /// Enumerate and classify everything in `target` without removing
    /// anything.
    pub fn plan(
        &self,
        target: &ScanTarget,
        filters: &FilterEngine,
        cancel: &CancelToken,
    ) -> ExecutionPlan {
        let descriptors = self.selected_descriptors();
        tracing::info!(
            account = %target.account_id,
            regions = target.regions.len(),
            types = descriptors.len(),
            "Scanning"
        );

        let scan = self.scanner.scan(target, &descriptors, cancel);
        let plan = ExecutionPlan::build(target.clone(), &self.order, scan, filters);
        tracing::info!(
            remove = plan.remove_count(),
            skip = plan.skip_count(),
            "Plan ready"
        );
        plan
    }

    /// Remove what the plan classified for removal.
    pub fn execute(&self, plan: ExecutionPlan, ctx: &ExecContext) -> RunReport {
        if self.verify_removals {
            let verifier = ScanVerifier {
                sweeper: self,
                target: plan.target().clone(),
                cancel: ctx.cancel.clone(),
            };
            self.scheduler.execute(plan, ctx, Some(&verifier))
        } else {
            self.scheduler.execute(plan, ctx, None)
        }
    }

    /// Plan and execute in one go.
    pub fn run(&self, target: &ScanTarget, filters: &FilterEngine, ctx: &ExecContext) -> RunReport {
        let plan = self.plan(target, filters, &ctx.cancel);
        self.execute(plan, ctx)
    }
}

struct ScanVerifier<'a> {
    sweeper: &'a Sweeper,
    target: ScanTarget,
    cancel: CancelToken,
}

impl RemovalVerifier for ScanVerifier<'_> {
    fn present(&self, type_name: &str) -> Option<HashSet<(Option<String>, String)>> {
        let descriptor = self.sweeper.registry.resolve(type_name)?;
        let output = self
            .sweeper
            .scanner
            .scan(&self.target, &[descriptor], &self.cancel);
        if !output.errors.is_empty() {
            return None;
        }
        Some(
            output
                .resources
                .iter()
                .map(|r| (r.region.clone(), r.identity()))
                .collect(),
        )
    }
}
