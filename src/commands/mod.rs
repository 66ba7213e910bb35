//! Subcommand implementations.

pub mod plan;
pub mod run;
pub mod types;

use crate::cancel::CancelToken;
use crate::cli::{InventoryArgs, SelectionArgs};
use crate::config::Config;
use crate::engine::{EnumerationError, FilterEngine, ScanTarget, Sweeper, SweeperOptions};
use crate::inventory::{Inventory, InventoryStore};
use crate::signals;
use anyhow::Result;
use std::sync::Arc;

/// Everything a plan or run needs, loaded from the inventory and config.
pub(crate) struct Session {
    pub store: InventoryStore,
    pub sweeper: Sweeper,
    pub filters: FilterEngine,
    pub target: ScanTarget,
}

impl Session {
    pub fn open(
        config: &Config,
        inventory: &InventoryArgs,
        selection: &SelectionArgs,
        jobs: Option<usize>,
    ) -> Result<Self> {
        let store = InventoryStore::new(Inventory::load(&inventory.inventory)?);
        let registry = Arc::new(store.registry()?);

        let mut options = SweeperOptions::from_config(config);
        if let Some(types) = &selection.types {
            options.includes = types.clone();
        }
        if let Some(excludes) = &selection.exclude {
            options.excludes.extend(excludes.iter().cloned());
        }
        if let Some(jobs) = jobs {
            options.parallel_jobs = jobs.max(1);
        }

        let sweeper = Sweeper::new(Arc::clone(&registry), options)?;
        let filters = FilterEngine::new(&config.filters, &registry)?;

        let mut target = store.target();
        if !selection.region.is_empty() {
            target.regions = selection.region.clone();
        }

        Ok(Self {
            store,
            sweeper,
            filters,
            target,
        })
    }
}

/// Run-wide cancellation bounded by the configured deadline.
pub(crate) fn run_token(config: &Config) -> CancelToken {
    match config.run.run_timeout() {
        Some(timeout) => CancelToken::with_timeout(timeout),
        None => CancelToken::new(),
    }
}

/// Route SIGINT/SIGTERM to `token` instead of terminating the process.
pub(crate) fn cancel_on_signals(token: &CancelToken) {
    if let Err(e) = signals::install_cancel_handlers(token) {
        tracing::warn!(error = %e, "Failed to install signal handlers");
    }
}

pub(crate) fn print_enumeration_errors(errors: &[EnumerationError]) {
    if errors.is_empty() {
        return;
    }
    eprintln!("\nEnumeration errors:");
    for error in errors {
        eprintln!("  {}", error);
    }
}

pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
