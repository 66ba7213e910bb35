//! Run command implementation.

use crate::cli::RunArgs;
use crate::commands::plan::print_plan;
use crate::commands::{cancel_on_signals, plural, print_enumeration_errors, run_token, Session};
use crate::config::Config;
use crate::engine::{Outcome, RunReport};
use crate::resources::ExecContext;
use anyhow::Result;
use std::io::{self, Write};

/// Run the run command.
pub fn run(args: RunArgs, config: &Config) -> Result<()> {
    let session = Session::open(config, &args.inventory, &args.selection, args.jobs)?;
    let cancel = run_token(config);

    let plan = session
        .sweeper
        .plan(&session.target, &session.filters, &cancel);

    if !args.json {
        print_plan(&plan);
    }

    if plan.remove_count() == 0 && !args.json {
        println!("Nothing to remove.");
    }

    // Prompt on stderr so `--json` output stays parseable.
    if plan.remove_count() > 0 && !args.force {
        eprint!(
            "\nRemove {} resource{} from account {}? [y/N] ",
            plan.remove_count(),
            plural(plan.remove_count()),
            session.target.account_id
        );
        io::stderr().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Aborted.");
            return Ok(());
        }
    }

    // Until now Ctrl-C terminates; from here on it lets in-flight removals finish.
    cancel_on_signals(&cancel);

    let report = session.sweeper.execute(plan, &ExecContext::new(cancel));

    if args.write {
        session.store.snapshot().save(&args.inventory.inventory)?;
        tracing::info!(
            path = %args.inventory.inventory.display(),
            remaining = session.store.resource_count(),
            "Saved inventory"
        );
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.has_failures() {
        std::process::exit(5); // Partial failure
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    let summary = report.summary();

    println!("\nResults:");
    println!(
        "  Removed: {} resource{}",
        summary.removed_count,
        plural(summary.removed_count)
    );
    if summary.skipped_count > 0 {
        println!(
            "  Skipped: {} resource{}",
            summary.skipped_count,
            plural(summary.skipped_count)
        );
    }
    if summary.failed_count > 0 {
        println!(
            "  Failed:  {} resource{} ({} retryable)",
            summary.failed_count,
            plural(summary.failed_count),
            summary.retryable_count
        );
    }

    for entry in report.failures() {
        if let Outcome::Failed { error, attempts, .. } = &entry.outcome {
            eprintln!(
                "  Error removing {} {} after {} attempt{}: {}",
                entry.type_name,
                entry.identity,
                attempts,
                plural(*attempts as usize),
                error
            );
        }
    }

    for lingering in &report.lingering {
        eprintln!(
            "  Still present after removal: {} {}",
            lingering.type_name, lingering.identity
        );
    }

    print_enumeration_errors(&report.enumeration_errors);
}
