//! Plan command implementation.

use crate::cli::PlanArgs;
use crate::commands::{cancel_on_signals, plural, print_enumeration_errors, run_token, Session};
use crate::config::Config;
use crate::engine::{Classification, EnumerationError, ExecutionPlan, PlanDecision};
use anyhow::Result;
use serde::Serialize;

#[derive(Serialize)]
struct PlanOutput<'a> {
    decisions: &'a [PlanDecision],
    enumeration_errors: &'a [EnumerationError],
}

/// Run the plan command.
pub fn run(args: PlanArgs, config: &Config) -> Result<()> {
    let session = Session::open(config, &args.inventory, &args.selection, None)?;
    let cancel = run_token(config);
    cancel_on_signals(&cancel);

    let plan = session
        .sweeper
        .plan(&session.target, &session.filters, &cancel);

    if args.json {
        let output = PlanOutput {
            decisions: plan.decisions(),
            enumeration_errors: plan.enumeration_errors(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_plan(&plan);
    Ok(())
}

pub(crate) fn print_plan(plan: &ExecutionPlan) {
    if plan.decisions().is_empty() {
        println!("No resources found.");
    } else {
        println!(
            "\n  {:<32} {:<14} {:<36} {}",
            "TYPE", "REGION", "IDENTITY", "DECISION"
        );
        println!("  {}", "─".repeat(100));
        for decision in plan.decisions() {
            let verdict = match &decision.classification {
                Classification::Remove { .. } => "would remove".to_string(),
                Classification::Skip { reason } => format!("skip: {reason}"),
            };
            println!(
                "  {:<32} {:<14} {:<36} {}",
                decision.type_name,
                decision.region.as_deref().unwrap_or("global"),
                decision.identity,
                verdict
            );
        }
    }

    print_enumeration_errors(plan.enumeration_errors());

    let remove = plan.remove_count();
    let skip = plan.skip_count();
    println!(
        "\nPlan: {} resource{} to remove, {} to skip",
        remove,
        plural(remove),
        skip
    );
}
