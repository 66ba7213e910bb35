use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Cloud Sweeper - remove every resource in a cloud account, in dependency order
#[derive(Parser, Debug)]
#[command(name = "cloud-sweeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List resource types in execution order
    Types(TypesArgs),

    /// Scan and classify resources without removing anything
    Plan(PlanArgs),

    /// Scan, classify and remove resources
    Run(RunArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    /// Inventory file describing the account
    #[arg(short, long, env = "CLOUD_SWEEPER_INVENTORY", value_name = "PATH")]
    pub inventory: PathBuf,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Regions to process (can be specified multiple times; default: all)
    #[arg(short, long, value_name = "REGION")]
    pub region: Vec<String>,

    /// Resource types to process (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_name = "TYPES")]
    pub types: Option<Vec<String>>,

    /// Resource types to leave alone (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_name = "TYPES")]
    pub exclude: Option<Vec<String>>,
}

#[derive(Args, Debug)]
pub struct TypesArgs {
    #[command(flatten)]
    pub inventory: InventoryArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub inventory: InventoryArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub inventory: InventoryArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub force: bool,

    /// Parallel removals per resource type
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Save the remaining resources back to the inventory file
    #[arg(short, long)]
    pub write: bool,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}
