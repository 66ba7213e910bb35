//! Types command implementation.

use crate::cli::TypesArgs;
use crate::config::Config;
use crate::engine::{Sweeper, SweeperOptions};
use crate::inventory::{Inventory, InventoryStore};
use crate::resources::Scope;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct TypeRow<'a> {
    position: usize,
    name: &'a str,
    scope: Scope,
    depends_on: &'a [String],
    aliases: &'a [String],
    selected: bool,
}

/// Run the types command.
pub fn run(args: TypesArgs, config: &Config) -> Result<()> {
    let store = InventoryStore::new(Inventory::load(&args.inventory.inventory)?);
    let registry = Arc::new(store.registry()?);
    let sweeper = Sweeper::new(Arc::clone(&registry), SweeperOptions::from_config(config))?;

    let rows: Vec<TypeRow<'_>> = sweeper
        .order()
        .names()
        .iter()
        .enumerate()
        .filter_map(|(position, name)| {
            let descriptor = registry.resolve(name)?;
            Some(TypeRow {
                position: position + 1,
                name: descriptor.name(),
                scope: descriptor.scope(),
                depends_on: descriptor.dependencies(),
                aliases: descriptor.aliases(),
                selected: sweeper.selected_types().iter().any(|s| s == name),
            })
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("  {:>3} {:<40} {:<8} {}", "#", "TYPE", "SCOPE", "DEPENDS ON");
    println!("  {}", "─".repeat(72));
    for row in &rows {
        let marker = if row.selected { "" } else { " (excluded)" };
        println!(
            "  {:>3} {:<40} {:<8} {}{}",
            row.position,
            row.name,
            row.scope.to_string(),
            row.depends_on.join(", "),
            marker
        );
    }

    Ok(())
}
