// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Validate command - definition-time check of a chain-set declaration

use anyhow::{Context, Result};
use chainform::chain::ChainSet;
use owo_colors::OwoColorize;
use std::path::Path;

/// Run the validate command
pub fn run(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let set = ChainSet::from_toml_str(&raw)
        .with_context(|| format!("Invalid chain set in {}", path.display()))?;

    println!("{} {}", "OK".green().bold(), path.display());
    for chain in set.chains() {
        println!("  chain '{}' ({} steps)", chain.name, chain.steps.len());
        for step in &chain.steps {
            let deps = if step.depends_on.is_empty() {
                "root".to_string()
            } else {
                format!("after {}", step.depends_on.join(" + "))
            };
            let required = if step.required { " [required]" } else { "" };
            println!("    {} <- {}{}", step.id, deps, required.yellow());
        }
    }

    Ok(())
}
