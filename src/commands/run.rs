// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Run command - replay a scripted editing session against a fixture source
//!
//! Useful for exercising a chain declaration end to end before wiring it
//! to live endpoints: every cascade, cache hit, stale discard, and fill
//! merge behaves exactly as it would in a host form.

use anyhow::{bail, Context, Result};
use chainform::chain::ChainSet;
use chainform::engine::FormEngine;
use chainform::fill::FillSession;
use chainform::fixture::FixtureSource;
use chainform::types::{ChainContext, FieldValue};
use owo_colors::OwoColorize;
use serde::Deserialize;
use std::path::Path;

/// One scripted form operation
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ScriptOp {
    /// Append an empty row
    AddRow,
    /// Write a field on the nth created row (1-based) and resolve the cascade
    Set {
        row: usize,
        field: String,
        value: FieldValue,
    },
    /// Pick a resolved option (copies denormalized sibling fields)
    Select {
        row: usize,
        field: String,
        value: FieldValue,
    },
    /// Delete the nth created row
    RemoveRow { row: usize },
    /// Open the fill picker for a document
    FillLoad { document: String },
    /// Filter the open fill picker
    FillFilter { text: String },
    /// Select one fill candidate by id
    FillSelect { id: String },
    /// Select every candidate in the filtered view
    FillSelectAll,
    /// Merge the selection into new rows
    FillApply,
    /// Snapshot all rows (blocks on missing required fields)
    Save,
}

/// Run the run command
pub async fn run(
    chains: &Path,
    fixture: &Path,
    script: &Path,
    ctx: ChainContext,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(chains)
        .with_context(|| format!("Failed to read {}", chains.display()))?;
    let chains = ChainSet::from_toml_str(&raw)
        .with_context(|| format!("Invalid chain set in {}", chains.display()))?;

    let source = FixtureSource::from_path(fixture)?;
    let fill_source = source.clone();
    let mut engine = FormEngine::new(chains, source, ctx);

    let raw = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let ops: Vec<ScriptOp> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid op script in {}", script.display()))?;

    // Rows are referenced by creation ordinal, stable across removals.
    let mut created: Vec<String> = Vec::new();
    let mut session: Option<FillSession> = None;

    for op in ops {
        match op {
            ScriptOp::AddRow => {
                let id = engine.add_row();
                println!("{} {}", "added".green(), id);
                created.push(id);
            }
            ScriptOp::Set { row, field, value } => {
                let id = row_id(&created, row)?;
                let fetches = engine.set_field(&id, &field, value)?;
                let pending = fetches.len();
                engine.resolve_pending(fetches).await;
                println!("set {}.{} ({} fetch(es))", id, field, pending);
            }
            ScriptOp::Select { row, field, value } => {
                let id = row_id(&created, row)?;
                let fetches = engine.select_option(&id, &field, &value)?;
                let pending = fetches.len();
                engine.resolve_pending(fetches).await;
                println!("selected {}.{} ({} fetch(es))", id, field, pending);
            }
            ScriptOp::RemoveRow { row } => {
                let id = row_id(&created, row)?;
                engine.remove_row(&id);
                println!("{} {}", "removed".red(), id);
            }
            ScriptOp::FillLoad { document } => {
                let loaded = FillSession::load(&fill_source, &engine, &document).await?;
                println!("fill grid: {} candidate(s)", loaded.candidates().len());
                session = Some(loaded);
            }
            ScriptOp::FillFilter { text } => {
                let session = open_session(&mut session)?;
                session.set_filter(&text);
                println!("filter '{}': {} visible", text, session.filtered().len());
            }
            ScriptOp::FillSelect { id } => {
                open_session(&mut session)?.select(&id);
            }
            ScriptOp::FillSelectAll => {
                let session = open_session(&mut session)?;
                session.select_all();
                println!("selected {} candidate(s)", session.selected().len());
            }
            ScriptOp::FillApply => {
                let rows = open_session(&mut session)?.apply(&mut engine);
                println!("{} {} row(s) merged", "filled".green(), rows.len());
                created.extend(rows);
            }
            ScriptOp::Save => match engine.save_snapshot() {
                Ok(snapshot) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&snapshot)?);
                    } else {
                        println!("{} {} row(s)", "saved".green().bold(), snapshot.len());
                        for row in &snapshot {
                            let fields: Vec<String> = row
                                .values
                                .iter()
                                .map(|(f, v)| format!("{f}={v}"))
                                .collect();
                            println!("  {}: {}", row.id, fields.join(", "));
                        }
                    }
                }
                Err(err) => {
                    println!("{} {}", "save blocked:".red().bold(), err);
                }
            },
        }
    }

    let notices = engine.take_notices();
    for notice in &notices {
        println!(
            "{} {}.{}: {}",
            "notice".yellow().bold(),
            notice.row,
            notice.step,
            notice.message
        );
    }

    println!();
    println!(
        "{} row(s), {} cached combination(s), {} notice(s)",
        engine.row_count(),
        engine.cache().len(),
        notices.len()
    );

    Ok(())
}

/// Resolve a 1-based creation ordinal to a row id
fn row_id(created: &[String], ordinal: usize) -> Result<String> {
    if ordinal == 0 || ordinal > created.len() {
        bail!(
            "row {} out of range ({} created so far)",
            ordinal,
            created.len()
        );
    }
    Ok(created[ordinal - 1].clone())
}

fn open_session(session: &mut Option<FillSession>) -> Result<&mut FillSession> {
    session
        .as_mut()
        .context("no fill grid loaded; add a fill_load op first")
}
