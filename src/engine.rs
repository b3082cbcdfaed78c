// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Row state store and cascade controller
//!
//! Execution is single-threaded and event-driven: every mutation happens in
//! response to a host interaction or the completion of one asynchronous
//! fetch. [`FormEngine::set_field`] applies the synchronous part of a
//! cascade (gating, transitive clearing, cache lookups) and hands back
//! [`CascadeFetch`] tickets for the steps that need a remote resolution;
//! [`FormEngine::complete_fetch`] drives one ticket and applies the result
//! only if the row's upstream state still matches.

use crate::cache::{CacheKey, OptionCache};
use crate::chain::ChainSet;
use crate::source::OptionSource;
use crate::types::{ChainContext, FieldValue, Notice, OptionRecord};
use crate::EngineError;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// One unit of editable chain state
///
/// Rows are mutually independent: no two rows share option lists or
/// in-flight bookkeeping, even when their field values coincide. Identity
/// is the opaque `row:<n>` id, never the array position.
#[derive(Debug, Clone)]
pub struct Row {
    id: String,
    values: BTreeMap<String, FieldValue>,
    options: BTreeMap<String, Arc<Vec<OptionRecord>>>,
    // step -> id of the fetch currently allowed to write its options
    loading: HashMap<String, u64>,
}

impl Row {
    fn new(id: String) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
            options: BTreeMap::new(),
            loading: HashMap::new(),
        }
    }

    /// Stable row identity
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current value of a field, empty if unset
    #[must_use]
    pub fn value(&self, field: &str) -> FieldValue {
        self.values
            .get(field)
            .cloned()
            .unwrap_or_else(FieldValue::empty)
    }

    /// All non-empty field values
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    /// Resolved option list for a field, if any
    #[must_use]
    pub fn options(&self, field: &str) -> Option<&Arc<Vec<OptionRecord>>> {
        self.options.get(field)
    }
}

/// A pending asynchronous option resolution for one row and step
///
/// Freezes the upstream tuple in effect when the fetch was issued, so the
/// completion can be compared against the row's current state and a
/// superseded response discarded.
#[derive(Debug, Clone)]
pub struct CascadeFetch {
    request: u64,
    row: String,
    step: String,
    upstream: Vec<(String, FieldValue)>,
    key: CacheKey,
}

impl CascadeFetch {
    /// Row the fetch belongs to
    #[must_use]
    pub fn row(&self) -> &str {
        &self.row
    }

    /// Chain step being resolved
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }
}

/// How one fetch completion was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Options written into the row
    Applied,
    /// The row's upstream state moved on; result dropped silently
    Discarded,
    /// The source failed; options resolved to empty and a notice was queued
    Failed,
}

/// A consistent read of one row's field values at save time
#[derive(Debug, Clone, serde::Serialize)]
pub struct RowSnapshot {
    /// Row identity
    pub id: String,
    /// Field values (option lists are not part of a save payload)
    pub values: BTreeMap<String, FieldValue>,
}

/// The dependent-field resolution engine for one open form
pub struct FormEngine<S> {
    chains: ChainSet,
    source: S,
    ctx: ChainContext,
    rows: Vec<Row>,
    cache: OptionCache,
    notices: Vec<Notice>,
    next_row: u64,
    next_request: u64,
}

impl<S: OptionSource> FormEngine<S> {
    /// Create an engine for a validated chain set, a remote source, and an
    /// explicit session context
    #[must_use]
    pub fn new(chains: ChainSet, source: S, ctx: ChainContext) -> Self {
        Self {
            chains,
            source,
            ctx,
            rows: Vec::new(),
            cache: OptionCache::new(),
            notices: Vec::new(),
            next_row: 0,
            next_request: 0,
        }
    }

    /// The session context lookups are parameterized with
    #[must_use]
    pub fn context(&self) -> &ChainContext {
        &self.ctx
    }

    /// The chain declarations this engine enforces
    #[must_use]
    pub fn chains(&self) -> &ChainSet {
        &self.chains
    }

    /// Read access to the option cache (diagnostics)
    #[must_use]
    pub fn cache(&self) -> &OptionCache {
        &self.cache
    }

    // =========================================================================
    // Row lifecycle
    // =========================================================================

    /// Append a new empty row; returns its id
    pub fn add_row(&mut self) -> String {
        let id = self.alloc_row_id();
        self.rows.push(Row::new(id.clone()));
        id
    }

    /// Remove a row; cache entries are untouched (keyed by value tuples,
    /// not row identity)
    pub fn remove_row(&mut self, row_id: &str) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != row_id);
        self.rows.len() != before
    }

    /// Look up a row by id
    #[must_use]
    pub fn row(&self, row_id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    /// All rows in insertion order
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Append a row fully populated from one fill candidate
    ///
    /// Chain fields are copied verbatim and each populated step's option
    /// list is seeded with the candidate's own value, so the row is gated
    /// open without triggering a single fetch. Non-chain candidate fields
    /// are ignored; free-text columns start empty.
    pub fn seed_row(&mut self, candidate: &crate::types::Candidate) -> String {
        let id = self.alloc_row_id();
        let mut row = Row::new(id.clone());
        for field in self.chains.chain_fields() {
            if let Some(value) = candidate.fields.get(field) {
                if !value.is_empty() {
                    row.values.insert(field.to_string(), value.clone());
                    row.options.insert(
                        field.to_string(),
                        Arc::new(vec![OptionRecord::new(value.clone(), value.to_string())]),
                    );
                }
            }
        }
        self.rows.push(row);
        id
    }

    // =========================================================================
    // Cascade Controller
    // =========================================================================

    /// Write a field value and apply the cascade
    ///
    /// Clears the field's transitive invalidation closure, then for every
    /// dependent step whose full upstream tuple is now populated either
    /// serves options from the cache or returns a fetch ticket. A chain
    /// write whose own upstream dependencies are empty is defensively
    /// ignored: that can only come from a host programming error.
    pub fn set_field(
        &mut self,
        row_id: &str,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Vec<CascadeFetch>, EngineError> {
        let value = value.into();
        let row_idx = self
            .rows
            .iter()
            .position(|r| r.id == row_id)
            .ok_or_else(|| EngineError::RowNotFound(row_id.to_string()))?;

        if let Some(step) = self.chains.step(field) {
            if !value.is_empty() {
                let gated = step
                    .depends_on
                    .iter()
                    .any(|dep| self.rows[row_idx].value(dep).is_empty());
                if gated {
                    warn!(row = row_id, field, "ignoring write to gated chain field");
                    return Ok(vec![]);
                }
            }
        }

        let row = &mut self.rows[row_idx];
        if value.is_empty() {
            row.values.remove(field);
        } else {
            row.values.insert(field.to_string(), value.clone());
        }

        if !self.chains.is_chain_field(field) {
            // Row-local free-text edit, no cascade.
            return Ok(vec![]);
        }

        for cleared in self.chains.invalidation_closure(field) {
            let row = &mut self.rows[row_idx];
            row.values.remove(&cleared);
            row.options.remove(&cleared);
            row.loading.remove(&cleared);
        }

        if value.is_empty() {
            return Ok(vec![]);
        }

        let mut fetches = Vec::new();
        let next_steps: Vec<String> = self
            .chains
            .next_steps(field)
            .iter()
            .map(|s| s.id.clone())
            .collect();
        for step_id in next_steps {
            if let Some(fetch) = self.gate_and_issue(row_idx, &step_id) {
                fetches.push(fetch);
            }
        }
        Ok(fetches)
    }

    /// Check a step's dependency tuple and either apply cached options or
    /// issue a fetch ticket; partial tuples never trigger a request
    fn gate_and_issue(&mut self, row_idx: usize, step_id: &str) -> Option<CascadeFetch> {
        let step = self.chains.step(step_id)?;
        let row = &self.rows[row_idx];

        let mut upstream = Vec::with_capacity(step.depends_on.len());
        for dep in &step.depends_on {
            let value = row.value(dep);
            if value.is_empty() {
                return None;
            }
            upstream.push((dep.clone(), value));
        }

        let tuple: Vec<FieldValue> = upstream.iter().map(|(_, v)| v.clone()).collect();
        let key = CacheKey::new(step_id, &tuple);

        if let Some(options) = self.cache.get(&key) {
            debug!(row = %self.rows[row_idx].id, step = step_id, key = %key.display_id(), "cache hit");
            let row = &mut self.rows[row_idx];
            row.options.insert(step_id.to_string(), options);
            // A synchronous resolution supersedes any in-flight request.
            row.loading.remove(step_id);
            return None;
        }

        self.next_request += 1;
        let request = self.next_request;
        let row = &mut self.rows[row_idx];
        row.loading.insert(step_id.to_string(), request);
        Some(CascadeFetch {
            request,
            row: row.id.clone(),
            step: step_id.to_string(),
            upstream,
            key,
        })
    }

    /// Drive one pending fetch to completion and apply the staleness check
    ///
    /// The result is written back only if the row still exists, the row's
    /// current upstream tuple equals the tuple the fetch was issued for,
    /// and no newer request has taken over the step. A superseded response
    /// is dropped silently; it is never an error.
    pub async fn complete_fetch(&mut self, fetch: CascadeFetch) -> FetchOutcome {
        let result = self
            .source
            .fetch_options(&fetch.step, &fetch.upstream, &self.ctx)
            .await;

        match result {
            Ok(options) => {
                // Cache by tuple regardless of row state: the data is valid
                // for any row that reaches the same combination later.
                let shared = self.cache.put(fetch.key.clone(), options);

                let Some(row) = self.rows.iter_mut().find(|r| r.id == fetch.row) else {
                    debug!(step = %fetch.step, "row deleted before fetch completed");
                    return FetchOutcome::Discarded;
                };

                let superseded = row.loading.get(&fetch.step) != Some(&fetch.request)
                    || fetch
                        .upstream
                        .iter()
                        .any(|(dep, issued)| &row.value(dep) != issued);
                if superseded {
                    debug!(
                        row = %fetch.row,
                        step = %fetch.step,
                        key = %fetch.key.display_id(),
                        "discarding stale option resolution"
                    );
                    return FetchOutcome::Discarded;
                }

                row.options.insert(fetch.step.clone(), shared);
                row.loading.remove(&fetch.step);
                FetchOutcome::Applied
            }
            Err(err) => {
                let Some(row) = self.rows.iter_mut().find(|r| r.id == fetch.row) else {
                    return FetchOutcome::Discarded;
                };
                if row.loading.get(&fetch.step) != Some(&fetch.request) {
                    // A superseded request's failure is not surfaced.
                    return FetchOutcome::Discarded;
                }

                warn!(row = %fetch.row, step = %fetch.step, error = %err, "option fetch failed");
                row.options.insert(fetch.step.clone(), Arc::new(vec![]));
                row.loading.remove(&fetch.step);
                self.notices.push(Notice {
                    row: fetch.row.clone(),
                    step: fetch.step.clone(),
                    message: err.to_string(),
                    at: Utc::now(),
                });
                FetchOutcome::Failed
            }
        }
    }

    /// Drive a batch of tickets in order
    pub async fn resolve_pending(&mut self, fetches: Vec<CascadeFetch>) {
        for fetch in fetches {
            self.complete_fetch(fetch).await;
        }
    }

    /// Convenience: set a field and await every cascade fetch inline
    pub async fn set_field_resolved(
        &mut self,
        row_id: &str,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), EngineError> {
        let fetches = self.set_field(row_id, field, value)?;
        self.resolve_pending(fetches).await;
        Ok(())
    }

    /// Select one of a field's resolved options
    ///
    /// Behaves like [`Self::set_field`] and additionally copies the
    /// option's denormalized sibling data into non-chain columns. Sibling
    /// copies are direct field writes exempt from cascade clearing; a
    /// sibling key that collides with a chain field is ignored.
    pub fn select_option(
        &mut self,
        row_id: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<CascadeFetch>, EngineError> {
        let extras: Option<BTreeMap<String, FieldValue>> = self
            .row(row_id)
            .ok_or_else(|| EngineError::RowNotFound(row_id.to_string()))?
            .options(field)
            .and_then(|opts| opts.iter().find(|o| &o.value == value))
            .map(|o| o.extras.clone());

        let fetches = self.set_field(row_id, field, value.clone())?;

        // Only copy siblings if the write actually stuck (it may have been
        // defensively ignored).
        let row = self.rows.iter_mut().find(|r| r.id == row_id);
        if let (Some(row), Some(extras)) = (row, extras) {
            if &row.value(field) == value {
                for (target, extra) in extras {
                    if self.chains.is_chain_field(&target) {
                        warn!(field = %target, "ignoring sibling copy into chain field");
                        continue;
                    }
                    row.values.insert(target, extra);
                }
            }
        }
        Ok(fetches)
    }

    // =========================================================================
    // Host queries
    // =========================================================================

    /// Resolved option list for a row's field (empty slice if unresolved)
    #[must_use]
    pub fn resolved_options(&self, row_id: &str, field: &str) -> Vec<OptionRecord> {
        self.row(row_id)
            .and_then(|r| r.options(field))
            .map(|opts| opts.as_ref().clone())
            .unwrap_or_default()
    }

    /// Whether a fetch issued for this row and step is still outstanding
    ///
    /// Keyed to the live request, not the field: a superseded fetch can
    /// never leave a stuck loading indicator.
    #[must_use]
    pub fn is_step_loading(&self, row_id: &str, field: &str) -> bool {
        self.row(row_id)
            .is_some_and(|r| r.loading.contains_key(field))
    }

    /// Drain queued non-blocking notices (fetch failures)
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Read a consistent snapshot of all rows' field values
    ///
    /// Does not block on in-flight cascade resolutions; rows mid-cascade
    /// are captured with whatever values are currently set. A row missing
    /// a required chain field blocks the save - the engine's one hard-stop
    /// error class.
    pub fn save_snapshot(&self) -> Result<Vec<RowSnapshot>, EngineError> {
        let required = self.chains.required_fields();
        for row in &self.rows {
            let missing: Vec<String> = required
                .iter()
                .filter(|f| row.value(f).is_empty())
                .map(|f| (*f).to_string())
                .collect();
            if !missing.is_empty() {
                return Err(EngineError::IncompleteRow {
                    row: row.id.clone(),
                    missing,
                });
            }
        }
        Ok(self
            .rows
            .iter()
            .map(|r| RowSnapshot {
                id: r.id.clone(),
                values: r.values.clone(),
            })
            .collect())
    }

    fn alloc_row_id(&mut self) -> String {
        self.next_row += 1;
        format!("row:{}", self.next_row)
    }
}
