// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Fill/merge reconciler - bulk candidate grid to seeded rows
//!
//! The fill grid is a flattened snapshot of every eligible chain
//! combination for the active document. The user filters it client-side,
//! multi-selects, and confirms; each selected candidate becomes one new,
//! fully populated row in the engine, bypassing the step-by-step cascade
//! because the data is already resolved.

use crate::engine::FormEngine;
use crate::source::{FillSource, OptionSource};
use crate::types::Candidate;
use crate::SourceError;
use tracing::debug;

/// One open fill picker: candidates, filter, and selection state
#[derive(Debug)]
pub struct FillSession {
    candidates: Vec<Candidate>,
    // textual chain fields the filter matches against
    fields: Vec<String>,
    filter: String,
    // candidate ids in the order the user picked them
    selected: Vec<String>,
}

impl FillSession {
    /// Fetch a fresh candidate snapshot for a document
    ///
    /// Refetched every time the picker opens; never served from the option
    /// cache (it is a bulk snapshot, not a per-step lookup).
    pub async fn load<F, S>(
        source: &F,
        engine: &FormEngine<S>,
        document: &str,
    ) -> Result<Self, SourceError>
    where
        F: FillSource,
        S: OptionSource,
    {
        let candidates = source.fetch_candidates(document, engine.context()).await?;
        debug!(document, count = candidates.len(), "loaded fill candidates");
        Ok(Self {
            candidates,
            fields: engine
                .chains()
                .chain_fields()
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
            filter: String::new(),
            selected: Vec::new(),
        })
    }

    /// Every fetched candidate, unfiltered
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Set the client-side filter text; never re-fetches
    pub fn set_filter(&mut self, text: &str) {
        self.filter = text.to_string();
    }

    /// Current filter text
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// The currently visible view: partial, case-insensitive match on any
    /// textual chain field
    #[must_use]
    pub fn filtered(&self) -> Vec<&Candidate> {
        self.candidates
            .iter()
            .filter(|c| self.matches(c))
            .collect()
    }

    fn matches(&self, candidate: &Candidate) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        let needle = self.filter.to_lowercase();
        self.fields.iter().any(|field| {
            candidate
                .fields
                .get(field)
                .and_then(|v| v.as_text())
                .is_some_and(|text| text.to_lowercase().contains(&needle))
        })
    }

    /// Add one candidate to the selection (idempotent, keeps pick order)
    pub fn select(&mut self, candidate_id: &str) {
        if self.candidates.iter().any(|c| c.id == candidate_id)
            && !self.selected.iter().any(|s| s == candidate_id)
        {
            self.selected.push(candidate_id.to_string());
        }
    }

    /// Remove one candidate from the selection
    pub fn deselect(&mut self, candidate_id: &str) {
        self.selected.retain(|s| s != candidate_id);
    }

    /// Toggle one candidate's selection
    pub fn toggle(&mut self, candidate_id: &str) {
        if self.selected.iter().any(|s| s == candidate_id) {
            self.deselect(candidate_id);
        } else {
            self.select(candidate_id);
        }
    }

    /// Select every candidate in the *currently filtered* view
    ///
    /// An active filter scopes select-all: hidden candidates are never
    /// silently included. Additive with respect to prior picks.
    pub fn select_all(&mut self) {
        let visible: Vec<String> = self.filtered().iter().map(|c| c.id.clone()).collect();
        for id in visible {
            if !self.selected.iter().any(|s| s == &id) {
                self.selected.push(id);
            }
        }
    }

    /// Clear the selection, keeping the candidates and filter
    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Candidate ids in pick order
    #[must_use]
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Materialize one new row per selected candidate
    ///
    /// Rows are appended in pick order (not candidate-grid order), each
    /// with its chain fields copied verbatim and gated open without a
    /// fetch. The session's filter and selection are cleared afterward.
    pub fn apply<S: OptionSource>(&mut self, engine: &mut FormEngine<S>) -> Vec<String> {
        let mut rows = Vec::with_capacity(self.selected.len());
        for id in &self.selected {
            if let Some(candidate) = self.candidates.iter().find(|c| &c.id == id) {
                rows.push(engine.seed_row(candidate));
            }
        }
        self.selected.clear();
        self.filter.clear();
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::chain::ChainSet;
    use crate::types::{ChainContext, FieldValue, OptionRecord};
    use std::collections::BTreeMap;

    struct EmptySource;

    impl OptionSource for EmptySource {
        async fn fetch_options(
            &self,
            _step: &str,
            _upstream: &[(String, FieldValue)],
            _ctx: &ChainContext,
        ) -> Result<Vec<OptionRecord>, SourceError> {
            Ok(vec![])
        }
    }

    struct GridSource {
        grid: Vec<Candidate>,
    }

    impl FillSource for GridSource {
        async fn fetch_candidates(
            &self,
            _document: &str,
            _ctx: &ChainContext,
        ) -> Result<Vec<Candidate>, SourceError> {
            Ok(self.grid.clone())
        }
    }

    fn candidate(id: &str, part: &str, grn: &str) -> Candidate {
        let mut fields = BTreeMap::new();
        fields.insert("part_no".to_string(), FieldValue::from(part));
        fields.insert("grn_no".to_string(), FieldValue::from(grn));
        fields.insert("qty".to_string(), FieldValue::Number(5.0));
        Candidate {
            id: id.to_string(),
            fields,
        }
    }

    fn engine() -> FormEngine<EmptySource> {
        let chains = ChainSet::new(vec![Chain::linear(
            "grn",
            &[("part_no", "Part No"), ("grn_no", "GRN No"), ("qty", "Qty")],
        )])
        .unwrap();
        FormEngine::new(chains, EmptySource, ChainContext::default())
    }

    async fn session(engine: &FormEngine<EmptySource>) -> FillSession {
        let source = GridSource {
            grid: vec![
                candidate("c1", "PN-100", "G1"),
                candidate("c2", "PN-100", "G2"),
                candidate("c3", "PN-200", "G7"),
            ],
        };
        FillSession::load(&source, engine, "DOC-1").await.unwrap()
    }

    #[tokio::test]
    async fn test_filter_is_case_insensitive_and_partial() {
        let engine = engine();
        let mut session = session(&engine).await;

        session.set_filter("pn-1");
        assert_eq!(session.filtered().len(), 2);

        session.set_filter("g7");
        let visible = session.filtered();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "c3");

        session.set_filter("");
        assert_eq!(session.filtered().len(), 3);
    }

    #[tokio::test]
    async fn test_select_all_respects_filter() {
        let engine = engine();
        let mut session = session(&engine).await;

        // Filter hides c3: select-all must yield exactly the 2 visible.
        session.set_filter("PN-100");
        session.select_all();
        assert_eq!(session.selected().len(), 2);
        assert!(!session.selected().contains(&"c3".to_string()));
    }

    #[tokio::test]
    async fn test_select_all_is_additive_without_duplicates() {
        let engine = engine();
        let mut session = session(&engine).await;

        session.select("c3");
        session.set_filter("PN-100");
        session.select_all();
        session.select_all();

        // c3 picked first, then the filtered pair, nothing twice.
        assert_eq!(session.selected(), &["c3", "c1", "c2"]);
    }

    #[tokio::test]
    async fn test_apply_creates_rows_in_pick_order() {
        let mut engine = engine();
        let mut session = session(&engine).await;

        session.select("c2");
        session.select("c1");
        let rows = session.apply(&mut engine);
        assert_eq!(rows.len(), 2);

        // Pick order, not grid order.
        assert_eq!(
            engine.row(&rows[0]).unwrap().value("grn_no"),
            FieldValue::from("G2")
        );
        assert_eq!(
            engine.row(&rows[1]).unwrap().value("grn_no"),
            FieldValue::from("G1")
        );

        // Session state resets after apply.
        assert!(session.selected().is_empty());
        assert!(session.filter().is_empty());
    }

    #[tokio::test]
    async fn test_seeded_rows_are_gated_open() {
        let mut engine = engine();
        let mut session = session(&engine).await;
        session.select("c1");
        let rows = session.apply(&mut engine);
        let row = &rows[0];

        // All chain fields populated, option lists seeded, nothing loading.
        let r = engine.row(row).unwrap();
        assert_eq!(r.value("part_no"), FieldValue::from("PN-100"));
        assert_eq!(r.value("grn_no"), FieldValue::from("G1"));
        assert_eq!(r.value("qty"), FieldValue::Number(5.0));
        assert_eq!(engine.resolved_options(row, "grn_no").len(), 1);
        assert!(!engine.is_step_loading(row, "grn_no"));

        // Saving works immediately: the seeded row satisfies gating.
        assert!(engine.save_snapshot().is_ok());
    }

    #[tokio::test]
    async fn test_toggle_and_deselect() {
        let engine = engine();
        let mut session = session(&engine).await;

        session.toggle("c1");
        assert_eq!(session.selected(), &["c1"]);
        session.toggle("c1");
        assert!(session.selected().is_empty());

        session.select("unknown");
        assert!(session.selected().is_empty());
    }
}
