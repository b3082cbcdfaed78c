// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! File-backed option and fill sources
//!
//! Backs the CLI `run` command and deterministic tests: one JSON file
//! declares the option list for each (step, upstream tuple) combination,
//! the fill candidate grid, and optionally steps that should fail to
//! resolve (to exercise the recovery path).

use crate::source::{FillSource, OptionSource};
use crate::types::{Candidate, ChainContext, FieldValue, OptionRecord};
use crate::SourceError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct FixtureOptions {
    step: String,
    #[serde(default)]
    upstream: Vec<FieldValue>,
    options: Vec<OptionRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    options: Vec<FixtureOptions>,
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    fail: Vec<String>,
}

/// Deterministic source resolving lookups from a fixture file
#[derive(Debug, Clone)]
pub struct FixtureSource {
    entries: HashMap<(String, Vec<String>), Vec<OptionRecord>>,
    candidates: Vec<Candidate>,
    fail: Vec<String>,
}

impl FixtureSource {
    /// Load a fixture from a JSON file on disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("Failed to parse fixture {}", path.display()))
    }

    /// Parse a fixture from a JSON string
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(raw)?;
        let mut entries = HashMap::new();
        for entry in file.options {
            let tuple: Vec<String> = entry.upstream.iter().map(FieldValue::canonical).collect();
            entries.insert((entry.step, tuple), entry.options);
        }
        Ok(Self {
            entries,
            candidates: file.candidates,
            fail: file.fail,
        })
    }

    /// Number of declared (step, tuple) combinations
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl OptionSource for FixtureSource {
    async fn fetch_options(
        &self,
        step: &str,
        upstream: &[(String, FieldValue)],
        _ctx: &ChainContext,
    ) -> Result<Vec<OptionRecord>, SourceError> {
        if self.fail.iter().any(|s| s == step) {
            return Err(SourceError::Fetch {
                step: step.to_string(),
                message: "fixture declares this step as failing".into(),
            });
        }
        let tuple: Vec<String> = upstream.iter().map(|(_, v)| v.canonical()).collect();
        let options = self
            .entries
            .get(&(step.to_string(), tuple))
            .cloned()
            .unwrap_or_default();
        debug!(step, count = options.len(), "fixture lookup");
        Ok(options)
    }
}

impl FillSource for FixtureSource {
    async fn fetch_candidates(
        &self,
        _document: &str,
        _ctx: &ChainContext,
    ) -> Result<Vec<Candidate>, SourceError> {
        Ok(self.candidates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "options": [
            {
                "step": "grn_no",
                "upstream": ["PN-100"],
                "options": [
                    {"value": "G1", "label": "GRN 1"},
                    {"value": "G2", "label": "GRN 2", "extras": {"grn_date": "2025-02-01"}}
                ]
            }
        ],
        "candidates": [
            {"id": "c1", "fields": {"part_no": "PN-100", "grn_no": "G1"}}
        ],
        "fail": ["bin_type"]
    }"#;

    #[tokio::test]
    async fn test_fixture_lookup() {
        let source = FixtureSource::from_json_str(FIXTURE).unwrap();
        assert_eq!(source.entry_count(), 1);

        let upstream = vec![("part_no".to_string(), FieldValue::from("PN-100"))];
        let options = source
            .fetch_options("grn_no", &upstream, &ChainContext::default())
            .await
            .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].extras.get("grn_date"), Some(&FieldValue::from("2025-02-01")));

        // Undeclared tuples resolve to empty, not an error.
        let other = vec![("part_no".to_string(), FieldValue::from("PN-999"))];
        let options = source
            .fetch_options("grn_no", &other, &ChainContext::default())
            .await
            .unwrap();
        assert!(options.is_empty());
    }

    #[tokio::test]
    async fn test_fixture_declared_failure() {
        let source = FixtureSource::from_json_str(FIXTURE).unwrap();
        let upstream = vec![("part_no".to_string(), FieldValue::from("PN-100"))];
        let err = source
            .fetch_options("bin_type", &upstream, &ChainContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_fixture_candidates() {
        let source = FixtureSource::from_json_str(FIXTURE).unwrap();
        let candidates = source
            .fetch_candidates("DOC-1", &ChainContext::default())
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].field("part_no"), FieldValue::from("PN-100"));
    }
}
