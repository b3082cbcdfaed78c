// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Remote option loading contracts and response normalization
//!
//! Remote endpoints in the source system answer in more than one envelope
//! shape. Rather than duck-typing each response, a closed set of
//! normalization strategies is tried in a fixed order, falling through to
//! an empty list (logged, never thrown).

use crate::types::{Candidate, ChainContext, FieldValue, OptionRecord};
use crate::SourceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// The abstract `fetchStepOptions` operation consumed by the engine
///
/// Implementations must only be called with a complete, non-empty upstream
/// tuple; the cascade controller short-circuits before that.
pub trait OptionSource {
    /// Resolve the option list for one chain step given the owning row's
    /// upstream values (in dependency order)
    fn fetch_options(
        &self,
        step: &str,
        upstream: &[(String, FieldValue)],
        ctx: &ChainContext,
    ) -> impl std::future::Future<Output = Result<Vec<OptionRecord>, SourceError>>;
}

/// The abstract `fetchFillableGrid` bulk operation for the fill/merge
/// reconciler
///
/// Returns the full denormalized tuple per candidate; results are a bulk
/// snapshot and deliberately bypass the option cache.
pub trait FillSource {
    /// Fetch all currently eligible candidate combinations for a document
    fn fetch_candidates(
        &self,
        document: &str,
        ctx: &ChainContext,
    ) -> impl std::future::Future<Output = Result<Vec<Candidate>, SourceError>>;
}

/// How raw records are shaped into [`OptionRecord`]s for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordShape {
    /// Record field holding the step's own value
    pub value_field: String,
    /// Record field holding the display label; falls back to the value
    #[serde(default)]
    pub label_field: Option<String>,
    /// Denormalized sibling copies: source record key -> target field id
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
}

impl RecordShape {
    /// Shape keyed on a single value field, no label or siblings
    #[must_use]
    pub fn value_only(value_field: &str) -> Self {
        Self {
            value_field: value_field.to_string(),
            label_field: None,
            extra_fields: BTreeMap::new(),
        }
    }
}

/// Normalize a remote response body into a uniform option list
///
/// Strategies, in order: the body is a bare array; an array under `data`;
/// an array under `result`; an array under `data.records`. Anything else
/// degrades to an empty list with a warning - a shape mismatch is an
/// observability event, not a caller-visible error.
#[must_use]
pub fn normalize_envelope(step: &str, body: &Value, shape: &RecordShape) -> Vec<OptionRecord> {
    let Some(records) = envelope_records(body) else {
        warn!(step, "unrecognized response envelope, resolving to empty");
        return vec![];
    };

    let mut options = Vec::with_capacity(records.len());
    for record in records {
        match shape_record(record, shape) {
            Some(option) => options.push(option),
            None => warn!(step, "skipping record without '{}'", shape.value_field),
        }
    }
    options
}

/// Locate the record array inside a response body
pub(crate) fn envelope_records(body: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(records) = body {
        return Some(records);
    }
    if let Some(Value::Array(records)) = body.get("data") {
        return Some(records);
    }
    if let Some(Value::Array(records)) = body.get("result") {
        return Some(records);
    }
    if let Some(Value::Array(records)) = body.get("data").and_then(|d| d.get("records")) {
        return Some(records);
    }
    None
}

/// Shape one raw record into an option
fn shape_record(record: &Value, shape: &RecordShape) -> Option<OptionRecord> {
    // Bare scalars are already the value.
    if !record.is_object() {
        let value = json_scalar(record)?;
        let label = value.to_string();
        return Some(OptionRecord {
            value,
            label,
            extras: BTreeMap::new(),
        });
    }

    let value = json_scalar(record.get(&shape.value_field)?)?;
    let label = shape
        .label_field
        .as_deref()
        .and_then(|f| record.get(f))
        .and_then(Value::as_str)
        .map_or_else(|| value.to_string(), ToString::to_string);

    let mut extras = BTreeMap::new();
    for (source_key, target_field) in &shape.extra_fields {
        if let Some(extra) = record.get(source_key).and_then(json_scalar) {
            extras.insert(target_field.clone(), extra);
        }
    }

    Some(OptionRecord { value, label, extras })
}

fn json_scalar(value: &Value) -> Option<FieldValue> {
    match value {
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::Bool(b) => Some(FieldValue::Flag(*b)),
        _ => None,
    }
}
