// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! HTTP-backed option and fill sources

use crate::source::{normalize_envelope, FillSource, OptionSource, RecordShape};
use crate::types::{Candidate, ChainContext, FieldValue};
use crate::SourceError;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Remote endpoint configuration for one chain step
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StepEndpoint {
    /// Endpoint URL the step's lookups are posted to
    pub url: String,
    /// How response records map onto option values and sibling fields
    pub shape: RecordShape,
}

/// [`OptionSource`] that resolves chain steps against REST endpoints
///
/// Each request posts the upstream tuple plus the session context
/// identifiers as one JSON object; responses are normalized through the
/// fixed envelope strategies.
pub struct HttpOptionSource {
    client: reqwest::Client,
    endpoints: HashMap<String, StepEndpoint>,
}

impl HttpOptionSource {
    /// Build a source over a per-step endpoint map
    #[must_use]
    pub fn new(endpoints: HashMap<String, StepEndpoint>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    /// Build a source with a preconfigured client (proxies, headers)
    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoints: HashMap<String, StepEndpoint>) -> Self {
        Self { client, endpoints }
    }
}

/// Assemble the lookup payload: upstream values plus context identifiers
fn lookup_payload(upstream: &[(String, FieldValue)], ctx: &ChainContext) -> Value {
    let mut payload = Map::new();
    for (field, value) in upstream {
        payload.insert(
            field.clone(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
    }
    payload.insert("branchId".into(), Value::String(ctx.branch.clone()));
    payload.insert("clientId".into(), Value::String(ctx.client.clone()));
    payload.insert("orgId".into(), Value::String(ctx.org.clone()));
    Value::Object(payload)
}

impl OptionSource for HttpOptionSource {
    async fn fetch_options(
        &self,
        step: &str,
        upstream: &[(String, FieldValue)],
        ctx: &ChainContext,
    ) -> Result<Vec<crate::types::OptionRecord>, SourceError> {
        let endpoint = self
            .endpoints
            .get(step)
            .ok_or_else(|| SourceError::UnknownStep(step.to_string()))?;

        debug!(step, url = %endpoint.url, "resolving step options");
        let response = self
            .client
            .post(&endpoint.url)
            .json(&lookup_payload(upstream, ctx))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SourceError::Fetch {
                step: step.to_string(),
                message: e.to_string(),
            })?;

        let body: Value = response.json().await.map_err(|e| SourceError::Decode {
            step: step.to_string(),
            message: e.to_string(),
        })?;

        Ok(normalize_envelope(step, &body, &endpoint.shape))
    }
}

/// [`FillSource`] that fetches the flattened candidate grid over HTTP
pub struct HttpFillSource {
    client: reqwest::Client,
    url: String,
    /// Record field carrying a stable candidate id; falls back to the
    /// record's position in the response
    id_field: Option<String>,
}

impl HttpFillSource {
    /// Build a fill source for one grid endpoint
    #[must_use]
    pub fn new(url: impl Into<String>, id_field: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            id_field,
        }
    }
}

/// Flatten one raw grid record into a candidate
///
/// Every scalar entry becomes a field; nested structures are skipped. The
/// engine copies only declared chain fields out of the candidate, so extra
/// entries are harmless.
pub(crate) fn candidate_from_record(
    record: &Value,
    index: usize,
    id_field: Option<&str>,
) -> Option<Candidate> {
    let object = record.as_object()?;
    let mut fields = BTreeMap::new();
    for (key, value) in object {
        let scalar = match value {
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) => FieldValue::Number(f),
                None => continue,
            },
            Value::Bool(b) => FieldValue::Flag(*b),
            _ => continue,
        };
        fields.insert(key.clone(), scalar);
    }
    let id = id_field
        .and_then(|f| object.get(f))
        .and_then(Value::as_str)
        .map_or_else(|| format!("cand:{index}"), ToString::to_string);
    Some(Candidate { id, fields })
}

impl FillSource for HttpFillSource {
    async fn fetch_candidates(
        &self,
        document: &str,
        ctx: &ChainContext,
    ) -> Result<Vec<Candidate>, SourceError> {
        let mut payload = Map::new();
        payload.insert("document".into(), Value::String(document.to_string()));
        payload.insert("branchId".into(), Value::String(ctx.branch.clone()));
        payload.insert("clientId".into(), Value::String(ctx.client.clone()));
        payload.insert("orgId".into(), Value::String(ctx.org.clone()));

        let response = self
            .client
            .post(&self.url)
            .json(&Value::Object(payload))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SourceError::Fetch {
                step: "fill_grid".to_string(),
                message: e.to_string(),
            })?;

        let body: Value = response.json().await.map_err(|e| SourceError::Decode {
            step: "fill_grid".to_string(),
            message: e.to_string(),
        })?;

        let records = crate::source::envelope_records(&body)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| candidate_from_record(r, i, self.id_field.as_deref()))
            .collect())
    }
}
