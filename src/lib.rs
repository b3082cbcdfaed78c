// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Chainform library - dependent-field resolution for master-data grids
//!
//! This crate provides the engine behind forms where one column's valid
//! choices depend on values picked in other columns of the same row
//! (part number -> GRN -> bin type -> batch -> bin -> quantity), resolved
//! lazily against a remote source, cached by upstream value tuple, and
//! safe against stale async responses. A fill/merge reconciler turns a
//! bulk candidate grid into fully seeded rows.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod chain;
pub mod config;
pub mod engine;
pub mod fill;
pub mod fixture;
pub mod http;
pub mod source;

mod error;

pub use error::{ChainError, EngineError, SourceError};

/// Core data types shared across the engine
pub mod types {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::fmt;

    // =========================================================================
    // Field Values
    // =========================================================================

    /// A scalar value held by one field of a row
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum FieldValue {
        /// Free text or a selected code (part number, GRN number, ...)
        Text(String),
        /// Numeric value (quantities)
        Number(f64),
        /// Boolean flag
        Flag(bool),
    }

    impl FieldValue {
        /// An empty text value, the cleared state of a chain field
        #[must_use]
        pub fn empty() -> Self {
            Self::Text(String::new())
        }

        /// Whether this value counts as unset for chain gating purposes
        #[must_use]
        pub fn is_empty(&self) -> bool {
            match self {
                Self::Text(s) => s.is_empty(),
                Self::Number(_) | Self::Flag(_) => false,
            }
        }

        /// Borrow the textual content, if this is a text value
        #[must_use]
        pub fn as_text(&self) -> Option<&str> {
            match self {
                Self::Text(s) => Some(s),
                _ => None,
            }
        }

        /// Canonical string rendering, used for cache key tuples
        #[must_use]
        pub fn canonical(&self) -> String {
            match self {
                Self::Text(s) => s.clone(),
                Self::Number(n) => format!("{n}"),
                Self::Flag(b) => b.to_string(),
            }
        }
    }

    impl fmt::Display for FieldValue {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Text(s) => write!(f, "{s}"),
                Self::Number(n) => write!(f, "{n}"),
                Self::Flag(b) => write!(f, "{b}"),
            }
        }
    }

    impl From<&str> for FieldValue {
        fn from(s: &str) -> Self {
            Self::Text(s.to_string())
        }
    }

    impl From<String> for FieldValue {
        fn from(s: String) -> Self {
            Self::Text(s)
        }
    }

    impl From<f64> for FieldValue {
        fn from(n: f64) -> Self {
            Self::Number(n)
        }
    }

    impl From<bool> for FieldValue {
        fn from(b: bool) -> Self {
            Self::Flag(b)
        }
    }

    // =========================================================================
    // Resolved Options
    // =========================================================================

    /// One selectable candidate for a chain step
    ///
    /// Besides the value that lands in the step's own field, an option may
    /// carry denormalized sibling data (a GRN option carries its GRN date,
    /// a part option its description and SKU) that is copied into non-chain
    /// columns when the option is picked.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct OptionRecord {
        /// Value written into the step's field when selected
        pub value: FieldValue,
        /// Display label
        pub label: String,
        /// Denormalized sibling fields keyed by target field id
        #[serde(default)]
        pub extras: BTreeMap<String, FieldValue>,
    }

    impl OptionRecord {
        /// Build a plain option with no sibling data
        #[must_use]
        pub fn new(value: impl Into<FieldValue>, label: impl Into<String>) -> Self {
            Self {
                value: value.into(),
                label: label.into(),
                extras: BTreeMap::new(),
            }
        }
    }

    // =========================================================================
    // Fill/Merge Candidates
    // =========================================================================

    /// A fully denormalized record from the bulk fill grid
    ///
    /// Carries every chain field of one eligible combination so that a
    /// selected candidate can be merged into a new row without any further
    /// per-field resolution.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Candidate {
        /// Stable identifier within one fetched grid
        pub id: String,
        /// Field values keyed by field id
        pub fields: BTreeMap<String, FieldValue>,
    }

    impl Candidate {
        /// Value of one field, empty if absent
        #[must_use]
        pub fn field(&self, id: &str) -> FieldValue {
            self.fields
                .get(id)
                .cloned()
                .unwrap_or_else(FieldValue::empty)
        }
    }

    // =========================================================================
    // Context
    // =========================================================================

    /// Session identifiers that parameterize every remote lookup
    ///
    /// Passed explicitly into the engine at construction instead of living
    /// in process-wide storage; the engine only ever reads it.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChainContext {
        /// Branch identifier
        pub branch: String,
        /// Client identifier
        pub client: String,
        /// Organization identifier
        pub org: String,
    }

    // =========================================================================
    // Notices
    // =========================================================================

    /// A non-blocking notification for the host (toast analog)
    ///
    /// Emitted when an option fetch fails; the affected field resolves to an
    /// empty option list and the row stays editable.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Notice {
        /// Row the failed fetch belonged to
        pub row: String,
        /// Chain step that failed to resolve
        pub step: String,
        /// Human-readable description of the failure
        pub message: String,
        /// When the failure was observed
        pub at: DateTime<Utc>,
    }
}

/// Prelude for common imports
pub mod prelude {
    pub use crate::types::*;
    pub use anyhow::{Context, Result};
}
