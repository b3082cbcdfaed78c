// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Error taxonomy for chain definitions, remote sources, and the engine

use thiserror::Error;

/// Definition-time configuration errors for a chain set
///
/// These are developer contracts, not runtime user errors: a form with an
/// invalid chain declaration fails fast at load time.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A step id appears more than once across the chain set
    #[error("duplicate step id '{0}' in chain set")]
    DuplicateStep(String),

    /// A step depends on itself
    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    /// A step depends on a field that is not declared earlier in its chain
    #[error("step '{step}' depends on '{dependency}', which does not appear earlier in chain '{chain}'")]
    ForwardDependency {
        /// The offending step
        step: String,
        /// The dependency that is missing or declared later
        dependency: String,
        /// Chain the step belongs to
        chain: String,
    },

    /// A step invalidates a field that is not part of its own chain
    #[error("step '{step}' invalidates unknown field '{target}' in chain '{chain}'")]
    UnknownInvalidation {
        /// The offending step
        step: String,
        /// The invalidation target that does not exist
        target: String,
        /// Chain the step belongs to
        chain: String,
    },

    /// The dependency graph is not an acyclic forward path
    #[error("chain '{0}' has a dependency cycle")]
    DependencyCycle(String),

    /// A chain was declared with no steps
    #[error("chain '{0}' has no steps")]
    EmptyChain(String),
}

/// Errors from a remote option or fill source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (network, HTTP status)
    #[error("fetch failed for step '{step}': {message}")]
    Fetch {
        /// Step whose options were being resolved
        step: String,
        /// Underlying failure description
        message: String,
    },

    /// The response body was not valid JSON
    #[error("invalid response body for step '{step}': {message}")]
    Decode {
        /// Step whose options were being resolved
        step: String,
        /// Decoder failure description
        message: String,
    },

    /// No endpoint or fixture entry is configured for a step
    #[error("no source configured for step '{0}'")]
    UnknownStep(String),
}

/// Runtime errors surfaced by the form engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced row does not exist (deleted or never created)
    #[error("row '{0}' not found")]
    RowNotFound(String),

    /// Save blocked: a row is missing required chain fields
    ///
    /// The only hard-stop error class in the engine; everything else is
    /// recovered locally.
    #[error("row '{row}' is missing required fields: {}", missing.join(", "))]
    IncompleteRow {
        /// The offending row id
        row: String,
        /// Required chain fields that are empty
        missing: Vec<String>,
    },
}
