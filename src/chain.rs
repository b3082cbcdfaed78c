// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Static dependency chain declarations and definition-time validation

use crate::ChainError;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One field in a dependent-selection sequence
///
/// Declared once per form at load time; immutable for the lifetime of the
/// form. `depends_on` gates when the step's options may be fetched,
/// `invalidates` names the downstream fields cleared when this step's value
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    /// Field id, unique across the whole chain set
    pub id: String,
    /// Display label for host UIs and diagnostics
    pub label: String,
    /// Upstream field ids, in dependency order
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Downstream field ids cleared when this step changes
    #[serde(default)]
    pub invalidates: Vec<String>,
    /// Whether the field must be non-empty at save time
    #[serde(default)]
    pub required: bool,
}

/// An ordered sequence of chain steps forming a simple path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    /// Chain name, used in diagnostics
    pub name: String,
    /// Steps in declaration order
    pub steps: Vec<ChainStep>,
}

impl Chain {
    /// Build a plain linear chain where each step depends on its
    /// predecessor and invalidates everything after it
    ///
    /// Covers the common country -> state -> city pattern without spelling
    /// out every dependency by hand.
    #[must_use]
    pub fn linear(name: &str, fields: &[(&str, &str)]) -> Self {
        let steps = fields
            .iter()
            .enumerate()
            .map(|(i, (id, label))| ChainStep {
                id: (*id).to_string(),
                label: (*label).to_string(),
                depends_on: if i == 0 {
                    vec![]
                } else {
                    vec![fields[i - 1].0.to_string()]
                },
                invalidates: fields[i + 1..].iter().map(|(f, _)| (*f).to_string()).collect(),
                required: true,
            })
            .collect();
        Self {
            name: name.to_string(),
            steps,
        }
    }

    /// Validate this chain in isolation
    fn validate(&self) -> Result<(), ChainError> {
        if self.steps.is_empty() {
            return Err(ChainError::EmptyChain(self.name.clone()));
        }

        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if positions.insert(step.id.as_str(), i).is_some() {
                return Err(ChainError::DuplicateStep(step.id.clone()));
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(ChainError::SelfDependency(step.id.clone()));
                }
                match positions.get(dep.as_str()) {
                    Some(&pos) if pos < i => {}
                    _ => {
                        return Err(ChainError::ForwardDependency {
                            step: step.id.clone(),
                            dependency: dep.clone(),
                            chain: self.name.clone(),
                        })
                    }
                }
            }
            for target in &step.invalidates {
                if !positions.contains_key(target.as_str()) {
                    return Err(ChainError::UnknownInvalidation {
                        step: step.id.clone(),
                        target: target.clone(),
                        chain: self.name.clone(),
                    });
                }
            }
        }

        // Structural guard: the dependency graph must topologically sort.
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for step in &self.steps {
            let idx = graph.add_node(step.id.as_str());
            nodes.insert(step.id.as_str(), idx);
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if let (Some(&from), Some(&to)) =
                    (nodes.get(dep.as_str()), nodes.get(step.id.as_str()))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }
        if toposort(&graph, None).is_err() {
            return Err(ChainError::DependencyCycle(self.name.clone()));
        }

        Ok(())
    }
}

/// A validated collection of independent chains declared by one form
///
/// Field ids are unique across the set, so any field resolves to at most
/// one step and one owning chain.
#[derive(Debug, Clone)]
pub struct ChainSet {
    chains: Vec<Chain>,
    // field id -> (chain index, step index)
    index: HashMap<String, (usize, usize)>,
}

impl ChainSet {
    /// Validate a set of chains and build the field index
    ///
    /// Fails fast with a [`ChainError`] on any declaration mistake; this is
    /// the developer-time contract of the form, never a user-facing error.
    pub fn new(chains: Vec<Chain>) -> Result<Self, ChainError> {
        let mut index = HashMap::new();
        for (ci, chain) in chains.iter().enumerate() {
            chain.validate()?;
            for (si, step) in chain.steps.iter().enumerate() {
                if index.insert(step.id.clone(), (ci, si)).is_some() {
                    return Err(ChainError::DuplicateStep(step.id.clone()));
                }
            }
        }
        Ok(Self { chains, index })
    }

    /// Parse and validate a chain set from its TOML declaration
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct ChainsFile {
            #[serde(rename = "chain")]
            chains: Vec<Chain>,
        }
        let file: ChainsFile = toml::from_str(raw)?;
        Ok(Self::new(file.chains)?)
    }

    /// All chains in the set
    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Look up the step declared for a field, if any
    #[must_use]
    pub fn step(&self, field: &str) -> Option<&ChainStep> {
        self.index
            .get(field)
            .map(|&(ci, si)| &self.chains[ci].steps[si])
    }

    /// Whether a field participates in any chain
    #[must_use]
    pub fn is_chain_field(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    /// Steps in the same chain that depend on the given field
    #[must_use]
    pub fn next_steps(&self, field: &str) -> Vec<&ChainStep> {
        let Some(&(ci, _)) = self.index.get(field) else {
            return vec![];
        };
        self.chains[ci]
            .steps
            .iter()
            .filter(|s| s.depends_on.iter().any(|d| d == field))
            .collect()
    }

    /// Transitive invalidation targets of a field, in chain order
    ///
    /// Clearing a field must clear every field reachable through
    /// `invalidates`, so the closure is what the cascade actually applies.
    #[must_use]
    pub fn invalidation_closure(&self, field: &str) -> Vec<String> {
        let Some(&(ci, _)) = self.index.get(field) else {
            return vec![];
        };
        let chain = &self.chains[ci];

        let mut seen: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = vec![field];
        while let Some(current) = frontier.pop() {
            if let Some(step) = self.step(current) {
                for target in &step.invalidates {
                    if seen.insert(target.as_str()) {
                        frontier.push(target.as_str());
                    }
                }
            }
        }

        chain
            .steps
            .iter()
            .filter(|s| seen.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Every field id declared across the set, in chain order
    #[must_use]
    pub fn chain_fields(&self) -> Vec<&str> {
        self.chains
            .iter()
            .flat_map(|c| c.steps.iter().map(|s| s.id.as_str()))
            .collect()
    }

    /// Fields that must be non-empty for a row to be saved
    #[must_use]
    pub fn required_fields(&self) -> Vec<&str> {
        self.chains
            .iter()
            .flat_map(|c| c.steps.iter().filter(|s| s.required).map(|s| s.id.as_str()))
            .collect()
    }
}
