// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Tuple-keyed memoization of resolved option lists

use crate::types::{FieldValue, OptionRecord};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Exact composite of a chain step and the upstream values that produced
/// an option list
///
/// Upstream values are canonicalized in dependency order, so two rows that
/// reach the same combination share one cache entry regardless of row
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    step: String,
    upstream: Vec<String>,
}

impl CacheKey {
    /// Build a key from a step id and its ordered upstream tuple
    #[must_use]
    pub fn new(step: &str, upstream: &[FieldValue]) -> Self {
        Self {
            step: step.to_string(),
            upstream: upstream.iter().map(FieldValue::canonical).collect(),
        }
    }

    /// Step this key belongs to
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Deterministic short id for logging: opt:<hash of (step, tuple)>
    #[must_use]
    pub fn display_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.step.as_bytes());
        for value in &self.upstream {
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
        }
        let hash = hex::encode(hasher.finalize());
        format!("opt:{}", &hash[..12])
    }
}

/// A memoized option list with its fetch timestamp
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Resolved options, shared so repeated reads stay referentially stable
    pub options: Arc<Vec<OptionRecord>>,
    /// When the underlying fetch completed
    pub fetched_at: DateTime<Utc>,
}

/// Session-scoped option cache
///
/// No TTL and no size bound: the reachable universe of upstream
/// combinations in one editing session is finite, and staleness within a
/// session is an accepted trade-off of the current design.
#[derive(Debug, Default)]
pub struct OptionCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl OptionCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the option list for a key
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<OptionRecord>>> {
        self.entries.get(key).map(|e| Arc::clone(&e.options))
    }

    /// Store a resolved option list under a key
    pub fn put(&mut self, key: CacheKey, options: Vec<OptionRecord>) -> Arc<Vec<OptionRecord>> {
        let shared = Arc::new(options);
        self.entries.insert(
            key,
            CacheEntry {
                options: Arc::clone(&shared),
                fetched_at: Utc::now(),
            },
        );
        shared
    }

    /// Number of memoized combinations
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(step: &str, tuple: &[&str]) -> CacheKey {
        let upstream: Vec<FieldValue> = tuple.iter().map(|v| FieldValue::from(*v)).collect();
        CacheKey::new(step, &upstream)
    }

    #[test]
    fn test_same_tuple_same_key() {
        assert_eq!(key("grn_no", &["PN-100"]), key("grn_no", &["PN-100"]));
        assert_eq!(
            key("grn_no", &["PN-100"]).display_id(),
            key("grn_no", &["PN-100"]).display_id()
        );
    }

    #[test]
    fn test_different_tuple_different_key() {
        assert_ne!(key("grn_no", &["PN-100"]), key("grn_no", &["PN-200"]));
        assert_ne!(key("grn_no", &["PN-100"]), key("bin_type", &["PN-100"]));
        // The separator keeps ["ab", "c"] distinct from ["a", "bc"].
        assert_ne!(
            key("grn_no", &["ab", "c"]).display_id(),
            key("grn_no", &["a", "bc"]).display_id()
        );
    }

    #[test]
    fn test_put_get_referential_stability() {
        let mut cache = OptionCache::new();
        let k = key("grn_no", &["PN-100"]);
        cache.put(k.clone(), vec![OptionRecord::new("G1", "G1")]);

        let first = cache.get(&k).unwrap();
        let second = cache.get(&k).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache = OptionCache::new();
        assert!(cache.get(&key("grn_no", &["PN-100"])).is_none());
        assert!(cache.is_empty());
    }
}
