// src/registry.rs
// Cross-file symbol registry. First write wins; later conflicting proposals
// are surfaced to the caller, never applied.

use std::collections::HashMap;

use crate::state::{MappingKind, SymbolMapping};

/// A later proposal that clashed with an already-registered mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingConflict {
    pub proposed: SymbolMapping,
    pub existing_target: String,
}

impl MappingConflict {
    /// Human-readable form attached to a record's warnings.
    pub fn describe(&self) -> String {
        format!(
            "symbol mapping conflict: {:?} '{}' already maps to '{}', proposal '{}' ignored",
            self.proposed.kind, self.proposed.source, self.existing_target, self.proposed.target
        )
    }
}

/// Registry of source → target mappings accumulated over a run. Insertion
/// order is preserved so snapshots render stably in prompts and checkpoints.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    by_key: HashMap<(String, MappingKind), String>,
    ordered: Vec<SymbolMapping>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted mappings, e.g. when resuming a run. Duplicate
    /// keys keep the earliest entry.
    pub fn from_mappings(mappings: &[SymbolMapping]) -> Self {
        let mut registry = Self::new();
        registry.merge(mappings.to_vec());
        registry
    }

    pub fn lookup(&self, source: &str, kind: MappingKind) -> Option<&str> {
        self.by_key
            .get(&(source.to_string(), kind))
            .map(String::as_str)
    }

    /// Merge new mappings; returns the proposals that lost to an existing
    /// entry. Re-asserting an identical mapping is not a conflict.
    pub fn merge(&mut self, new: Vec<SymbolMapping>) -> Vec<MappingConflict> {
        let mut conflicts = Vec::new();

        for mapping in new {
            let key = (mapping.source.clone(), mapping.kind);
            match self.by_key.get(&key) {
                Some(existing) if *existing == mapping.target => {}
                Some(existing) => conflicts.push(MappingConflict {
                    existing_target: existing.clone(),
                    proposed: mapping,
                }),
                None => {
                    self.by_key.insert(key, mapping.target.clone());
                    self.ordered.push(mapping);
                }
            }
        }

        conflicts
    }

    /// Owned copy handed to an in-flight conversion. Later merges never change
    /// a snapshot already handed out.
    pub fn snapshot(&self) -> Vec<SymbolMapping> {
        self.ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
