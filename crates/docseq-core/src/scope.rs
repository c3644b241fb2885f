//! # Transaction Scoping
//!
//! Decides whether a transaction type numbers per source entity or shares
//! one counter across all of them.
//!
//! ## Scope Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Scope Resolution                                │
//! │                                                                         │
//! │  SourceScoped(kind)   request source REQUIRED, must be of `kind`       │
//! │                       ─► bucket per source entity                      │
//! │                                                                         │
//! │  SourceFree           request source IGNORED                           │
//! │                       ─► one bucket for everyone                       │
//! │                                                                         │
//! │  CallerBranchScoped   request branch, else caller's own branch         │
//! │                       ─► bucket per branch; neither → rejected         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, ValidationError};
use crate::types::{CallerContext, SourceKind, SourceRef};

// =============================================================================
// Scope
// =============================================================================

/// How a transaction type partitions its numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One counter per source entity of the given kind.
    SourceScoped(SourceKind),
    /// One shared counter.
    SourceFree,
    /// One counter per branch, defaulting to the caller's branch.
    CallerBranchScoped,
}

impl Scope {
    /// Picks the source that keys the bucket.
    ///
    /// ## Returns
    /// * `Ok(None)` - shared bucket
    /// * `Ok(Some(source))` - per-source bucket
    /// * `Err(_)` - a required source is missing or of the wrong kind
    pub fn resolve_source(
        &self,
        requested: Option<SourceRef>,
        caller: &CallerContext,
    ) -> Result<Option<SourceRef>, ValidationError> {
        match *self {
            Scope::SourceFree => Ok(None),

            Scope::SourceScoped(kind) => {
                let source = requested.ok_or_else(|| ValidationError::required("source"))?;
                if source.kind != kind {
                    return Err(ValidationError::NotAllowed {
                        field: "source.kind".to_string(),
                        allowed: vec![kind.to_string()],
                    });
                }
                Ok(Some(source))
            }

            Scope::CallerBranchScoped => match requested {
                Some(source) if source.kind == SourceKind::Branch => Ok(Some(source)),
                Some(_) => Err(ValidationError::NotAllowed {
                    field: "source.kind".to_string(),
                    allowed: vec![SourceKind::Branch.to_string()],
                }),
                None => caller
                    .branch_id
                    .map(|id| Some(SourceRef::branch(id)))
                    .ok_or_else(|| ValidationError::required("source")),
            },
        }
    }

    /// Configuration name of this scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::SourceScoped(SourceKind::Branch) => "branch",
            Scope::SourceScoped(SourceKind::Warehouse) => "warehouse",
            Scope::SourceFree => "source_free",
            Scope::CallerBranchScoped => "caller_branch",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "branch" => Ok(Scope::SourceScoped(SourceKind::Branch)),
            "warehouse" => Ok(Scope::SourceScoped(SourceKind::Warehouse)),
            "source_free" | "free" | "none" => Ok(Scope::SourceFree),
            "caller_branch" => Ok(Scope::CallerBranchScoped),
            other => Err(CoreError::UnknownScope(other.to_string())),
        }
    }
}

impl Serialize for Scope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Scope Table
// =============================================================================

/// Built-in classification of the transaction types shipped with the seed data.
pub const DEFAULT_SCOPES: &[(&str, Scope)] = &[
    ("Purchase Order", Scope::SourceFree),
    ("Purchase Return", Scope::SourceFree),
    ("Goods Receipt", Scope::SourceScoped(SourceKind::Warehouse)),
    ("Stock Transfer", Scope::SourceScoped(SourceKind::Warehouse)),
    ("Stock Audit", Scope::SourceScoped(SourceKind::Branch)),
    ("Stock Adjustment", Scope::SourceScoped(SourceKind::Branch)),
    ("Sales Order", Scope::CallerBranchScoped),
    ("Sales Invoice", Scope::CallerBranchScoped),
];

/// Explicit transaction-type → scope mapping.
///
/// Types missing from the table are source-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeTable {
    entries: HashMap<String, Scope>,
}

impl ScopeTable {
    /// An empty table: every type is source-free.
    pub fn empty() -> Self {
        ScopeTable {
            entries: HashMap::new(),
        }
    }

    /// Sets or replaces the scope of a transaction type.
    pub fn insert(&mut self, transaction_type: impl Into<String>, scope: Scope) {
        self.entries.insert(transaction_type.into(), scope);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, transaction_type: impl Into<String>, scope: Scope) -> Self {
        self.insert(transaction_type, scope);
        self
    }

    /// Applies overrides on top of this table.
    pub fn extend<I, K>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (K, Scope)>,
        K: Into<String>,
    {
        for (transaction_type, scope) in overrides {
            self.insert(transaction_type, scope);
        }
    }

    /// Scope of `transaction_type`.
    pub fn classify(&self, transaction_type: &str) -> Scope {
        self.entries
            .get(transaction_type)
            .copied()
            .unwrap_or(Scope::SourceFree)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ScopeTable {
    fn default() -> Self {
        let mut table = ScopeTable::empty();
        table.extend(DEFAULT_SCOPES.iter().map(|(name, scope)| (*name, *scope)));
        table
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = ScopeTable::default();
        assert_eq!(table.classify("Purchase Order"), Scope::SourceFree);
        assert_eq!(
            table.classify("Stock Audit"),
            Scope::SourceScoped(SourceKind::Branch)
        );
        assert_eq!(table.classify("Sales Invoice"), Scope::CallerBranchScoped);
        assert_eq!(table.classify("Something Else"), Scope::SourceFree);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let mut table = ScopeTable::default();
        table.extend([("Purchase Order", Scope::SourceScoped(SourceKind::Warehouse))]);
        assert_eq!(
            table.classify("Purchase Order"),
            Scope::SourceScoped(SourceKind::Warehouse)
        );
    }

    #[test]
    fn test_source_free_ignores_request() {
        let caller = CallerContext::new(1).with_branch(4);
        let source = Scope::SourceFree
            .resolve_source(Some(SourceRef::branch(9)), &caller)
            .unwrap();
        assert_eq!(source, None);
    }

    #[test]
    fn test_source_scoped_requires_matching_source() {
        let scope = Scope::SourceScoped(SourceKind::Branch);
        let caller = CallerContext::new(1).with_branch(4);

        assert!(matches!(
            scope.resolve_source(None, &caller),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            scope.resolve_source(Some(SourceRef::warehouse(2)), &caller),
            Err(ValidationError::NotAllowed { .. })
        ));
        assert_eq!(
            scope.resolve_source(Some(SourceRef::branch(3)), &caller).unwrap(),
            Some(SourceRef::branch(3))
        );
    }

    #[test]
    fn test_caller_branch_fallback() {
        let scope = Scope::CallerBranchScoped;

        let with_branch = CallerContext::new(1).with_branch(4);
        assert_eq!(
            scope.resolve_source(None, &with_branch).unwrap(),
            Some(SourceRef::branch(4))
        );
        assert_eq!(
            scope
                .resolve_source(Some(SourceRef::branch(8)), &with_branch)
                .unwrap(),
            Some(SourceRef::branch(8))
        );

        // Neither a requested source nor an affiliation
        let unaffiliated = CallerContext::new(1);
        assert!(matches!(
            scope.resolve_source(None, &unaffiliated),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("branch".parse::<Scope>().unwrap(), Scope::SourceScoped(SourceKind::Branch));
        assert_eq!("source_free".parse::<Scope>().unwrap(), Scope::SourceFree);
        assert_eq!("caller_branch".parse::<Scope>().unwrap(), Scope::CallerBranchScoped);
        assert!("region".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_deserializes_from_string() {
        let scope: Scope = serde_json::from_str("\"warehouse\"").unwrap();
        assert_eq!(scope, Scope::SourceScoped(SourceKind::Warehouse));
    }
}
