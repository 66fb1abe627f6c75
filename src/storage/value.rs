//! Value types for the storage engine
//!
//! Defines the Redis-compatible data types a key can hold. All stored
//! payloads are UTF-8 strings; containers are never stored empty (an empty
//! container is an absent key).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::SystemTime;

use crate::storage::zset::ScoreSet;

/// All possible stored value types
#[derive(Debug, Clone)]
pub enum TypedValue {
    /// String value
    Str(String),

    /// List value (ordered collection)
    List(VecDeque<String>),

    /// Hash value (field-value pairs, ordered for deterministic iteration)
    Hash(BTreeMap<String, String>),

    /// Set value (unique members, ordered for deterministic iteration)
    Set(BTreeSet<String>),

    /// Sorted set value (score order with lexicographic tie-break)
    ZSet(ScoreSet),
}

/// Value type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    List,
    Hash,
    Set,
    ZSet,
}

impl TypedValue {
    /// Get the kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Str(_) => ValueKind::Str,
            TypedValue::List(_) => ValueKind::List,
            TypedValue::Hash(_) => ValueKind::Hash,
            TypedValue::Set(_) => ValueKind::Set,
            TypedValue::ZSet(_) => ValueKind::ZSet,
        }
    }

    /// True when this is a container with no elements left
    pub fn is_empty_container(&self) -> bool {
        match self {
            TypedValue::Str(_) => false,
            TypedValue::List(list) => list.is_empty(),
            TypedValue::Hash(hash) => hash.is_empty(),
            TypedValue::Set(set) => set.is_empty(),
            TypedValue::ZSet(zset) => zset.is_empty(),
        }
    }
}

impl ValueKind {
    /// Redis TYPE reply name
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::Str => "string",
            ValueKind::List => "list",
            ValueKind::Hash => "hash",
            ValueKind::Set => "set",
            ValueKind::ZSet => "zset",
        }
    }
}

/// A stored entry with its expiration metadata
#[derive(Debug, Clone)]
pub struct StoredValue {
    /// The actual value
    pub value: TypedValue,

    /// Absolute expiry timestamp, if any
    pub expires_at: Option<SystemTime>,
}

impl StoredValue {
    /// Create a new stored value without expiration
    pub fn new(value: TypedValue) -> Self {
        StoredValue {
            value,
            expires_at: None,
        }
    }

    /// Check if this stored value has expired
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kind_names() {
        assert_eq!(TypedValue::Str("x".into()).kind().type_name(), "string");
        assert_eq!(
            TypedValue::List(VecDeque::new()).kind().type_name(),
            "list"
        );
        assert_eq!(TypedValue::ZSet(ScoreSet::new()).kind().type_name(), "zset");
    }

    #[test]
    fn test_expiration() {
        let now = SystemTime::now();
        let mut stored = StoredValue::new(TypedValue::Str("test".into()));
        assert!(!stored.is_expired(now));

        stored.expires_at = Some(now + Duration::from_millis(5));
        assert!(!stored.is_expired(now));
        assert!(stored.is_expired(now + Duration::from_millis(5)));
    }

    #[test]
    fn test_empty_container() {
        assert!(TypedValue::List(VecDeque::new()).is_empty_container());
        assert!(!TypedValue::Str(String::new()).is_empty_container());

        let mut set = BTreeSet::new();
        set.insert("a".to_string());
        assert!(!TypedValue::Set(set).is_empty_container());
    }
}
