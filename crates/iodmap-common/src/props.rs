//! Property lists carried by map requests
//!
//! A request may omit a property list; handlers then fill in the defaults
//! before reading anything from it.

use crate::checksum::IntegrityScope;
use crate::types::TransactionId;
use serde::{Deserialize, Serialize};

/// Map creation properties, persisted in the map's metadata KV
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCreateProps {
    /// Ask the store to checksum the map object itself
    pub enable_checksum: bool,
}

impl MapCreateProps {
    /// Creation hints for the map object
    #[must_use]
    pub const fn object_hints(&self) -> Option<CreateHints> {
        if self.enable_checksum {
            Some(CreateHints {
                enable_checksum: true,
            })
        } else {
            None
        }
    }
}

/// Per-object hints passed to the store at creation time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHints {
    /// The store verifies every supplied checksum on ingest
    pub enable_checksum: bool,
}

impl CreateHints {
    /// Hints for metadata children, derived from the request's scope
    #[must_use]
    pub const fn for_metadata(cs_scope: IntegrityScope) -> Option<Self> {
        if cs_scope.contains(IntegrityScope::STORAGE) {
            Some(Self {
                enable_checksum: true,
            })
        } else {
            None
        }
    }
}

/// Raw-data transfer properties
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProps {
    /// Which integrity checks apply to the raw value bytes
    pub integrity_scope: IntegrityScope,
    /// Read from this replica tag instead of the request's read context
    pub replica: Option<TransactionId>,
}

impl TransferProps {
    #[must_use]
    pub const fn with_scope(integrity_scope: IntegrityScope) -> Self {
        Self {
            integrity_scope,
            replica: None,
        }
    }

    /// Read context for this operation after the replica override
    #[must_use]
    pub fn read_context(&self, requested: TransactionId) -> TransactionId {
        match self.replica {
            Some(tag) if tag.raw() != 0 => tag,
            _ => requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_props() {
        assert!(!MapCreateProps::default().enable_checksum);
        assert!(MapCreateProps::default().object_hints().is_none());
        assert!(TransferProps::default().integrity_scope.is_empty());
    }

    #[test]
    fn test_hints() {
        let props = MapCreateProps {
            enable_checksum: true,
        };
        assert_eq!(
            props.object_hints(),
            Some(CreateHints {
                enable_checksum: true
            })
        );
        assert!(CreateHints::for_metadata(IntegrityScope::TRANSFER).is_none());
        assert!(CreateHints::for_metadata(IntegrityScope::ALL).is_some());
    }

    #[test]
    fn test_replica_override() {
        let requested = TransactionId::new(4);
        let mut props = TransferProps::default();
        assert_eq!(props.read_context(requested), requested);

        props.replica = Some(TransactionId::new(0));
        assert_eq!(props.read_context(requested), requested);

        props.replica = Some(TransactionId::new(9));
        assert_eq!(props.read_context(requested), TransactionId::new(9));
    }
}
