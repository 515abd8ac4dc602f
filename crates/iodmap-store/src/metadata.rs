//! Typed metadata records layered on the KV store
//!
//! Each object's metadata child holds a few well-known entries (creation
//! properties, link count, object type, datatypes) and each group holds one
//! link record per child name. Records are bincode-encoded; when the scope
//! includes storage checks every record is written with its checksum pair
//! and verified on read.

use crate::traits::ObjectStore;
use crate::types::KvEntry;
use iodmap_common::{
    Error, IntegrityScope, KvChecksum, ObjectHandle, ObjectId, Result, TransactionId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Well-known metadata entries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataKey {
    CreateProps,
    LinkCount,
    ObjectType,
    KeyType,
    ValueType,
}

impl MetadataKey {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProps => "create_props",
            Self::LinkCount => "link_count",
            Self::ObjectType => "object_type",
            Self::KeyType => "map_key_type",
            Self::ValueType => "map_value_type",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    Hard,
}

/// Link record stored in a group under the child's name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub kind: LinkKind,
    pub target: ObjectId,
}

impl LinkInfo {
    #[must_use]
    pub const fn hard(target: ObjectId) -> Self {
        Self {
            kind: LinkKind::Hard,
            target,
        }
    }
}

/// Insert one metadata entry
pub fn insert_metadata<T: Serialize>(
    store: &dyn ObjectStore,
    oh: ObjectHandle,
    wtid: TransactionId,
    key: MetadataKey,
    value: &T,
    cs_scope: IntegrityScope,
) -> Result<()> {
    insert_record(store, oh, wtid, key.as_str().as_bytes(), value, cs_scope)
}

/// Retrieve one metadata entry
pub fn get_metadata<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    oh: ObjectHandle,
    rtid: TransactionId,
    key: MetadataKey,
    cs_scope: IntegrityScope,
) -> Result<T> {
    get_record(store, oh, rtid, key.as_str().as_bytes(), cs_scope)
}

/// Add a link named `name` to the group behind `oh`
pub fn insert_link(
    store: &dyn ObjectStore,
    oh: ObjectHandle,
    wtid: TransactionId,
    name: &str,
    link: &LinkInfo,
    cs_scope: IntegrityScope,
) -> Result<()> {
    debug!("Linking {} -> {:?}", name, link.target);
    insert_record(store, oh, wtid, name.as_bytes(), link, cs_scope)
}

/// Look up the link named `name` in the group behind `oh`
pub fn get_link(
    store: &dyn ObjectStore,
    oh: ObjectHandle,
    rtid: TransactionId,
    name: &str,
    cs_scope: IntegrityScope,
) -> Result<LinkInfo> {
    get_record(store, oh, rtid, name.as_bytes(), cs_scope)
}

fn insert_record<T: Serialize + ?Sized>(
    store: &dyn ObjectStore,
    oh: ObjectHandle,
    wtid: TransactionId,
    key: &[u8],
    value: &T,
    cs_scope: IntegrityScope,
) -> Result<()> {
    let entry = KvEntry::new(key, bincode::serialize(value)?);
    let checksum = cs_scope
        .contains(IntegrityScope::STORAGE)
        .then(|| KvChecksum::compute(&entry.key, &entry.value));
    store.kv_set(oh, wtid, &entry, checksum)
}

fn get_record<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    oh: ObjectHandle,
    rtid: TransactionId,
    key: &[u8],
    cs_scope: IntegrityScope,
) -> Result<T> {
    let (bytes, stored) = store.kv_get_value(oh, rtid, key)?;
    if cs_scope.contains(IntegrityScope::STORAGE)
        && let Some(stored) = stored
    {
        let actual = KvChecksum::compute(key, &bytes);
        if stored.mismatches(&actual) {
            return Err(Error::corruption(
                format!("metadata {}", String::from_utf8_lossy(key)),
                stored.value,
                actual.value,
            ));
        }
    }
    Ok(bincode::deserialize(&bytes)?)
}
