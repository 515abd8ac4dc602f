//! Records exchanged with the object store

use iodmap_common::{ObjectId, compute_crc64};
use serde::{Deserialize, Serialize};

/// Fixed record of four object ids attached to an object at creation.
///
/// Maps use `[metadata-id, attribute-id, INVALID, INVALID]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchPad(pub [ObjectId; 4]);

impl ScratchPad {
    /// Size of the encoded pad
    pub const ENCODED_LEN: usize = 32;

    /// Scratch pad of a map object
    #[must_use]
    pub const fn for_map(metadata: ObjectId, attributes: ObjectId) -> Self {
        Self([metadata, attributes, ObjectId::INVALID, ObjectId::INVALID])
    }

    #[must_use]
    pub const fn metadata_id(&self) -> ObjectId {
        self.0[0]
    }

    #[must_use]
    pub const fn attribute_id(&self) -> ObjectId {
        self.0[1]
    }

    /// Little-endian encoding the checksum is computed over
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        for (slot, id) in out.chunks_exact_mut(8).zip(self.0) {
            slot.copy_from_slice(&id.raw().to_le_bytes());
        }
        out
    }

    #[must_use]
    pub fn checksum(&self) -> u64 {
        compute_crc64(&self.to_bytes())
    }
}

/// One binary key-value entry. Keys compare by raw bytes only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvEntry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
