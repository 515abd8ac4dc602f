//! Object store boundary
//!
//! Every call is a discrete, synchronous storage primitive addressed by an
//! open handle and a transaction id. Writes take the write epoch, reads the
//! read context. Nothing here spans more than one call; atomicity across
//! calls is the caller's business.

use crate::types::{KvEntry, ScratchPad};
use iodmap_common::{
    ContainerHandle, CreateHints, KvChecksum, ObjectHandle, ObjectId, ObjectKind, Result,
    TransactionId,
};

/// Transactional key-value object store with handle-based access
pub trait ObjectStore: Send + Sync {
    /// Create a new object with a caller-chosen id
    fn create_object(
        &self,
        coh: ContainerHandle,
        wtid: TransactionId,
        kind: ObjectKind,
        id: ObjectId,
        hints: Option<&CreateHints>,
    ) -> Result<()>;

    /// Open an object for reading at a read context
    fn open_read(&self, coh: ContainerHandle, id: ObjectId, rtid: TransactionId)
    -> Result<ObjectHandle>;

    /// Open an object for writing at a write epoch
    fn open_write(
        &self,
        coh: ContainerHandle,
        id: ObjectId,
        wtid: TransactionId,
    ) -> Result<ObjectHandle>;

    /// Close one handle. Closing an unknown handle is an error.
    fn close(&self, oh: ObjectHandle) -> Result<()>;

    fn set_scratch(
        &self,
        oh: ObjectHandle,
        wtid: TransactionId,
        pad: &ScratchPad,
        checksum: Option<u64>,
    ) -> Result<()>;

    /// Read the scratch pad and the checksum stored with it, if any
    fn get_scratch(&self, oh: ObjectHandle, rtid: TransactionId)
    -> Result<(ScratchPad, Option<u64>)>;

    /// Insert or replace one entry
    fn kv_set(
        &self,
        oh: ObjectHandle,
        wtid: TransactionId,
        entry: &KvEntry,
        checksum: Option<KvChecksum>,
    ) -> Result<()>;

    /// Size of the value stored under `key`
    fn kv_get_size(&self, oh: ObjectHandle, rtid: TransactionId, key: &[u8]) -> Result<u64>;

    /// Value stored under `key` with its checksum pair, if one was stored
    fn kv_get_value(
        &self,
        oh: ObjectHandle,
        rtid: TransactionId,
        key: &[u8],
    ) -> Result<(Vec<u8>, Option<KvChecksum>)>;

    /// Number of live entries
    fn kv_get_num(&self, oh: ObjectHandle, rtid: TransactionId) -> Result<u64>;

    /// Remove one entry. A missing key is `NotFound`.
    fn kv_unlink(&self, oh: ObjectHandle, wtid: TransactionId, key: &[u8]) -> Result<()>;
}
