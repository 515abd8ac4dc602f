//! In-memory object store
//!
//! Values are versioned by write epoch: a read at context `r` observes the
//! newest version written at an epoch `<= r`, and an unlink records a
//! tombstone rather than dropping history. Objects and scratch pads are not
//! versioned; they become visible as soon as they are written.
//!
//! The store also tracks every open handle, so tests can assert that the
//! handle count returns to its baseline, and supports injected failures.

use crate::traits::ObjectStore;
use crate::types::{KvEntry, ScratchPad};
use iodmap_common::{
    ContainerHandle, CreateHints, Error, KvChecksum, ObjectHandle, ObjectId, ObjectKind, Result,
    StoreOp, TransactionId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Id of the root group in every container
pub const ROOT_ID: ObjectId = ObjectId::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

#[derive(Debug)]
struct OpenHandle {
    coh: ContainerHandle,
    id: ObjectId,
    access: Access,
}

#[derive(Clone, Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    checksum: Option<KvChecksum>,
}

/// Version history of one key, ordered by epoch; `None` is an unlink
#[derive(Debug, Default)]
struct History(Vec<(TransactionId, Option<StoredValue>)>);

impl History {
    fn visible(&self, rtid: TransactionId) -> Option<&StoredValue> {
        self.0
            .iter()
            .rev()
            .find(|(tid, _)| *tid <= rtid)
            .and_then(|(_, value)| value.as_ref())
    }

    fn write(&mut self, wtid: TransactionId, value: Option<StoredValue>) {
        match self.0.binary_search_by_key(&wtid, |(tid, _)| *tid) {
            Ok(idx) => self.0[idx].1 = value,
            Err(idx) => self.0.insert(idx, (wtid, value)),
        }
    }

    fn newest_mut(&mut self) -> Option<&mut StoredValue> {
        self.0.iter_mut().rev().find_map(|(_, value)| value.as_mut())
    }
}

#[derive(Debug)]
struct Object {
    kind: ObjectKind,
    /// Created with checksum hints: supplied checksums are verified on ingest
    checksummed: bool,
    scratch: Option<(ScratchPad, Option<u64>)>,
    entries: BTreeMap<Vec<u8>, History>,
}

impl Object {
    fn new(kind: ObjectKind, hints: Option<&CreateHints>) -> Self {
        Self {
            kind,
            checksummed: hints.is_some_and(|h| h.enable_checksum),
            scratch: None,
            entries: BTreeMap::new(),
        }
    }

    fn require_kv(&self, op: StoreOp) -> Result<()> {
        if self.kind == ObjectKind::Kv {
            Ok(())
        } else {
            Err(Error::store(op, format!("{:?} object has no key-value store", self.kind)))
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    containers: HashMap<ContainerHandle, HashMap<ObjectId, Object>>,
    handles: HashMap<ObjectHandle, OpenHandle>,
}

/// Object store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: RwLock<Inner>,
    next_handle: AtomicU64,
    next_container: AtomicU64,
    /// Injected failures: the op fails once after this many more calls
    injected: Mutex<Vec<(StoreOp, usize)>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty container holding only the root group
    pub fn create_container(&self) -> ContainerHandle {
        let coh = ContainerHandle::new(self.next_container.fetch_add(1, Ordering::Relaxed));
        let mut objects = HashMap::new();
        objects.insert(ROOT_ID, Object::new(ObjectKind::Kv, None));
        self.inner.write().containers.insert(coh, objects);
        debug!("Created container {}", coh);
        coh
    }

    /// Number of handles currently open across all containers
    pub fn open_handle_count(&self) -> usize {
        self.inner.read().handles.len()
    }

    /// Check whether an object exists
    pub fn contains_object(&self, coh: ContainerHandle, id: ObjectId) -> bool {
        self.inner
            .read()
            .containers
            .get(&coh)
            .is_some_and(|objects| objects.contains_key(&id))
    }

    /// Make the next call of `op` fail
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_after(op, 0);
    }

    /// Let `skip` calls of `op` through, then fail the one after
    pub fn fail_after(&self, op: StoreOp, skip: usize) {
        self.injected.lock().push((op, skip));
    }

    /// Flip one byte of the newest stored value of `key`, leaving its
    /// checksum alone
    pub fn corrupt_value(
        &self,
        coh: ContainerHandle,
        id: ObjectId,
        key: &[u8],
        offset: usize,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let value = inner
            .containers
            .get_mut(&coh)
            .and_then(|objects| objects.get_mut(&id))
            .and_then(|object| object.entries.get_mut(key))
            .and_then(History::newest_mut)
            .ok_or_else(|| Error::not_found(StoreOp::KvGet, format!("key {}", hex::encode(key))))?;
        let byte = value
            .bytes
            .get_mut(offset)
            .ok_or_else(|| Error::store(StoreOp::KvGet, format!("offset {offset} out of range")))?;
        *byte ^= 0xff;
        warn!("Corrupted value of key {} in object {}", hex::encode(key), id);
        Ok(())
    }

    fn check_injected(&self, op: StoreOp) -> Result<()> {
        let mut injected = self.injected.lock();
        let Some(pos) = injected.iter().position(|(o, _)| *o == op) else {
            return Ok(());
        };
        if injected[pos].1 > 0 {
            injected[pos].1 -= 1;
            return Ok(());
        }
        injected.remove(pos);
        Err(Error::store(op, "injected failure"))
    }

    fn open(
        &self,
        coh: ContainerHandle,
        id: ObjectId,
        access: Access,
    ) -> Result<ObjectHandle> {
        self.check_injected(StoreOp::Open)?;
        let mut inner = self.inner.write();
        let objects = inner
            .containers
            .get(&coh)
            .ok_or_else(|| Error::store(StoreOp::Open, format!("unknown container {coh}")))?;
        if !objects.contains_key(&id) {
            return Err(Error::not_found(StoreOp::Open, format!("object {id}")));
        }
        let oh = ObjectHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        inner.handles.insert(oh, OpenHandle { coh, id, access });
        Ok(oh)
    }

    /// Run `f` on the object behind `oh`, which must allow `access`
    fn with_object<R>(
        &self,
        oh: ObjectHandle,
        access: Access,
        op: StoreOp,
        f: impl FnOnce(&mut Object) -> Result<R>,
    ) -> Result<R> {
        self.check_injected(op)?;
        let mut guard = self.inner.write();
        let Inner {
            containers,
            handles,
        } = &mut *guard;
        let handle = handles
            .get(&oh)
            .ok_or_else(|| Error::store(op, format!("handle {oh} is not open")))?;
        if access == Access::Write && handle.access != Access::Write {
            return Err(Error::store(op, format!("handle {oh} is not open for write")));
        }
        let object = containers
            .get_mut(&handle.coh)
            .and_then(|objects| objects.get_mut(&handle.id))
            .ok_or_else(|| Error::not_found(op, format!("object {}", handle.id)))?;
        f(object)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn create_object(
        &self,
        coh: ContainerHandle,
        _wtid: TransactionId,
        kind: ObjectKind,
        id: ObjectId,
        hints: Option<&CreateHints>,
    ) -> Result<()> {
        self.check_injected(StoreOp::Create)?;
        if !id.is_valid() {
            return Err(Error::store(StoreOp::Create, "invalid object id"));
        }
        let mut inner = self.inner.write();
        let objects = inner
            .containers
            .get_mut(&coh)
            .ok_or_else(|| Error::store(StoreOp::Create, format!("unknown container {coh}")))?;
        if objects.contains_key(&id) {
            return Err(Error::store(
                StoreOp::Create,
                format!("object {id} already exists"),
            ));
        }
        objects.insert(id, Object::new(kind, hints));
        debug!("Created {:?} object {} in container {}", kind, id, coh);
        Ok(())
    }

    fn open_read(
        &self,
        coh: ContainerHandle,
        id: ObjectId,
        _rtid: TransactionId,
    ) -> Result<ObjectHandle> {
        self.open(coh, id, Access::Read)
    }

    fn open_write(
        &self,
        coh: ContainerHandle,
        id: ObjectId,
        _wtid: TransactionId,
    ) -> Result<ObjectHandle> {
        self.open(coh, id, Access::Write)
    }

    fn close(&self, oh: ObjectHandle) -> Result<()> {
        self.check_injected(StoreOp::Close)?;
        self.inner
            .write()
            .handles
            .remove(&oh)
            .map(|_| ())
            .ok_or_else(|| Error::store(StoreOp::Close, format!("handle {oh} is not open")))
    }

    fn set_scratch(
        &self,
        oh: ObjectHandle,
        _wtid: TransactionId,
        pad: &ScratchPad,
        checksum: Option<u64>,
    ) -> Result<()> {
        self.with_object(oh, Access::Write, StoreOp::SetScratch, |object| {
            if object.checksummed
                && let Some(expected) = checksum
            {
                let actual = pad.checksum();
                if actual != expected {
                    return Err(Error::corruption("scratch pad on ingest", expected, actual));
                }
            }
            object.scratch = Some((*pad, checksum));
            Ok(())
        })
    }

    fn get_scratch(
        &self,
        oh: ObjectHandle,
        _rtid: TransactionId,
    ) -> Result<(ScratchPad, Option<u64>)> {
        self.with_object(oh, Access::Read, StoreOp::GetScratch, |object| {
            object
                .scratch
                .ok_or_else(|| Error::not_found(StoreOp::GetScratch, "scratch pad"))
        })
    }

    fn kv_set(
        &self,
        oh: ObjectHandle,
        wtid: TransactionId,
        entry: &KvEntry,
        checksum: Option<KvChecksum>,
    ) -> Result<()> {
        self.with_object(oh, Access::Write, StoreOp::KvSet, |object| {
            object.require_kv(StoreOp::KvSet)?;
            let checksum = if object.checksummed {
                let actual = KvChecksum::compute(&entry.key, &entry.value);
                if let Some(expected) = checksum
                    && expected.mismatches(&actual)
                {
                    return Err(Error::corruption(
                        "kv entry on ingest",
                        expected.value,
                        actual.value,
                    ));
                }
                Some(actual)
            } else {
                checksum
            };
            object.entries.entry(entry.key.clone()).or_default().write(
                wtid,
                Some(StoredValue {
                    bytes: entry.value.clone(),
                    checksum,
                }),
            );
            Ok(())
        })
    }

    fn kv_get_size(&self, oh: ObjectHandle, rtid: TransactionId, key: &[u8]) -> Result<u64> {
        self.with_object(oh, Access::Read, StoreOp::KvGet, |object| {
            object
                .entries
                .get(key)
                .and_then(|history| history.visible(rtid))
                .map(|value| value.bytes.len() as u64)
                .ok_or_else(|| Error::not_found(StoreOp::KvGet, format!("key {}", hex::encode(key))))
        })
    }

    fn kv_get_value(
        &self,
        oh: ObjectHandle,
        rtid: TransactionId,
        key: &[u8],
    ) -> Result<(Vec<u8>, Option<KvChecksum>)> {
        self.with_object(oh, Access::Read, StoreOp::KvGet, |object| {
            object
                .entries
                .get(key)
                .and_then(|history| history.visible(rtid))
                .map(|value| (value.bytes.clone(), value.checksum))
                .ok_or_else(|| Error::not_found(StoreOp::KvGet, format!("key {}", hex::encode(key))))
        })
    }

    fn kv_get_num(&self, oh: ObjectHandle, rtid: TransactionId) -> Result<u64> {
        self.with_object(oh, Access::Read, StoreOp::KvCount, |object| {
            object.require_kv(StoreOp::KvCount)?;
            Ok(object
                .entries
                .values()
                .filter(|history| history.visible(rtid).is_some())
                .count() as u64)
        })
    }

    fn kv_unlink(&self, oh: ObjectHandle, wtid: TransactionId, key: &[u8]) -> Result<()> {
        self.with_object(oh, Access::Write, StoreOp::KvUnlink, |object| {
            let history = object
                .entries
                .get_mut(key)
                .filter(|history| history.visible(wtid).is_some())
                .ok_or_else(|| {
                    Error::not_found(StoreOp::KvUnlink, format!("key {}", hex::encode(key)))
                })?;
            history.write(wtid, None);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: TransactionId = TransactionId::new(1);
    const T2: TransactionId = TransactionId::new(2);
    const T3: TransactionId = TransactionId::new(3);

    fn store_with_map() -> (MemoryObjectStore, ContainerHandle, ObjectId) {
        let store = MemoryObjectStore::new();
        let coh = store.create_container();
        let id = ObjectId::new(100);
        store
            .create_object(coh, T1, ObjectKind::Kv, id, None)
            .unwrap();
        (store, coh, id)
    }

    #[test]
    fn test_open_close_tracks_handles() {
        let (store, coh, id) = store_with_map();
        let rd = store.open_read(coh, id, T1).unwrap();
        let wr = store.open_write(coh, id, T1).unwrap();
        assert_ne!(rd, wr);
        assert_eq!(store.open_handle_count(), 2);

        store.close(rd).unwrap();
        store.close(wr).unwrap();
        assert_eq!(store.open_handle_count(), 0);

        // double close is rejected
        assert!(store.close(rd).unwrap_err().is_store_failure());
    }

    #[test]
    fn test_open_missing_object() {
        let store = MemoryObjectStore::new();
        let coh = store.create_container();
        let err = store.open_read(coh, ObjectId::new(5), T1).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.open_handle_count(), 0);
    }

    #[test]
    fn test_create_duplicate_id_fails() {
        let (store, coh, id) = store_with_map();
        let err = store
            .create_object(coh, T1, ObjectKind::Kv, id, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StoreOpFailed {
                op: StoreOp::Create,
                ..
            }
        ));
    }

    #[test]
    fn test_write_requires_write_handle() {
        let (store, coh, id) = store_with_map();
        let rd = store.open_read(coh, id, T1).unwrap();
        let err = store
            .kv_set(rd, T1, &KvEntry::new(b"k".to_vec(), b"v".to_vec()), None)
            .unwrap_err();
        assert!(err.is_store_failure());
        store.close(rd).unwrap();
    }

    #[test]
    fn test_kv_set_get_count_unlink() {
        let (store, coh, id) = store_with_map();
        let wr = store.open_write(coh, id, T1).unwrap();
        let rd = store.open_read(coh, id, T1).unwrap();

        assert_eq!(store.kv_get_num(rd, T1).unwrap(), 0);
        store
            .kv_set(wr, T1, &KvEntry::new(b"alpha".to_vec(), b"one".to_vec()), None)
            .unwrap();
        store
            .kv_set(wr, T1, &KvEntry::new(b"beta".to_vec(), b"two!".to_vec()), None)
            .unwrap();

        assert_eq!(store.kv_get_num(rd, T1).unwrap(), 2);
        assert_eq!(store.kv_get_size(rd, T1, b"beta").unwrap(), 4);
        let (value, cs) = store.kv_get_value(rd, T1, b"alpha").unwrap();
        assert_eq!(value, b"one");
        assert!(cs.is_none());

        store.kv_unlink(wr, T1, b"alpha").unwrap();
        assert!(store.kv_get_size(rd, T1, b"alpha").unwrap_err().is_not_found());
        assert!(store.kv_unlink(wr, T1, b"alpha").unwrap_err().is_not_found());
        assert_eq!(store.kv_get_num(rd, T1).unwrap(), 1);
    }

    #[test]
    fn test_versioned_reads() {
        let (store, coh, id) = store_with_map();
        let wr = store.open_write(coh, id, T1).unwrap();
        let rd = store.open_read(coh, id, T1).unwrap();

        store
            .kv_set(wr, T1, &KvEntry::new(b"k".to_vec(), b"first".to_vec()), None)
            .unwrap();
        store
            .kv_set(wr, T2, &KvEntry::new(b"k".to_vec(), b"second".to_vec()), None)
            .unwrap();
        store.kv_unlink(wr, T3, b"k").unwrap();

        assert!(store.kv_get_size(rd, TransactionId::new(0), b"k").is_err());
        assert_eq!(store.kv_get_value(rd, T1, b"k").unwrap().0, b"first");
        assert_eq!(store.kv_get_value(rd, T2, b"k").unwrap().0, b"second");
        assert!(store.kv_get_value(rd, T3, b"k").unwrap_err().is_not_found());
        assert_eq!(store.kv_get_num(rd, T2).unwrap(), 1);
        assert_eq!(store.kv_get_num(rd, T3).unwrap(), 0);
    }

    #[test]
    fn test_checksummed_object_verifies_on_ingest() {
        let store = MemoryObjectStore::new();
        let coh = store.create_container();
        let id = ObjectId::new(7);
        let hints = CreateHints {
            enable_checksum: true,
        };
        store
            .create_object(coh, T1, ObjectKind::Kv, id, Some(&hints))
            .unwrap();
        let wr = store.open_write(coh, id, T1).unwrap();

        let entry = KvEntry::new(b"k".to_vec(), b"value".to_vec());
        let mut bad = KvChecksum::compute(&entry.key, &entry.value);
        bad.value ^= 1;
        assert!(store.kv_set(wr, T1, &entry, Some(bad)).unwrap_err().is_corruption());

        // without a supplied pair the store keeps its own
        store.kv_set(wr, T1, &entry, None).unwrap();
        let rd = store.open_read(coh, id, T1).unwrap();
        let (_, cs) = store.kv_get_value(rd, T1, b"k").unwrap();
        assert_eq!(cs, Some(KvChecksum::compute(b"k", b"value")));

        let pad = ScratchPad::for_map(ObjectId::new(8), ObjectId::new(9));
        assert!(
            store
                .set_scratch(wr, T1, &pad, Some(pad.checksum() ^ 1))
                .unwrap_err()
                .is_corruption()
        );
    }

    #[test]
    fn test_scratch_pad_round_trip() {
        let (store, coh, id) = store_with_map();
        let wr = store.open_write(coh, id, T1).unwrap();
        let rd = store.open_read(coh, id, T1).unwrap();
        assert!(store.get_scratch(rd, T1).unwrap_err().is_not_found());

        let pad = ScratchPad::for_map(ObjectId::new(1), ObjectId::new(2));
        store.set_scratch(wr, T1, &pad, Some(pad.checksum())).unwrap();
        assert_eq!(
            store.get_scratch(rd, T1).unwrap(),
            (pad, Some(pad.checksum()))
        );
    }

    #[test]
    fn test_corrupt_value_keeps_checksum() {
        let (store, coh, id) = store_with_map();
        let wr = store.open_write(coh, id, T1).unwrap();
        let cs = KvChecksum::compute(b"k", b"abc");
        store
            .kv_set(wr, T1, &KvEntry::new(b"k".to_vec(), b"abc".to_vec()), Some(cs))
            .unwrap();
        store.corrupt_value(coh, id, b"k", 1).unwrap();

        let rd = store.open_read(coh, id, T1).unwrap();
        let (value, stored) = store.kv_get_value(rd, T1, b"k").unwrap();
        assert_ne!(value, b"abc");
        assert_eq!(stored, Some(cs));
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let (store, coh, id) = store_with_map();
        let rd = store.open_read(coh, id, T1).unwrap();
        store.fail_next(StoreOp::Close);
        assert!(store.close(rd).is_err());
        assert_eq!(store.open_handle_count(), 1);
        store.close(rd).unwrap();
        assert_eq!(store.open_handle_count(), 0);

        store.fail_after(StoreOp::KvCount, 1);
        let rd = store.open_read(coh, id, T1).unwrap();
        assert!(store.kv_get_num(rd, T1).is_ok());
        assert!(store.kv_get_num(rd, T1).is_err());
        assert!(store.kv_get_num(rd, T1).is_ok());
    }

    #[test]
    fn test_blob_has_no_kv() {
        let store = MemoryObjectStore::new();
        let coh = store.create_container();
        let id = ObjectId::new(3);
        store
            .create_object(coh, T1, ObjectKind::Blob, id, None)
            .unwrap();
        let rd = store.open_read(coh, id, T1).unwrap();
        assert!(store.kv_get_num(rd, T1).is_err());
    }
}
