//! Bulk transfer boundary
//!
//! A peer exposes a memory region by registering it, which yields a
//! [`BulkDescriptor`] it can hand to another peer inside a request. The
//! receiver either accesses the region directly (same address space) or
//! registers a region of its own and pulls from / pushes to the remote one.

use async_trait::async_trait;
use iodmap_common::{PeerAddr, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reference to a registered region, valid on the wire
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BulkDescriptor {
    /// Peer that registered the region
    pub owner: PeerAddr,
    pub id: u64,
    /// Region length in bytes
    pub len: u64,
}

/// Shared memory region exposed for bulk transfer
#[derive(Clone, Debug, Default)]
pub struct BulkRegion(Arc<RwLock<Vec<u8>>>);

impl BulkRegion {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(RwLock::new(bytes)))
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.0.write()
    }

    /// Copy the contents out
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.read().clone()
    }

    /// Check whether two handles refer to the same memory
    #[must_use]
    pub fn same_region(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Transport moving region contents between peers
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Address of this peer
    fn local_addr(&self) -> &PeerAddr;

    /// Whether `addr` shares this peer's address space
    fn is_self(&self, addr: &PeerAddr) -> bool {
        addr == self.local_addr()
    }

    /// Zero-copy access to a region registered in this address space
    fn access(&self, desc: &BulkDescriptor) -> Result<BulkRegion>;

    /// Register a local region
    fn register(&self, region: BulkRegion) -> Result<BulkDescriptor>;

    /// Drop a registration made with [`BulkTransport::register`]
    fn release(&self, desc: &BulkDescriptor) -> Result<()>;

    /// Copy `local.len` bytes from the start of `remote` into `local`
    async fn pull(&self, remote: &BulkDescriptor, local: &BulkDescriptor) -> Result<()>;

    /// Copy all of `local` to the start of `remote`
    async fn push(&self, local: &BulkDescriptor, remote: &BulkDescriptor) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_sharing() {
        let region = BulkRegion::new(vec![1, 2, 3]);
        let alias = region.clone();
        alias.write()[0] = 9;
        assert_eq!(region.to_vec(), vec![9, 2, 3]);
        assert!(region.same_region(&alias));
        assert!(!region.same_region(&BulkRegion::new(vec![9, 2, 3])));
        assert_eq!(region.len(), 3);
    }
}
