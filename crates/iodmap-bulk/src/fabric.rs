//! In-process bulk fabric
//!
//! All endpoints of one [`MemoryFabric`] share a registry of regions keyed by
//! owner and id, so a "remote" transfer is a copy between two registered
//! regions. Endpoints created with the same address share an address space
//! and may access each other's regions directly.

use crate::transport::{BulkDescriptor, BulkRegion, BulkTransport};
use async_trait::async_trait;
use iodmap_common::{Error, PeerAddr, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct FabricFaults {
    delay: Option<Duration>,
    fail_next: bool,
    /// Offset of a byte to flip in the next transfer
    flip_next: Option<usize>,
}

/// Shared registry behind a set of endpoints
#[derive(Debug, Default)]
pub struct MemoryFabric {
    regions: RwLock<HashMap<(PeerAddr, u64), BulkRegion>>,
    next_id: AtomicU64,
    faults: Mutex<FabricFaults>,
}

impl MemoryFabric {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an endpoint for `addr` on this fabric
    pub fn endpoint(self: &Arc<Self>, addr: impl Into<String>) -> FabricEndpoint {
        FabricEndpoint {
            fabric: Arc::clone(self),
            addr: PeerAddr::new(addr),
        }
    }

    /// Number of regions currently registered by `owner`
    pub fn live_regions(&self, owner: &PeerAddr) -> usize {
        self.regions
            .read()
            .keys()
            .filter(|(addr, _)| addr == owner)
            .count()
    }

    /// Delay every transfer by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.lock().delay = delay;
    }

    /// Make the next transfer fail
    pub fn fail_next_transfer(&self) {
        self.faults.lock().fail_next = true;
    }

    /// Flip the byte at `offset` during the next transfer
    pub fn flip_next_transfer(&self, offset: usize) {
        self.faults.lock().flip_next = Some(offset);
    }

    fn insert(&self, owner: &PeerAddr, region: BulkRegion) -> BulkDescriptor {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let len = region.len() as u64;
        self.regions.write().insert((owner.clone(), id), region);
        BulkDescriptor {
            owner: owner.clone(),
            id,
            len,
        }
    }

    fn lookup(&self, desc: &BulkDescriptor) -> Result<BulkRegion> {
        self.regions
            .read()
            .get(&(desc.owner.clone(), desc.id))
            .cloned()
            .ok_or_else(|| {
                Error::transfer(format!("no region {} registered by {}", desc.id, desc.owner))
            })
    }

    async fn transfer(&self, from: &BulkDescriptor, to: &BulkDescriptor, len: usize) -> Result<()> {
        let (delay, fail, flip) = {
            let mut faults = self.faults.lock();
            (
                faults.delay,
                std::mem::take(&mut faults.fail_next),
                faults.flip_next.take(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Error::transfer("injected transfer failure"));
        }

        let src = self.lookup(from)?;
        let dst = self.lookup(to)?;
        let mut bytes = {
            let src = src.read();
            src.get(..len)
                .ok_or_else(|| {
                    Error::transfer(format!("source holds {} bytes, need {len}", src.len()))
                })?
                .to_vec()
        };
        if let Some(offset) = flip
            && let Some(byte) = bytes.get_mut(offset)
        {
            warn!("Flipping byte {} of transfer {} -> {}", offset, from.id, to.id);
            *byte ^= 0xff;
        }

        let mut dst = dst.write();
        let dst_len = dst.len();
        dst.get_mut(..len)
            .ok_or_else(|| Error::transfer(format!("target holds {dst_len} bytes, need {len}")))?
            .copy_from_slice(&bytes);
        debug!("Transferred {} bytes {} -> {}", len, from.owner, to.owner);
        Ok(())
    }
}

/// One peer attached to a [`MemoryFabric`]
#[derive(Clone, Debug)]
pub struct FabricEndpoint {
    fabric: Arc<MemoryFabric>,
    addr: PeerAddr,
}

impl FabricEndpoint {
    pub fn fabric(&self) -> &Arc<MemoryFabric> {
        &self.fabric
    }

    /// Register `bytes` as a new region, as a client does before a request
    pub fn expose(&self, bytes: Vec<u8>) -> BulkDescriptor {
        self.fabric.insert(&self.addr, BulkRegion::new(bytes))
    }

    /// Current contents of a registered region
    pub fn read_back(&self, desc: &BulkDescriptor) -> Result<Vec<u8>> {
        Ok(self.fabric.lookup(desc)?.to_vec())
    }

    fn check_local(&self, desc: &BulkDescriptor) -> Result<()> {
        if desc.owner == self.addr {
            Ok(())
        } else {
            Err(Error::transfer(format!(
                "region {} belongs to {}, not {}",
                desc.id, desc.owner, self.addr
            )))
        }
    }
}

#[async_trait]
impl BulkTransport for FabricEndpoint {
    fn local_addr(&self) -> &PeerAddr {
        &self.addr
    }

    fn access(&self, desc: &BulkDescriptor) -> Result<BulkRegion> {
        self.check_local(desc)?;
        self.fabric.lookup(desc)
    }

    fn register(&self, region: BulkRegion) -> Result<BulkDescriptor> {
        Ok(self.fabric.insert(&self.addr, region))
    }

    fn release(&self, desc: &BulkDescriptor) -> Result<()> {
        self.check_local(desc)?;
        self.fabric
            .regions
            .write()
            .remove(&(desc.owner.clone(), desc.id))
            .map(|_| ())
            .ok_or_else(|| Error::transfer(format!("region {} is not registered", desc.id)))
    }

    async fn pull(&self, remote: &BulkDescriptor, local: &BulkDescriptor) -> Result<()> {
        self.check_local(local)?;
        let len = usize::try_from(local.len).map_err(|e| Error::transfer(e.to_string()))?;
        self.fabric.transfer(remote, local, len).await
    }

    async fn push(&self, local: &BulkDescriptor, remote: &BulkDescriptor) -> Result<()> {
        self.check_local(local)?;
        let len = usize::try_from(local.len).map_err(|e| Error::transfer(e.to_string()))?;
        self.fabric.transfer(local, remote, len).await
    }
}
