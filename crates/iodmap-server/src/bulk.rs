//! Value payload movement between client and server
//!
//! A client in this server's address space hands over its region directly.
//! Anyone else gets a server-side staging region that is registered with
//! the transport, filled or drained with one pull or push, and released
//! through the operation's tracker once the response is out.

use crate::tracker::ResourceTracker;
use iodmap_bulk::{BulkDescriptor, BulkRegion, BulkTransport};
use iodmap_common::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct BulkEngine {
    transport: Arc<dyn BulkTransport>,
    idle_timeout: Duration,
}

impl BulkEngine {
    pub fn new(transport: Arc<dyn BulkTransport>, idle_timeout: Duration) -> Self {
        Self {
            transport,
            idle_timeout,
        }
    }

    pub fn transport(&self) -> &Arc<dyn BulkTransport> {
        &self.transport
    }

    /// Obtain the client's value bytes
    pub async fn pull(
        &self,
        client: &BulkDescriptor,
        tracker: &mut ResourceTracker,
    ) -> Result<BulkRegion> {
        let len = region_len(client)?;
        if self.transport.is_self(&client.owner) {
            let region = self.transport.access(client)?;
            if region.len() != len {
                return Err(Error::transfer(format!(
                    "client region holds {} bytes, descriptor says {}",
                    region.len(),
                    len
                )));
            }
            debug!("Co-resident pull of {} bytes", len);
            return Ok(region);
        }

        let region = BulkRegion::new(allocate(len)?);
        let local = self.register(region.clone(), tracker)?;
        self.wait(self.transport.pull(client, &local)).await?;
        debug!("Pulled {} bytes from {}", len, client.owner);
        Ok(region)
    }

    /// Deliver `bytes` to the start of the client's region. A co-resident
    /// region must be exactly as long as the value.
    pub async fn push(
        &self,
        bytes: Vec<u8>,
        client: &BulkDescriptor,
        tracker: &mut ResourceTracker,
    ) -> Result<()> {
        let len = bytes.len();
        if self.transport.is_self(&client.owner) {
            let region = self.transport.access(client)?;
            let mut target = region.write();
            if target.len() != len {
                return Err(Error::transfer(format!(
                    "client region holds {} bytes, value has {}",
                    target.len(),
                    len
                )));
            }
            target.copy_from_slice(&bytes);
            debug!("Co-resident push of {} bytes", len);
            return Ok(());
        }

        let local = self.register(BulkRegion::new(bytes), tracker)?;
        self.wait(self.transport.push(&local, client)).await?;
        debug!("Pushed {} bytes to {}", len, client.owner);
        Ok(())
    }

    fn register(
        &self,
        region: BulkRegion,
        tracker: &mut ResourceTracker,
    ) -> Result<BulkDescriptor> {
        let local = self.transport.register(region)?;
        let transport = Arc::clone(&self.transport);
        let registered = local.clone();
        tracker.defer("staging region", move || transport.release(&registered));
        Ok(local)
    }

    async fn wait(&self, transfer: impl Future<Output = Result<()>>) -> Result<()> {
        tokio::time::timeout(self.idle_timeout, transfer)
            .await
            .map_err(|_| {
                Error::transfer(format!(
                    "transfer idle for longer than {:?}",
                    self.idle_timeout
                ))
            })?
    }
}

fn region_len(desc: &BulkDescriptor) -> Result<usize> {
    usize::try_from(desc.len).map_err(|_| Error::AllocationFailed {
        size: usize::MAX,
    })
}

fn allocate(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailed { size: len })?;
    buf.resize(len, 0);
    Ok(buf)
}
