//! Map service state shared by all handlers

use crate::bulk::BulkEngine;
use crate::messages::MapTarget;
use crate::metrics::HandlerMetrics;
use crate::path::close_later;
use crate::tracker::ResourceTracker;
use iodmap_bulk::BulkTransport;
use iodmap_common::{ContainerHandle, ObjectHandle, Result, ServerConfig, TransactionId};
use iodmap_store::ObjectStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Handles map requests against one object store and bulk transport
pub struct MapService {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) bulk: BulkEngine,
    config: ServerConfig,
    pub(crate) metrics: Arc<HandlerMetrics>,
}

impl MapService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transport: Arc<dyn BulkTransport>,
        config: ServerConfig,
    ) -> Self {
        if transport.local_addr().as_str() != config.server.address {
            warn!(
                "Transport address {} differs from configured address {}",
                transport.local_addr(),
                config.server.address
            );
        }
        info!(
            "Map service on {} (bulk idle timeout {:?})",
            transport.local_addr(),
            config.bulk.idle_timeout()
        );
        Self {
            store,
            bulk: BulkEngine::new(transport, config.bulk.idle_timeout()),
            config,
            metrics: Arc::new(HandlerMetrics::default()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<HandlerMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub(crate) fn tracker(&self, op: &'static str) -> ResourceTracker {
        ResourceTracker::new(op).with_metrics(Arc::clone(&self.metrics))
    }

    pub(crate) fn close_later(
        &self,
        oh: ObjectHandle,
    ) -> impl FnOnce() -> Result<()> + Send + 'static {
        close_later(&self.store, oh)
    }

    /// The caller's read handle, or one opened here and closed when the
    /// operation ends
    pub(crate) fn read_handle(
        &self,
        coh: ContainerHandle,
        target: &MapTarget,
        rtid: TransactionId,
        tracker: &mut ResourceTracker,
    ) -> Result<ObjectHandle> {
        if !target.handles.rd.is_undefined() {
            return Ok(target.handles.rd);
        }
        let oh = self.store.open_read(coh, target.id, rtid)?;
        tracker.defer("local read handle", self.close_later(oh));
        Ok(oh)
    }

    /// The caller's write handle, or one opened here and closed when the
    /// operation ends
    pub(crate) fn write_handle(
        &self,
        coh: ContainerHandle,
        target: &MapTarget,
        wtid: TransactionId,
        tracker: &mut ResourceTracker,
    ) -> Result<ObjectHandle> {
        if !target.handles.wr.is_undefined() {
            return Ok(target.handles.wr);
        }
        let oh = self.store.open_write(coh, target.id, wtid)?;
        tracker.defer("local write handle", self.close_later(oh));
        Ok(oh)
    }
}
