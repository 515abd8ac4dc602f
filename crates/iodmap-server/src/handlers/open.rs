//! Map open

use crate::messages::{OpenRequest, OpenResponse};
use crate::path::open_by_path;
use crate::responder::Responder;
use crate::service::MapService;
use crate::tracker::ResourceTracker;
use iodmap_common::{Datatype, Error, HandlePair, IntegrityScope, MapCreateProps, Result, ResultCode};
use iodmap_store::ScratchPad;
use iodmap_store::metadata::{self, MetadataKey};
use std::time::Instant;
use tracing::{debug, warn};

impl MapService {
    /// Open a map by path, returning its handle pair, child ids and stored
    /// creation metadata
    pub async fn open(&self, req: OpenRequest, reply: Responder<OpenResponse>) {
        let start = Instant::now();
        debug!("Map open: path={}", req.path);
        let mut tracker = self.tracker("open");

        let result = self.try_open(&req, &mut tracker);
        let succeeded = result.is_ok();
        let response = result.unwrap_or_else(|e| {
            warn!("Map open of {} failed: {}", req.path, e);
            OpenResponse::failed(e.result_code())
        });
        reply.send(response);
        tracker.finish(succeeded);
        self.metrics.open.record(succeeded, start.elapsed(), 0, 0);
    }

    fn try_open(&self, req: &OpenRequest, tracker: &mut ResourceTracker) -> Result<OpenResponse> {
        let store = self.store.as_ref();
        let coh = req.container;
        let rtid = req.read_context;
        let scope = req.cs_scope;

        let (map_id, found) = open_by_path(
            &self.store,
            coh,
            req.loc_id,
            req.loc_handles,
            &req.path,
            rtid,
            scope,
        )?;
        let rd = found.rd;
        tracker.on_failure("map read handle", self.close_later(rd));
        let wr = store.open_write(coh, map_id, rtid)?;
        tracker.on_failure("map write handle", self.close_later(wr));

        let (pad, stored) = store.get_scratch(rd, rtid)?;
        if scope.contains(IntegrityScope::STORAGE)
            && let Some(expected) = stored
        {
            let actual = pad.checksum();
            if actual != expected {
                return Err(Error::corruption("scratch pad", expected, actual));
            }
        }
        let ScratchPad([metadata_id, attribute_id, ..]) = pad;

        let md = store.open_read(coh, metadata_id, rtid)?;
        let md_ticket = tracker.defer("metadata read handle", self.close_later(md));
        let create_props: MapCreateProps =
            metadata::get_metadata(store, md, rtid, MetadataKey::CreateProps, scope)?;
        let key_type: Datatype = metadata::get_metadata(store, md, rtid, MetadataKey::KeyType, scope)?;
        let value_type: Datatype =
            metadata::get_metadata(store, md, rtid, MetadataKey::ValueType, scope)?;
        tracker.release(md_ticket)?;

        debug!("Opened map {} at {} ({}, {})", map_id, req.path, rd, wr);
        Ok(OpenResponse {
            result: ResultCode::SUCCESS,
            handles: HandlePair::new(rd, wr),
            map_id,
            metadata_id,
            attribute_id,
            create_props: Some(create_props),
            key_type: Some(key_type),
            value_type: Some(value_type),
        })
    }
}
