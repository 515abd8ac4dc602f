//! Map creation

use crate::messages::{CreateRequest, CreateResponse};
use crate::path::resolve_parent;
use crate::responder::Responder;
use crate::service::MapService;
use crate::tracker::ResourceTracker;
use iodmap_common::{
    CreateHints, HandlePair, IntegrityScope, ObjectKind, ObjectType, Result, ResultCode,
};
use iodmap_store::metadata::{self, LinkInfo, MetadataKey};
use iodmap_store::ScratchPad;
use std::time::Instant;
use tracing::{debug, warn};

impl MapService {
    /// Create a map and its metadata and attribute children, link it under
    /// the last component of the path, and hand back an open pair
    pub async fn create(&self, req: CreateRequest, reply: Responder<CreateResponse>) {
        let start = Instant::now();
        debug!(
            "Map create: path={}, map={}, md={}, attr={}",
            req.path, req.map_id, req.metadata_id, req.attribute_id
        );
        let mut tracker = self.tracker("create");

        let result = self.try_create(&req, &mut tracker);
        let succeeded = result.is_ok();
        let response = match result {
            Ok(handles) => CreateResponse {
                result: ResultCode::SUCCESS,
                handles,
            },
            Err(e) => {
                warn!("Map create of {} failed: {}", req.path, e);
                CreateResponse {
                    result: e.result_code(),
                    handles: HandlePair::UNDEFINED,
                }
            }
        };
        reply.send(response);
        tracker.finish(succeeded);
        self.metrics
            .create
            .record(succeeded, start.elapsed(), 0, 0);
    }

    fn try_create(&self, req: &CreateRequest, tracker: &mut ResourceTracker) -> Result<HandlePair> {
        let store = self.store.as_ref();
        let coh = req.container;
        let wtid = req.trans;
        let scope = req.cs_scope;

        let props = req.create_props.clone().unwrap_or_default();
        let map_hints = props.object_hints();
        let child_hints = CreateHints::for_metadata(scope);

        let parent = resolve_parent(
            &self.store,
            coh,
            req.loc_id,
            req.loc_handles,
            &req.path,
            wtid,
            req.read_context,
            scope,
        )?;
        parent.release_into(tracker, &self.store, &req.loc_handles);

        store.create_object(coh, wtid, ObjectKind::Kv, req.map_id, map_hints.as_ref())?;
        let rd = store.open_read(coh, req.map_id, wtid)?;
        tracker.on_failure("map read handle", self.close_later(rd));
        let wr = store.open_write(coh, req.map_id, wtid)?;
        tracker.on_failure("map write handle", self.close_later(wr));

        store.create_object(coh, wtid, ObjectKind::Kv, req.metadata_id, child_hints.as_ref())?;
        store.create_object(coh, wtid, ObjectKind::Kv, req.attribute_id, child_hints.as_ref())?;

        let pad = ScratchPad::for_map(req.metadata_id, req.attribute_id);
        let pad_checksum = scope
            .contains(IntegrityScope::STORAGE)
            .then(|| pad.checksum());
        store.set_scratch(wr, wtid, &pad, pad_checksum)?;

        let md = store.open_write(coh, req.metadata_id, wtid)?;
        let md_ticket = tracker.defer("metadata write handle", self.close_later(md));
        metadata::insert_metadata(store, md, wtid, MetadataKey::CreateProps, &props, scope)?;
        metadata::insert_metadata(store, md, wtid, MetadataKey::LinkCount, &1u64, scope)?;
        metadata::insert_metadata(store, md, wtid, MetadataKey::ObjectType, &ObjectType::Map, scope)?;
        metadata::insert_metadata(store, md, wtid, MetadataKey::KeyType, &req.key_type, scope)?;
        metadata::insert_metadata(store, md, wtid, MetadataKey::ValueType, &req.value_type, scope)?;
        tracker.release(md_ticket)?;

        metadata::insert_link(
            store,
            parent.handles.wr,
            wtid,
            &parent.leaf,
            &LinkInfo::hard(req.map_id),
            scope,
        )?;

        debug!("Created map {} as {} ({}, {})", req.map_id, req.path, rd, wr);
        Ok(HandlePair::new(rd, wr))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{Harness, T1};
    use iodmap_common::{
        Datatype, HandlePair, IntegrityScope, MapCreateProps, ObjectId, ObjectType, ResultCode,
        StoreOp,
    };
    use iodmap_store::metadata::{self, MetadataKey};
    use iodmap_store::ScratchPad;

    #[tokio::test]
    async fn test_create_links_map_and_writes_scratch_pad() {
        let h = Harness::new();
        let baseline = h.mem.open_handle_count();
        let req = h.create_request("/maps", 100, Datatype::STD_I32LE, Datatype::IEEE_F64LE);
        let resp = h.create(req).await;
        assert_eq!(resp.result, ResultCode::SUCCESS);
        assert!(!resp.handles.rd.is_undefined());
        assert!(!resp.handles.wr.is_undefined());
        // the returned pair is the only thing left open
        assert_eq!(h.mem.open_handle_count(), baseline + 2);

        let store = h.service.store().as_ref();
        let link = metadata::get_link(store, h.root.rd, T1, "maps", IntegrityScope::ALL).unwrap();
        assert_eq!(link.target, ObjectId::new(100));

        let (pad, checksum) = store.get_scratch(resp.handles.rd, T1).unwrap();
        assert_eq!(pad, ScratchPad::for_map(ObjectId::new(101), ObjectId::new(102)));
        assert_eq!(pad.0[2], ObjectId::INVALID);
        assert_eq!(pad.0[3], ObjectId::INVALID);
        assert_eq!(checksum, Some(pad.checksum()));

        let md = store.open_read(h.coh, ObjectId::new(101), T1).unwrap();
        let scope = IntegrityScope::ALL;
        let count: u64 = metadata::get_metadata(store, md, T1, MetadataKey::LinkCount, scope).unwrap();
        let kind: ObjectType =
            metadata::get_metadata(store, md, T1, MetadataKey::ObjectType, scope).unwrap();
        let key_type: Datatype =
            metadata::get_metadata(store, md, T1, MetadataKey::KeyType, scope).unwrap();
        let props: MapCreateProps =
            metadata::get_metadata(store, md, T1, MetadataKey::CreateProps, scope).unwrap();
        assert_eq!(count, 1);
        assert_eq!(kind, ObjectType::Map);
        assert_eq!(key_type, Datatype::STD_I32LE);
        assert_eq!(props, MapCreateProps::default());
        store.close(md).unwrap();
    }

    #[tokio::test]
    async fn test_create_adds_exactly_one_link() {
        let h = Harness::new();
        let store = h.service.store().as_ref();
        let before = store.kv_get_num(h.root.rd, T1).unwrap();
        h.create_map("m", 10).await;
        assert_eq!(store.kv_get_num(h.root.rd, T1).unwrap(), before + 1);
    }

    #[tokio::test]
    async fn test_create_without_storage_scope_skips_pad_checksum() {
        let h = Harness::new();
        let mut req = h.create_request("plain", 10, Datatype::VarString, Datatype::VarString);
        req.cs_scope = IntegrityScope::NONE;
        req.create_props = Some(Harness::checksummed_props());
        let resp = h.create(req).await;
        assert!(resp.result.is_success());

        let (_, checksum) = h
            .service
            .store()
            .get_scratch(resp.handles.rd, T1)
            .unwrap();
        assert_eq!(checksum, None);
    }

    #[tokio::test]
    async fn test_create_under_missing_group() {
        let h = Harness::new();
        let baseline = h.mem.open_handle_count();
        let req = h.create_request("nope/map", 10, Datatype::VarString, Datatype::VarString);
        let resp = h.create(req).await;
        assert_eq!(resp.result, ResultCode::PATH_NOT_FOUND);
        assert_eq!(resp.handles, HandlePair::UNDEFINED);
        assert_eq!(h.mem.open_handle_count(), baseline);
        assert!(!h.mem.contains_object(h.coh, ObjectId::new(10)));
    }

    #[tokio::test]
    async fn test_create_in_nested_group() {
        let h = Harness::new();
        h.create_map("outer", 10).await;
        let baseline = h.mem.open_handle_count();
        let req = h.create_request("outer/inner", 20, Datatype::VarString, Datatype::VarString);
        let resp = h.create(req).await;
        assert!(resp.result.is_success());
        assert_eq!(h.mem.open_handle_count(), baseline + 2);
    }

    #[tokio::test]
    async fn test_failure_after_open_unwinds_every_handle() {
        for op in [StoreOp::SetScratch, StoreOp::KvSet, StoreOp::Create] {
            let h = Harness::new();
            let baseline = h.mem.open_handle_count();
            // the injected create failure hits the map object itself
            h.mem.fail_next(op);
            let req = h.create_request("m", 10, Datatype::VarString, Datatype::VarString);
            let resp = h.create(req).await;
            assert_eq!(resp.result, ResultCode::FAIL, "{op}");
            assert_eq!(resp.handles, HandlePair::UNDEFINED);
            assert_eq!(h.mem.open_handle_count(), baseline, "{op}");
            assert_eq!(h.service.metrics().create.errors(), 1);
        }
    }

    #[tokio::test]
    async fn test_failing_cleanup_is_not_fatal() {
        let h = Harness::new();
        h.create_map("outer", 10).await;
        let baseline = h.mem.open_handle_count();
        // the metadata close goes through; closing the walked parent fails
        h.mem.fail_after(StoreOp::Close, 1);
        let req = h.create_request("outer/inner", 20, Datatype::VarString, Datatype::VarString);
        let resp = h.create(req).await;
        assert!(resp.result.is_success());
        assert_eq!(h.service.metrics().release_errors(), 1);
        assert_eq!(h.mem.open_handle_count(), baseline + 3);
    }

    #[tokio::test]
    async fn test_failing_explicit_close_is_fatal() {
        let h = Harness::new();
        h.mem.fail_next(StoreOp::Close);
        let resp = h
            .create(h.create_request("m", 10, Datatype::VarString, Datatype::VarString))
            .await;
        assert_eq!(resp.result, ResultCode::FAIL);
        assert_eq!(resp.handles, HandlePair::UNDEFINED);
        assert_eq!(h.service.metrics().release_errors(), 0);
    }
}
