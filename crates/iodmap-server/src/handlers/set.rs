//! Key-value insert

use crate::messages::{SetRequest, SetResponse};
use crate::responder::Responder;
use crate::service::MapService;
use crate::tracker::ResourceTracker;
use iodmap_common::datatype::to_stored;
use iodmap_common::{
    Error, IntegrityScope, KvChecksum, ObjectHandle, Result, ResultCode, TransferProps,
    compute_crc64,
};
use iodmap_store::KvEntry;
use std::time::Instant;
use tracing::{debug, warn};

impl MapService {
    /// Pull the value from the client, convert key and value to their stored
    /// representations and insert the pair
    pub async fn set(&self, req: SetRequest, reply: Responder<SetResponse>) {
        let start = Instant::now();
        debug!(
            "Map set: map={}, key={}, value={} bytes",
            req.target.id,
            hex::encode(&req.key.key),
            req.value.len
        );
        let mut tracker = self.tracker("set");

        let result = self.try_set(&req, &mut tracker).await;
        if let Err(e) = &result {
            warn!("Map set on {} failed: {}", req.target.id, e);
        }
        let succeeded = result.is_ok();
        reply.send(SetResponse {
            result: ResultCode::from(&result),
        });
        tracker.finish(succeeded);
        let bytes_in = if succeeded { req.value.len } else { 0 };
        self.metrics
            .set
            .record(succeeded, start.elapsed(), bytes_in, 0);
    }

    async fn try_set(&self, req: &SetRequest, tracker: &mut ResourceTracker) -> Result<()> {
        let wr = self.write_handle(req.container, &req.target, req.trans, tracker)?;
        let props = req.transfer_props.clone().unwrap_or_default();
        let region = self.bulk.pull(&req.value, tracker).await?;
        self.store_value(req, wr, &props, &region.read())
    }

    fn store_value(
        &self,
        req: &SetRequest,
        wr: ObjectHandle,
        props: &TransferProps,
        value: &[u8],
    ) -> Result<()> {
        let raw_scope = props.integrity_scope;
        if raw_scope.contains(IntegrityScope::TRANSFER) {
            let actual = compute_crc64(value);
            if actual != req.value_checksum {
                return Err(Error::corruption(
                    "value in transfer",
                    req.value_checksum,
                    actual,
                ));
            }
        }

        let key = to_stored(&req.key.mem_type, &req.key.stored_type, &req.key.key)?;
        let value = to_stored(&req.value_mem_type, &req.value_stored_type, value)?;
        let entry = KvEntry::new(key.bytes, value.bytes);
        let checksum = raw_scope
            .contains(IntegrityScope::STORAGE)
            .then(|| KvChecksum::compute(&entry.key, &entry.value));

        self.store.kv_set(wr, req.trans, &entry, checksum)?;
        debug!(
            "Stored {} byte value under {} in map {}",
            entry.value.len(),
            hex::encode(&entry.key),
            req.target.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::messages::MapTarget;
    use crate::test_support::{Harness, T1};
    use iodmap_bulk::BulkTransport;
    use iodmap_common::{
        Datatype, IntegrityScope, KvChecksum, ObjectId, ResultCode, StoreOp, compute_crc64,
    };

    #[tokio::test]
    async fn test_set_stores_pair_with_checksum() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let resp = h.set_vl(target, b"alpha", b"first value", IntegrityScope::ALL).await;
        assert_eq!(resp.result, ResultCode::SUCCESS);

        let (value, checksum) = h
            .service
            .store()
            .kv_get_value(target.handles.rd, T1, b"alpha")
            .unwrap();
        assert_eq!(value, b"first value");
        assert_eq!(checksum, Some(KvChecksum::compute(b"alpha", b"first value")));
        assert_eq!(h.service.metrics().set.successes(), 1);
    }

    #[tokio::test]
    async fn test_set_without_storage_scope_stores_no_checksum() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let resp = h.set_vl(target, b"k", b"v", IntegrityScope::TRANSFER).await;
        assert!(resp.result.is_success());
        let (_, checksum) = h
            .service
            .store()
            .kv_get_value(target.handles.rd, T1, b"k")
            .unwrap();
        assert_eq!(checksum, None);
    }

    #[tokio::test]
    async fn test_set_rejects_wrong_transfer_checksum() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let desc = h.remote.expose(b"payload".to_vec());
        let req = h.set_request(target, b"k", desc, 12345, IntegrityScope::TRANSFER);
        let resp = h.set(req).await;
        assert_eq!(resp.result, ResultCode::CORRUPTION);
        assert_eq!(
            h.service.store().kv_get_num(target.handles.rd, T1).unwrap(),
            0
        );
        // the staging region is gone once the request is over
        assert_eq!(h.fabric.live_regions(h.server.local_addr()), 0);
    }

    #[tokio::test]
    async fn test_set_catches_damage_in_flight() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        h.fabric.flip_next_transfer(3);
        let resp = h.set_vl(target, b"k", b"payload", IntegrityScope::TRANSFER).await;
        assert_eq!(resp.result, ResultCode::CORRUPTION);

        // without transfer checks the damaged bytes go through
        h.fabric.flip_next_transfer(3);
        let resp = h.set_vl(target, b"k", b"payload", IntegrityScope::NONE).await;
        assert!(resp.result.is_success());
        let (value, _) = h
            .service
            .store()
            .kv_get_value(target.handles.rd, T1, b"k")
            .unwrap();
        assert_ne!(value, b"payload");
    }

    #[tokio::test]
    async fn test_set_from_co_resident_client() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let desc = h.local.expose(b"local".to_vec());
        let req = h.set_request(target, b"k", desc, compute_crc64(b"local"), IntegrityScope::ALL);
        assert!(h.set(req).await.result.is_success());
        assert_eq!(h.fabric.live_regions(h.server.local_addr()), 1);
    }

    #[tokio::test]
    async fn test_set_by_id_closes_its_own_handle() {
        let h = Harness::new();
        h.create_map("m", 10).await;
        let baseline = h.mem.open_handle_count();
        let target = MapTarget::by_id(ObjectId::new(10));
        let resp = h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;
        assert!(resp.result.is_success());
        assert_eq!(h.mem.open_handle_count(), baseline);
    }

    #[tokio::test]
    async fn test_set_converts_fixed_size_values() {
        let h = Harness::new();
        let req = h.create_request("ints", 10, Datatype::STD_I32BE, Datatype::STD_I64BE);
        let resp = h.create(req).await;
        let target = MapTarget::open(ObjectId::new(10), resp.handles);

        let key = 7i32.to_le_bytes();
        let value = (-2i32).to_le_bytes();
        let desc = h.remote.expose(value.to_vec());
        let mut req = h.set_request(target, &key, desc, compute_crc64(&value), IntegrityScope::ALL);
        req.key.mem_type = Datatype::STD_I32LE;
        req.key.stored_type = Datatype::STD_I32BE;
        req.value_mem_type = Datatype::STD_I32LE;
        req.value_stored_type = Datatype::STD_I64BE;
        assert!(h.set(req).await.result.is_success());

        let (stored, _) = h
            .service
            .store()
            .kv_get_value(target.handles.rd, T1, &7i32.to_be_bytes())
            .unwrap();
        assert_eq!(stored, (-2i64).to_be_bytes());
    }

    #[tokio::test]
    async fn test_set_conversion_failure() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let desc = h.remote.expose(vec![1, 2, 3]);
        let mut req = h.set_request(target, b"k", desc, 0, IntegrityScope::NONE);
        req.value_mem_type = Datatype::STD_I32LE;
        req.value_stored_type = Datatype::STD_I64LE;
        let resp = h.set(req).await;
        assert_eq!(resp.result, ResultCode::CONVERSION_FAILED);
    }

    #[tokio::test]
    async fn test_set_store_failure() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        h.mem.fail_next(StoreOp::KvSet);
        let resp = h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;
        assert_eq!(resp.result, ResultCode::FAIL);
        assert_eq!(h.service.metrics().set.errors(), 1);
        assert_eq!(h.fabric.live_regions(h.server.local_addr()), 0);
    }

    #[tokio::test]
    async fn test_failed_set_keeps_caller_pair() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let baseline = h.mem.open_handle_count();

        h.mem.fail_next(StoreOp::KvSet);
        let resp = h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;
        assert_eq!(resp.result, ResultCode::FAIL);
        h.assert_pair_intact(target, baseline);

        // the same pair takes the retry
        let resp = h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;
        assert!(resp.result.is_success());
        h.assert_pair_intact(target, baseline);
    }
}
