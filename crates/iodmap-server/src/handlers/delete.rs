//! Key removal

use crate::messages::{DeleteRequest, DeleteResponse};
use crate::responder::Responder;
use crate::service::MapService;
use crate::tracker::ResourceTracker;
use iodmap_common::datatype::to_stored;
use iodmap_common::{Result, ResultCode};
use std::time::Instant;
use tracing::{debug, warn};

impl MapService {
    /// Remove one key at the request's write epoch. Deleting an absent key
    /// reports `NOT_FOUND`.
    pub async fn delete(&self, req: DeleteRequest, reply: Responder<DeleteResponse>) {
        let start = Instant::now();
        debug!(
            "Map delete: map={}, key={}",
            req.target.id,
            hex::encode(&req.key.key)
        );
        let mut tracker = self.tracker("delete");

        let result = self.try_delete(&req, &mut tracker);
        if let Err(e) = &result {
            warn!("Map delete on {} failed: {}", req.target.id, e);
        }
        let succeeded = result.is_ok();
        reply.send(DeleteResponse {
            result: ResultCode::from(&result),
        });
        tracker.finish(succeeded);
        self.metrics
            .delete
            .record(succeeded, start.elapsed(), 0, 0);
    }

    fn try_delete(&self, req: &DeleteRequest, tracker: &mut ResourceTracker) -> Result<()> {
        let wr = self.write_handle(req.container, &req.target, req.trans, tracker)?;
        let key = to_stored(&req.key.mem_type, &req.key.stored_type, &req.key.key)?;
        self.store.kv_unlink(wr, req.trans, &key.bytes)
    }
}

#[cfg(test)]
mod tests {
    use crate::messages::{DeleteRequest, DeleteResponse, ExistsRequest, MapTarget};
    use crate::test_support::{Harness, T1, respond, vl_key};
    use iodmap_common::{Existence, IntegrityScope, ObjectId, ResultCode, StoreOp, TransactionId};

    fn delete_request(h: &Harness, target: MapTarget, key: &[u8]) -> DeleteRequest {
        DeleteRequest {
            container: h.coh,
            trans: T1,
            cs_scope: IntegrityScope::ALL,
            target,
            key: vl_key(key),
        }
    }

    async fn delete(h: &Harness, req: DeleteRequest) -> DeleteResponse {
        respond("delete", |r| h.service.delete(req, r)).await
    }

    async fn exists_at(h: &Harness, target: MapTarget, key: &[u8], rtid: u64) -> Existence {
        let req = ExistsRequest {
            container: h.coh,
            read_context: TransactionId::new(rtid),
            cs_scope: IntegrityScope::ALL,
            target: MapTarget::by_id(target.id),
            key: vl_key(key),
        };
        respond("exists", |r| h.service.exists(req, r)).await.exists
    }

    #[tokio::test]
    async fn test_delete_removes_key() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;
        assert_eq!(exists_at(&h, target, b"k", 1).await, Existence::Present);

        let resp = delete(&h, delete_request(&h, target, b"k")).await;
        assert_eq!(resp.result, ResultCode::SUCCESS);
        assert_eq!(exists_at(&h, target, b"k", 1).await, Existence::Absent);
    }

    #[tokio::test]
    async fn test_delete_absent_key() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let resp = delete(&h, delete_request(&h, target, b"never")).await;
        assert_eq!(resp.result, ResultCode::NOT_FOUND);
        assert_eq!(h.service.metrics().delete.errors(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_caller_pair() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;
        let baseline = h.mem.open_handle_count();

        let resp = delete(&h, delete_request(&h, target, b"never")).await;
        assert_eq!(resp.result, ResultCode::NOT_FOUND);
        h.assert_pair_intact(target, baseline);

        h.mem.fail_next(StoreOp::KvUnlink);
        let resp = delete(&h, delete_request(&h, target, b"k")).await;
        assert_eq!(resp.result, ResultCode::FAIL);
        h.assert_pair_intact(target, baseline);

        assert!(delete(&h, delete_request(&h, target, b"k")).await.result.is_success());
        h.assert_pair_intact(target, baseline);
    }

    #[tokio::test]
    async fn test_delete_is_versioned() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;

        let mut req = delete_request(&h, MapTarget::by_id(target.id), b"k");
        req.trans = TransactionId::new(4);
        assert!(delete(&h, req).await.result.is_success());
        assert_eq!(exists_at(&h, target, b"k", 1).await, Existence::Present);
        assert_eq!(exists_at(&h, target, b"k", 4).await, Existence::Absent);
    }

    #[tokio::test]
    async fn test_delete_by_id_leaves_no_handles() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        h.set_vl(target, b"k", b"v", IntegrityScope::ALL).await;
        let baseline = h.mem.open_handle_count();

        let by_id = MapTarget::by_id(ObjectId::new(10));
        h.mem.fail_next(StoreOp::KvUnlink);
        let resp = delete(&h, delete_request(&h, by_id, b"k")).await;
        assert_eq!(resp.result, ResultCode::FAIL);
        assert!(delete(&h, delete_request(&h, by_id, b"k")).await.result.is_success());
        assert_eq!(h.mem.open_handle_count(), baseline);
    }
}
