//! Map close

use crate::messages::{CloseRequest, CloseResponse};
use crate::responder::Responder;
use crate::service::MapService;
use iodmap_common::{HandlePair, ObjectHandle, Result, ResultCode};
use std::time::Instant;
use tracing::{debug, warn};

impl MapService {
    /// Close both sides of a handle pair. Undefined sides are skipped; both
    /// defined sides are attempted and the first failure is reported.
    pub async fn close(&self, req: CloseRequest, reply: Responder<CloseResponse>) {
        let start = Instant::now();
        debug!("Map close: {:?}", req.handles.state());

        let result = self.close_pair(req.handles);
        if let Err(e) = &result {
            warn!("Map close of {}/{} failed: {}", req.handles.rd, req.handles.wr, e);
        }
        let succeeded = result.is_ok();
        reply.send(CloseResponse {
            result: ResultCode::from(&result),
        });
        self.metrics.close.record(succeeded, start.elapsed(), 0, 0);
    }

    fn close_pair(&self, handles: HandlePair) -> Result<()> {
        let rd = self.close_side(handles.rd);
        let wr = self.close_side(handles.wr);
        rd.and(wr)
    }

    fn close_side(&self, oh: ObjectHandle) -> Result<()> {
        if oh.is_undefined() {
            return Ok(());
        }
        self.store.close(oh)
    }
}

#[cfg(test)]
mod tests {
    use crate::messages::{CloseRequest, CloseResponse};
    use crate::test_support::{Harness, respond};
    use iodmap_common::{HandlePair, ObjectHandle, ResultCode, StoreOp};

    async fn close(h: &Harness, handles: HandlePair) -> CloseResponse {
        respond("close", |r| h.service.close(CloseRequest { handles }, r)).await
    }

    #[tokio::test]
    async fn test_close_releases_both_sides() {
        let h = Harness::new();
        let baseline = h.mem.open_handle_count();
        let target = h.create_map("m", 10).await;
        assert_eq!(h.mem.open_handle_count(), baseline + 2);

        let resp = close(&h, target.handles).await;
        assert_eq!(resp.result, ResultCode::SUCCESS);
        assert_eq!(h.mem.open_handle_count(), baseline);

        // the handles are gone now
        let resp = close(&h, target.handles).await;
        assert_eq!(resp.result, ResultCode::FAIL);
    }

    #[tokio::test]
    async fn test_close_skips_undefined_sides() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let baseline = h.mem.open_handle_count();

        let resp = close(&h, HandlePair::new(target.handles.rd, ObjectHandle::UNDEFINED)).await;
        assert!(resp.result.is_success());
        assert_eq!(h.mem.open_handle_count(), baseline - 1);

        assert!(close(&h, HandlePair::UNDEFINED).await.result.is_success());
    }

    #[tokio::test]
    async fn test_failed_read_close_still_closes_write() {
        let h = Harness::new();
        let target = h.create_map("m", 10).await;
        let baseline = h.mem.open_handle_count();

        h.mem.fail_next(StoreOp::Close);
        let resp = close(&h, target.handles).await;
        assert_eq!(resp.result, ResultCode::FAIL);
        // the write side went through, the read side is still open
        assert_eq!(h.mem.open_handle_count(), baseline - 1);
        assert_eq!(h.service.metrics().close.errors(), 1);
    }
}
