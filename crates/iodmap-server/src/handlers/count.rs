//! Entry count

use crate::messages::{CountRequest, CountResponse};
use crate::responder::Responder;
use crate::service::MapService;
use iodmap_common::EntryCount;
use std::time::Instant;
use tracing::{debug, warn};

impl MapService {
    /// Number of live entries at the read context; `EntryCount::UNDEFINED`
    /// on failure
    pub async fn get_count(&self, req: CountRequest, reply: Responder<CountResponse>) {
        let start = Instant::now();
        debug!("Map count: map={}", req.target.id);
        let mut tracker = self.tracker("get_count");

        let result = self
            .read_handle(req.container, &req.target, req.read_context, &mut tracker)
            .and_then(|rd| self.store.kv_get_num(rd, req.read_context));
        let succeeded = result.is_ok();
        let count = match result {
            Ok(n) => EntryCount::new(n),
            Err(e) => {
                warn!("Map count on {} failed: {}", req.target.id, e);
                EntryCount::UNDEFINED
            }
        };
        reply.send(CountResponse { count });
        tracker.finish(succeeded);
        self.metrics
            .get_count
            .record(succeeded, start.elapsed(), 0, 0);
    }
}
