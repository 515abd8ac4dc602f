//! Key existence probe

use crate::messages::{ExistsRequest, ExistsResponse};
use crate::responder::Responder;
use crate::service::MapService;
use crate::tracker::ResourceTracker;
use iodmap_common::datatype::to_stored;
use iodmap_common::{Existence, Result};
use std::time::Instant;
use tracing::{debug, warn};

impl MapService {
    /// Report whether a key is present. A missing key is an answer, not a
    /// failure; anything else that goes wrong is `Existence::Error`.
    pub async fn exists(&self, req: ExistsRequest, reply: Responder<ExistsResponse>) {
        let start = Instant::now();
        debug!(
            "Map exists: map={}, key={}",
            req.target.id,
            hex::encode(&req.key.key)
        );
        let mut tracker = self.tracker("exists");

        let exists = match self.probe(&req, &mut tracker) {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Map exists on {} failed: {}", req.target.id, e);
                Existence::Error
            }
        };
        let succeeded = exists != Existence::Error;
        reply.send(ExistsResponse { exists });
        tracker.finish(succeeded);
        self.metrics
            .exists
            .record(succeeded, start.elapsed(), 0, 0);
    }

    fn probe(&self, req: &ExistsRequest, tracker: &mut ResourceTracker) -> Result<Existence> {
        let rtid = req.read_context;
        let rd = self.read_handle(req.container, &req.target, rtid, tracker)?;
        let key = to_stored(&req.key.mem_type, &req.key.stored_type, &req.key.key)?;
        // only the key lookup may come back absent; a missing map is an error
        match self.store.kv_get_size(rd, rtid, &key.bytes) {
            Ok(_) => Ok(Existence::Present),
            Err(e) if e.is_not_found() => Ok(Existence::Absent),
            Err(e) => Err(e),
        }
    }
}
