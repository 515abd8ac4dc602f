//! Key-value lookup
//!
//! Variable-length values are fetched in two phases: a request with a zero
//! client buffer learns the size, a second one with a buffer that large
//! receives the bytes. Fixed-size values are converted back to the client's
//! memory representation before they are pushed.

use crate::messages::{GetRequest, GetResponse};
use crate::responder::Responder;
use crate::service::MapService;
use crate::tracker::ResourceTracker;
use iodmap_common::datatype::{convert, to_stored};
use iodmap_common::{Error, IntegrityScope, KvChecksum, Result, ResultCode, compute_crc64};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Size and checksum of what was (or would be) delivered
struct Delivered {
    size: u64,
    checksum: u64,
    pushed: u64,
}

impl MapService {
    /// Look up one key and deliver its value into the client's region
    pub async fn get(&self, req: GetRequest, reply: Responder<GetResponse>) {
        let start = Instant::now();
        debug!(
            "Map get: map={}, key={}, buf={}, vl={}",
            req.target.id,
            hex::encode(&req.key.key),
            req.client_buf_size,
            req.value_is_vl
        );
        let mut tracker = self.tracker("get");

        let result = self.try_get(&req, &mut tracker).await;
        let succeeded = result.is_ok();
        let (response, pushed) = match result {
            Ok(delivered) => (
                GetResponse {
                    result: ResultCode::SUCCESS,
                    value_size: delivered.size,
                    value_checksum: delivered.checksum,
                },
                delivered.pushed,
            ),
            Err(e) => {
                warn!("Map get on {} failed: {}", req.target.id, e);
                (GetResponse::failed(e.result_code()), 0)
            }
        };
        reply.send(response);
        tracker.finish(succeeded);
        self.metrics
            .get
            .record(succeeded, start.elapsed(), 0, pushed);
    }

    async fn try_get(&self, req: &GetRequest, tracker: &mut ResourceTracker) -> Result<Delivered> {
        let props = req.transfer_props.clone().unwrap_or_default();
        let raw_scope = props.integrity_scope;
        let rtid = props.read_context(req.read_context);
        if rtid != req.read_context {
            info!(
                "Map get on {} reads replica {} instead of {}",
                req.target.id,
                rtid.raw(),
                req.read_context.raw()
            );
        }
        let rd = self.read_handle(req.container, &req.target, rtid, tracker)?;

        let key = to_stored(&req.key.mem_type, &req.key.stored_type, &req.key.key)?.bytes;
        let stored_size = self.store.kv_get_size(rd, rtid, &key)?;

        if req.value_is_vl {
            if req.client_buf_size == 0 {
                return Ok(Delivered {
                    size: stored_size,
                    checksum: 0,
                    pushed: 0,
                });
            }
            let (value, stored) = self.store.kv_get_value(rd, rtid, &key)?;
            let checksum = verify_pair(raw_scope, &key, &value, stored)?;
            let size = value.len() as u64;
            self.bulk.push(value, &req.value, tracker).await?;
            return Ok(Delivered {
                size,
                checksum,
                pushed: size,
            });
        }

        let (value, stored) = self.store.kv_get_value(rd, rtid, &key)?;
        verify_pair(raw_scope, &key, &value, stored)?;
        let value = convert(&req.value_stored_type, &req.value_mem_type, &value)?;
        let checksum = if raw_scope.is_empty() {
            0
        } else {
            compute_crc64(&value)
        };
        let size = value.len() as u64;
        self.bulk.push(value, &req.value, tracker).await?;
        Ok(Delivered {
            size,
            checksum,
            pushed: size,
        })
    }
}

/// Check a fetched pair against the checksums stored with it. Returns the
/// value checksum, or zero when no raw-data checks apply.
fn verify_pair(
    raw_scope: IntegrityScope,
    key: &[u8],
    value: &[u8],
    stored: Option<KvChecksum>,
) -> Result<u64> {
    if raw_scope.is_empty() {
        return Ok(0);
    }
    let actual = KvChecksum::compute(key, value);
    if let Some(expected) = stored
        && expected.mismatches(&actual)
    {
        return Err(Error::corruption("kv pair", expected.value, actual.value));
    }
    Ok(actual.value)
}
