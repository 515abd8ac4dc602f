//! Path resolution against group link records
//!
//! Paths are `/`-separated and walked from a location object whose handles
//! the caller owns. Empty components are ignored and an empty path names
//! nothing. Handles opened for intermediate groups are closed as soon as
//! the walk moves past them.

use crate::tracker::{ResourceTracker, Ticket};
use iodmap_common::{
    ContainerHandle, Error, HandlePair, IntegrityScope, ObjectHandle, ObjectId, Result,
    TransactionId,
};
use iodmap_store::{ObjectStore, metadata};
use std::sync::Arc;
use tracing::debug;

/// Parent group of the last path component
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedParent {
    /// Last path component
    pub leaf: String,
    pub id: ObjectId,
    pub handles: HandlePair,
}

impl ResolvedParent {
    /// Register closes for the sides that were opened by the walk. Each side
    /// is compared with the location's own handle independently.
    pub fn release_into(
        &self,
        tracker: &mut ResourceTracker,
        store: &Arc<dyn ObjectStore>,
        location: &HandlePair,
    ) {
        if self.handles.rd != location.rd && !self.handles.rd.is_undefined() {
            tracker.defer("parent read handle", close_later(store, self.handles.rd));
        }
        if self.handles.wr != location.wr && !self.handles.wr.is_undefined() {
            tracker.defer("parent write handle", close_later(store, self.handles.wr));
        }
    }
}

/// Release action closing one handle
pub fn close_later(
    store: &Arc<dyn ObjectStore>,
    oh: ObjectHandle,
) -> impl FnOnce() -> Result<()> + Send + 'static {
    let store = Arc::clone(store);
    move || store.close(oh)
}

/// Walk to the parent of the last component of `path`, opening it for read
/// and write
#[allow(clippy::too_many_arguments)]
pub fn resolve_parent(
    store: &Arc<dyn ObjectStore>,
    coh: ContainerHandle,
    loc_id: ObjectId,
    loc_handles: HandlePair,
    path: &str,
    wtid: TransactionId,
    rtid: TransactionId,
    cs_scope: IntegrityScope,
) -> Result<ResolvedParent> {
    let components = split(path)?;
    let Some((leaf, parents)) = components.split_last() else {
        return Err(Error::PathNotFound(path.to_string()));
    };
    let (id, handles) = walk(
        store,
        coh,
        (loc_id, loc_handles),
        parents,
        path,
        rtid,
        Some(wtid),
        cs_scope,
    )?;
    debug!("Resolved parent of {} to {}", path, id);
    Ok(ResolvedParent {
        leaf: (*leaf).to_string(),
        id,
        handles,
    })
}

/// Open the object named by `path` for read. The write side of the returned
/// pair is undefined.
pub fn open_by_path(
    store: &Arc<dyn ObjectStore>,
    coh: ContainerHandle,
    loc_id: ObjectId,
    loc_handles: HandlePair,
    path: &str,
    rtid: TransactionId,
    cs_scope: IntegrityScope,
) -> Result<(ObjectId, HandlePair)> {
    let components = split(path)?;
    walk(
        store,
        coh,
        (loc_id, loc_handles),
        &components,
        path,
        rtid,
        None,
        cs_scope,
    )
}

fn split(path: &str) -> Result<Vec<&str>> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Err(Error::PathNotFound(path.to_string()));
    }
    Ok(components)
}

/// Follow `names` from `start`. Each step opens the next object for read
/// and, with `wtid`, for write. Only the final object's handles survive.
#[allow(clippy::too_many_arguments)]
fn walk(
    store: &Arc<dyn ObjectStore>,
    coh: ContainerHandle,
    start: (ObjectId, HandlePair),
    names: &[&str],
    path: &str,
    rtid: TransactionId,
    wtid: Option<TransactionId>,
    cs_scope: IntegrityScope,
) -> Result<(ObjectId, HandlePair)> {
    let (mut id, mut handles) = start;
    let mut walked = ResourceTracker::new("path walk");
    let mut previous: Vec<Ticket> = Vec::new();

    for name in names {
        let link = metadata::get_link(store.as_ref(), handles.rd, rtid, name, cs_scope)
            .map_err(|e| missing_as_path_error(e, path))?;
        let rd = store
            .open_read(coh, link.target, rtid)
            .map_err(|e| missing_as_path_error(e, path))?;
        let mut current = vec![walked.on_failure("walk read handle", close_later(store, rd))];
        let wr = match wtid {
            Some(wtid) => {
                let wr = store.open_write(coh, link.target, wtid)?;
                current.push(walked.on_failure("walk write handle", close_later(store, wr)));
                wr
            }
            None => ObjectHandle::UNDEFINED,
        };
        for ticket in previous.drain(..) {
            walked.release(ticket)?;
        }
        previous = current;
        id = link.target;
        handles = HandlePair::new(rd, wr);
    }

    walked.finish(true);
    Ok((id, handles))
}

fn missing_as_path_error(e: Error, path: &str) -> Error {
    if e.is_not_found() {
        Error::PathNotFound(path.to_string())
    } else {
        e
    }
}
