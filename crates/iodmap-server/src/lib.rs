//! IodMap Server - map object request handlers
//!
//! Server side of the map operations: create, open, set, get, get-count,
//! exists, delete and close. Handlers run against an [`ObjectStore`] and move
//! value payloads through a [`BulkTransport`].
//!
//! [`ObjectStore`]: iodmap_store::ObjectStore
//! [`BulkTransport`]: iodmap_bulk::BulkTransport

pub mod bulk;
pub mod dispatcher;
mod handlers;
pub mod messages;
pub mod metrics;
pub mod path;
pub mod responder;
pub mod service;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use dispatcher::{Dispatcher, DispatcherHandle, MapRequest, MapResponse};
pub use messages::*;
pub use metrics::HandlerMetrics;
pub use responder::Responder;
pub use service::MapService;
pub use tracker::ResourceTracker;
