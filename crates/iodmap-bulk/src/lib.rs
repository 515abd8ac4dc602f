//! IodMap Bulk - bulk data transfer
//!
//! Request messages stay small; value payloads travel separately as
//! registered memory regions that the server either accesses in place or
//! pulls and pushes over the fabric.

pub mod fabric;
pub mod transport;

pub use fabric::{FabricEndpoint, MemoryFabric};
pub use transport::{BulkDescriptor, BulkRegion, BulkTransport};
