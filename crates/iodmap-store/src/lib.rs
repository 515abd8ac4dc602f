//! IodMap Store - transactional KV object store
//!
//! This crate provides:
//! - The [`ObjectStore`] trait the map handlers are written against
//! - An in-memory implementation with versioned reads and fault injection
//! - Typed metadata and link records layered on the KV primitives

pub mod memory;
pub mod metadata;
pub mod traits;
pub mod types;

pub use memory::{MemoryObjectStore, ROOT_ID};
pub use metadata::{LinkInfo, LinkKind, MetadataKey};
pub use traits::ObjectStore;
pub use types::{KvEntry, ScratchPad};
