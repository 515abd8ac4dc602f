//! Core type definitions for IodMap
//!
//! This module defines the identifiers, access handles and sentinels shared
//! by the store, the bulk layer and the map handlers.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a persistent object in the backing store
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The "no object" sentinel
    pub const INVALID: Self = Self(u64::MAX);

    /// Create from a raw id
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Check whether this is a real object id
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 != u64::MAX
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ObjectId({:#x})", self.0)
        } else {
            write!(f, "ObjectId(INVALID)")
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Access handle cookie for an open object
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// The "no handle" sentinel. Never passed to a close.
    pub const UNDEFINED: Self = Self(u64::MAX);

    /// Create from a raw cookie
    #[must_use]
    pub const fn new(cookie: u64) -> Self {
        Self(cookie)
    }

    /// Get the raw cookie
    #[must_use]
    pub const fn cookie(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for ObjectHandle {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "ObjectHandle(UNDEFINED)")
        } else {
            write!(f, "ObjectHandle({})", self.0)
        }
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "undefined")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Open state of a [`HandlePair`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Unopened,
    ReadOpen,
    WriteOpen,
    BothOpen,
}

/// Independent read and write handles for the same object.
///
/// Each side is opened and closed on its own; closing one side does not
/// invalidate the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlePair {
    /// Read-capable handle
    pub rd: ObjectHandle,
    /// Write-capable handle
    pub wr: ObjectHandle,
}

impl HandlePair {
    /// A pair with both sides undefined
    pub const UNDEFINED: Self = Self {
        rd: ObjectHandle::UNDEFINED,
        wr: ObjectHandle::UNDEFINED,
    };

    #[must_use]
    pub const fn new(rd: ObjectHandle, wr: ObjectHandle) -> Self {
        Self { rd, wr }
    }

    /// Current open state derived from which sides are defined
    #[must_use]
    pub const fn state(&self) -> HandleState {
        match (self.rd.is_undefined(), self.wr.is_undefined()) {
            (true, true) => HandleState::Unopened,
            (false, true) => HandleState::ReadOpen,
            (true, false) => HandleState::WriteOpen,
            (false, false) => HandleState::BothOpen,
        }
    }

    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        self.rd.is_undefined() && self.wr.is_undefined()
    }
}

impl Default for HandlePair {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Transaction (write epoch) or read-context identifier
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into, Display,
)]
#[display("{_0}")]
pub struct TransactionId(u64);

impl TransactionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle of the container a request operates in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into, Display)]
#[display("{_0}")]
pub struct ContainerHandle(u64);

impl ContainerHandle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Network address of a bulk-transfer peer
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct PeerAddr(String);

impl PeerAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Type tag stored in an object's metadata KV
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    Group,
    Dataset,
    Datatype,
    Map,
}

/// Kind of object created in the backing store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Key-value object
    Kv,
    /// Array object
    Array,
    /// Unstructured blob
    Blob,
}

/// Result of a key-existence probe, sent to the client as 0 / 1 / -1
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Existence {
    Absent,
    Present,
    Error,
}

impl Existence {
    /// Wire value of the tri-state
    #[must_use]
    pub const fn as_i8(&self) -> i8 {
        match self {
            Self::Absent => 0,
            Self::Present => 1,
            Self::Error => -1,
        }
    }
}

/// Entry count sent by get-count; `UNDEFINED` signals failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, From, Into)]
pub struct EntryCount(u64);

impl EntryCount {
    pub const UNDEFINED: Self = Self(u64::MAX);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    /// The count, or `None` for the failure sentinel
    #[must_use]
    pub const fn get(&self) -> Option<u64> {
        if self.0 == u64::MAX { None } else { Some(self.0) }
    }
}
