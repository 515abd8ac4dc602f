//! Error types for IodMap
//!
//! Every failure is fatal to the operation that hit it; nothing here is
//! retried. Handlers map errors onto the [`ResultCode`] sent to the client.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for IodMap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Storage primitive that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum StoreOp {
    #[display("create")]
    Create,
    #[display("open")]
    Open,
    #[display("close")]
    Close,
    #[display("get-scratch")]
    GetScratch,
    #[display("set-scratch")]
    SetScratch,
    #[display("kv-get")]
    KvGet,
    #[display("kv-set")]
    KvSet,
    #[display("kv-unlink")]
    KvUnlink,
    #[display("kv-count")]
    KvCount,
}

/// Common error type for IodMap
#[derive(Debug, Error)]
pub enum Error {
    /// An intermediate (or terminal, for open) path component is missing
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A storage primitive returned an error
    #[error("store {op} failed: {reason}")]
    StoreOpFailed { op: StoreOp, reason: String },

    /// A storage primitive failed because the key or object is absent
    #[error("store {op} failed: {what} not found")]
    NotFound { op: StoreOp, what: String },

    /// Checksum mismatch on stored or transferred data
    #[error("corruption detected in {what}: expected {expected:#018x}, got {actual:#018x}")]
    Corruption {
        what: String,
        expected: u64,
        actual: u64,
    },

    /// Memory-type to stored-type conversion failed
    #[error("datatype conversion failed: {0}")]
    ConversionFailed(String),

    /// Bulk handle create/access/transfer/wait failed, including timeouts
    #[error("bulk transfer failed: {0}")]
    TransferFailed(String),

    /// Server-side buffer could not be allocated
    #[error("can't allocate {size} bytes")]
    AllocationFailed { size: usize },

    /// Encoding or decoding of a stored record failed
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request never reached a handler, or its reply was lost
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Create a store failure
    pub fn store(op: StoreOp, reason: impl Into<String>) -> Self {
        Self::StoreOpFailed {
            op,
            reason: reason.into(),
        }
    }

    /// Create a store not-found failure
    pub fn not_found(op: StoreOp, what: impl Into<String>) -> Self {
        Self::NotFound {
            op,
            what: what.into(),
        }
    }

    /// Create a transfer failure
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::TransferFailed(msg.into())
    }

    /// Create a conversion failure
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::ConversionFailed(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Corruption {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PathNotFound(_))
    }

    /// Check if this is a checksum failure
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }

    /// Check if this came from the storage layer
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreOpFailed { .. } | Self::NotFound { .. })
    }

    /// Result code reported to the client for this error
    #[must_use]
    pub const fn result_code(&self) -> ResultCode {
        match self {
            Self::PathNotFound(_) => ResultCode::PATH_NOT_FOUND,
            Self::NotFound { .. } => ResultCode::NOT_FOUND,
            Self::Corruption { .. } => ResultCode::CORRUPTION,
            Self::ConversionFailed(_) => ResultCode::CONVERSION_FAILED,
            Self::TransferFailed(_) => ResultCode::TRANSFER_FAILED,
            Self::AllocationFailed { .. } => ResultCode::ALLOCATION_FAILED,
            Self::StoreOpFailed { .. }
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Unavailable(_) => ResultCode::FAIL,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Status code carried in every response that has one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultCode(i32);

impl ResultCode {
    pub const SUCCESS: Self = Self(0);
    pub const FAIL: Self = Self(-1);
    pub const PATH_NOT_FOUND: Self = Self(-2);
    pub const NOT_FOUND: Self = Self(-3);
    pub const CORRUPTION: Self = Self(-4);
    pub const CONVERSION_FAILED: Self = Self(-5);
    pub const TRANSFER_FAILED: Self = Self(-6);
    pub const ALLOCATION_FAILED: Self = Self(-7);

    #[must_use]
    pub const fn raw(&self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.0 >= 0
    }
}

impl<T> From<&Result<T>> for ResultCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::SUCCESS,
            Err(e) => e.result_code(),
        }
    }
}
