//! IodMap Common - Shared types and utilities
//!
//! This crate provides the identifiers, sentinels, checksums, datatype
//! descriptors, property lists, error definitions and configuration used
//! across all IodMap components.

pub mod checksum;
pub mod config;
pub mod datatype;
pub mod error;
pub mod props;
pub mod types;

pub use checksum::{IntegrityScope, KvChecksum, compute_crc64, verify_crc64};
pub use config::ServerConfig;
pub use datatype::{ByteOrder, Datatype};
pub use error::{Error, Result, ResultCode, StoreOp};
pub use props::{CreateHints, MapCreateProps, TransferProps};
pub use types::*;
