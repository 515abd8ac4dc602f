//! Request and response records for the map operations
//!
//! Every request names the container it operates in, the epochs relevant to
//! it and the integrity scope for stored metadata. Property lists are
//! optional; the handlers default-fill them.

use iodmap_bulk::BulkDescriptor;
use iodmap_common::{
    ContainerHandle, Datatype, EntryCount, Existence, HandlePair, IntegrityScope, MapCreateProps,
    ObjectId, ResultCode, TransactionId, TransferProps,
};
use serde::{Deserialize, Serialize};

/// Map addressed by its handle pair; an undefined side is opened by id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTarget {
    pub id: ObjectId,
    pub handles: HandlePair,
}

impl MapTarget {
    /// Target with open handles
    #[must_use]
    pub const fn open(id: ObjectId, handles: HandlePair) -> Self {
        Self { id, handles }
    }

    /// Target the handler must open by id
    #[must_use]
    pub const fn by_id(id: ObjectId) -> Self {
        Self {
            id,
            handles: HandlePair::UNDEFINED,
        }
    }
}

/// Key bytes with their in-memory and stored representations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyArgs {
    pub key: Vec<u8>,
    pub mem_type: Datatype,
    pub stored_type: Datatype,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateRequest {
    pub container: ContainerHandle,
    pub trans: TransactionId,
    pub read_context: TransactionId,
    pub cs_scope: IntegrityScope,
    pub loc_id: ObjectId,
    pub loc_handles: HandlePair,
    pub path: String,
    pub create_props: Option<MapCreateProps>,
    pub key_type: Datatype,
    pub value_type: Datatype,
    pub map_id: ObjectId,
    pub metadata_id: ObjectId,
    pub attribute_id: ObjectId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub result: ResultCode,
    /// Undefined on failure
    pub handles: HandlePair,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenRequest {
    pub container: ContainerHandle,
    pub read_context: TransactionId,
    pub cs_scope: IntegrityScope,
    pub loc_id: ObjectId,
    pub loc_handles: HandlePair,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenResponse {
    pub result: ResultCode,
    pub handles: HandlePair,
    pub map_id: ObjectId,
    pub metadata_id: ObjectId,
    pub attribute_id: ObjectId,
    pub create_props: Option<MapCreateProps>,
    pub key_type: Option<Datatype>,
    pub value_type: Option<Datatype>,
}

impl OpenResponse {
    pub(crate) const fn failed(result: ResultCode) -> Self {
        Self {
            result,
            handles: HandlePair::UNDEFINED,
            map_id: ObjectId::INVALID,
            metadata_id: ObjectId::INVALID,
            attribute_id: ObjectId::INVALID,
            create_props: None,
            key_type: None,
            value_type: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetRequest {
    pub container: ContainerHandle,
    pub trans: TransactionId,
    pub cs_scope: IntegrityScope,
    pub target: MapTarget,
    pub key: KeyArgs,
    pub value_mem_type: Datatype,
    pub value_stored_type: Datatype,
    /// Client region holding the value in its memory representation
    pub value: BulkDescriptor,
    /// CRC-64 of the value bytes as sent
    pub value_checksum: u64,
    pub transfer_props: Option<TransferProps>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResponse {
    pub result: ResultCode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetRequest {
    pub container: ContainerHandle,
    pub read_context: TransactionId,
    pub cs_scope: IntegrityScope,
    pub target: MapTarget,
    pub key: KeyArgs,
    pub value_mem_type: Datatype,
    pub value_stored_type: Datatype,
    /// Client region the value is delivered into
    pub value: BulkDescriptor,
    /// Size of the client's output buffer; zero asks for the size only
    pub client_buf_size: u64,
    pub value_is_vl: bool,
    pub transfer_props: Option<TransferProps>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub result: ResultCode,
    pub value_size: u64,
    /// CRC-64 of the delivered bytes, zero without raw-data checks
    pub value_checksum: u64,
}

impl GetResponse {
    pub(crate) const fn failed(result: ResultCode) -> Self {
        Self {
            result,
            value_size: 0,
            value_checksum: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CountRequest {
    pub container: ContainerHandle,
    pub read_context: TransactionId,
    pub cs_scope: IntegrityScope,
    pub target: MapTarget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: EntryCount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExistsRequest {
    pub container: ContainerHandle,
    pub read_context: TransactionId,
    pub cs_scope: IntegrityScope,
    pub target: MapTarget,
    pub key: KeyArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: Existence,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub container: ContainerHandle,
    pub trans: TransactionId,
    pub cs_scope: IntegrityScope,
    pub target: MapTarget,
    pub key: KeyArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub result: ResultCode,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CloseRequest {
    pub handles: HandlePair,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResponse {
    pub result: ResultCode,
}
