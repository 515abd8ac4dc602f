//! Shared fixtures for handler tests

use crate::messages::{
    CreateRequest, CreateResponse, GetRequest, GetResponse, KeyArgs, MapTarget, SetRequest,
    SetResponse,
};
use crate::responder::Responder;
use crate::service::MapService;
use iodmap_bulk::{BulkDescriptor, FabricEndpoint, MemoryFabric};
use iodmap_common::{
    ContainerHandle, Datatype, HandlePair, IntegrityScope, MapCreateProps, ObjectId,
    ServerConfig, TransactionId, TransferProps, compute_crc64,
};
use iodmap_store::{MemoryObjectStore, ObjectStore, ROOT_ID};
use std::future::Future;
use std::sync::Arc;

pub const T1: TransactionId = TransactionId::new(1);

/// Run one handler and collect its single response
pub async fn respond<T, Fut>(op: &'static str, handler: impl FnOnce(Responder<T>) -> Fut) -> T
where
    T: Send + 'static,
    Fut: Future<Output = ()>,
{
    let (responder, rx) = Responder::channel(op);
    handler(responder).await;
    rx.await.expect("handler must reply")
}

pub fn vl_key(key: &[u8]) -> KeyArgs {
    KeyArgs {
        key: key.to_vec(),
        mem_type: Datatype::VarString,
        stored_type: Datatype::VarString,
    }
}

pub struct Harness {
    pub mem: Arc<MemoryObjectStore>,
    pub fabric: Arc<MemoryFabric>,
    pub server: FabricEndpoint,
    /// Client in another address space
    pub remote: FabricEndpoint,
    /// Client sharing the server's address space
    pub local: FabricEndpoint,
    pub service: Arc<MapService>,
    pub coh: ContainerHandle,
    /// Open pair on the container's root group
    pub root: HandlePair,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let mem = Arc::new(MemoryObjectStore::new());
        let fabric = MemoryFabric::new();
        let server = fabric.endpoint(config.server.address.clone());
        let remote = fabric.endpoint("client-1");
        let local = fabric.endpoint(config.server.address.clone());
        let store: Arc<dyn ObjectStore> = mem.clone();
        let coh = mem.create_container();
        let root = HandlePair::new(
            store.open_read(coh, ROOT_ID, T1).unwrap(),
            store.open_write(coh, ROOT_ID, T1).unwrap(),
        );
        let service = Arc::new(MapService::new(store, Arc::new(server.clone()), config));
        Self {
            mem,
            fabric,
            server,
            remote,
            local,
            service,
            coh,
            root,
        }
    }

    pub fn create_request(
        &self,
        path: &str,
        map_id: u64,
        key_type: Datatype,
        value_type: Datatype,
    ) -> CreateRequest {
        CreateRequest {
            container: self.coh,
            trans: T1,
            read_context: T1,
            cs_scope: IntegrityScope::ALL,
            loc_id: ROOT_ID,
            loc_handles: self.root,
            path: path.to_string(),
            create_props: None,
            key_type,
            value_type,
            map_id: ObjectId::new(map_id),
            metadata_id: ObjectId::new(map_id + 1),
            attribute_id: ObjectId::new(map_id + 2),
        }
    }

    pub async fn create(&self, req: CreateRequest) -> CreateResponse {
        respond("create", |r| self.service.create(req, r)).await
    }

    /// Create a map with variable-length keys and values
    pub async fn create_map(&self, path: &str, map_id: u64) -> MapTarget {
        let req = self.create_request(path, map_id, Datatype::VarString, Datatype::VarString);
        let resp = self.create(req).await;
        assert!(resp.result.is_success(), "create failed: {resp:?}");
        MapTarget::open(ObjectId::new(map_id), resp.handles)
    }

    pub fn set_request(
        &self,
        target: MapTarget,
        key: &[u8],
        value: BulkDescriptor,
        value_checksum: u64,
        scope: IntegrityScope,
    ) -> SetRequest {
        SetRequest {
            container: self.coh,
            trans: T1,
            cs_scope: IntegrityScope::ALL,
            target,
            key: vl_key(key),
            value_mem_type: Datatype::VarString,
            value_stored_type: Datatype::VarString,
            value,
            value_checksum,
            transfer_props: Some(TransferProps::with_scope(scope)),
        }
    }

    pub async fn set(&self, req: SetRequest) -> SetResponse {
        respond("set", |r| self.service.set(req, r)).await
    }

    /// Set a variable-length value from the remote client
    pub async fn set_vl(
        &self,
        target: MapTarget,
        key: &[u8],
        value: &[u8],
        scope: IntegrityScope,
    ) -> SetResponse {
        let desc = self.remote.expose(value.to_vec());
        let req = self.set_request(target, key, desc, compute_crc64(value), scope);
        self.set(req).await
    }

    pub fn get_request(
        &self,
        target: MapTarget,
        key: &[u8],
        value: BulkDescriptor,
        scope: IntegrityScope,
    ) -> GetRequest {
        GetRequest {
            container: self.coh,
            read_context: T1,
            cs_scope: IntegrityScope::ALL,
            target,
            key: vl_key(key),
            value_mem_type: Datatype::VarString,
            value_stored_type: Datatype::VarString,
            client_buf_size: value.len,
            value,
            value_is_vl: true,
            transfer_props: Some(TransferProps::with_scope(scope)),
        }
    }

    pub async fn get(&self, req: GetRequest) -> GetResponse {
        respond("get", |r| self.service.get(req, r)).await
    }

    /// Fetch a variable-length value into a fresh remote buffer of `buf_len`
    pub async fn get_vl(
        &self,
        target: MapTarget,
        key: &[u8],
        buf_len: usize,
        scope: IntegrityScope,
    ) -> (GetResponse, Vec<u8>) {
        let desc = self.remote.expose(vec![0; buf_len]);
        let resp = self
            .get(self.get_request(target, key, desc.clone(), scope))
            .await;
        let bytes = self.remote.read_back(&desc).unwrap();
        (resp, bytes)
    }

    /// The caller's pair is still open, no handle leaked, and both sides
    /// still serve requests
    pub fn assert_pair_intact(&self, target: MapTarget, baseline: usize) {
        assert_eq!(self.mem.open_handle_count(), baseline);
        let store = self.service.store();
        store.kv_get_num(target.handles.rd, T1).unwrap();
        store.kv_get_num(target.handles.wr, T1).unwrap();
    }

    /// Default creation properties with object checksums on
    pub const fn checksummed_props() -> MapCreateProps {
        MapCreateProps {
            enable_checksum: true,
        }
    }
}
