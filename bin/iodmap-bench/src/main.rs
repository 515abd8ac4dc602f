//! IodMap bench - drive the map handlers through the dispatcher
//!
//! Runs an in-memory object store and bulk fabric in one process. The
//! client either shares the server's address space (co-resident) or sits
//! on its own fabric address and has every payload pulled and pushed.

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::future::try_join_all;
use iodmap_bulk::{BulkTransport, FabricEndpoint, MemoryFabric};
use iodmap_common::{
    ContainerHandle, Datatype, Existence, HandlePair, IntegrityScope, ObjectId,
    ServerConfig, TransactionId, TransferProps, compute_crc64,
};
use iodmap_server::{
    CloseRequest, CloseResponse, CountRequest, CountResponse, CreateRequest, CreateResponse,
    DeleteRequest, DeleteResponse, Dispatcher, DispatcherHandle, ExistsRequest, ExistsResponse,
    GetRequest, GetResponse, KeyArgs, MapService, MapTarget, SetRequest, SetResponse,
};
use iodmap_store::{MemoryObjectStore, ObjectStore, ROOT_ID};
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WRITE_EPOCH: TransactionId = TransactionId::new(1);
const DELETE_EPOCH: TransactionId = TransactionId::new(2);

#[derive(Parser, Debug)]
#[command(name = "iodmap-bench")]
#[command(about = "IodMap map handler workload driver")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "iodmap.toml")]
    config: String,

    /// Server address on the bulk fabric
    #[arg(short, long)]
    address: Option<String>,

    /// Number of keys to write
    #[arg(short = 'n', long, default_value = "1000")]
    ops: usize,

    /// Value size in bytes
    #[arg(long, default_value = "4096")]
    value_size: usize,

    /// Requests kept in flight by the client
    #[arg(long, default_value = "16")]
    concurrency: usize,

    /// Place the client in the server's address space
    #[arg(long)]
    co_resident: bool,

    /// Integrity checks on the raw value bytes (none, transfer, storage, all)
    #[arg(long, default_value = "all")]
    integrity: String,

    /// Bulk idle timeout in milliseconds
    #[arg(long)]
    idle_timeout_ms: Option<u64>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_scope(s: &str) -> Result<IntegrityScope> {
    Ok(match s {
        "none" => IntegrityScope::NONE,
        "transfer" => IntegrityScope::TRANSFER,
        "storage" => IntegrityScope::STORAGE,
        "all" => IntegrityScope::ALL,
        other => bail!("unknown integrity scope {other:?}"),
    })
}

/// One client of the bench map
struct Client {
    handle: DispatcherHandle,
    endpoint: FabricEndpoint,
    coh: ContainerHandle,
    target: MapTarget,
    scope: IntegrityScope,
}

impl Client {
    fn key(i: usize) -> KeyArgs {
        KeyArgs {
            key: format!("key-{i:08}").into_bytes(),
            mem_type: Datatype::VarString,
            stored_type: Datatype::VarString,
        }
    }

    async fn set(&self, i: usize, value: &[u8]) -> Result<()> {
        let desc = self.endpoint.expose(value.to_vec());
        let req = SetRequest {
            container: self.coh,
            trans: WRITE_EPOCH,
            cs_scope: IntegrityScope::ALL,
            target: self.target,
            key: Self::key(i),
            value_mem_type: Datatype::VarString,
            value_stored_type: Datatype::VarString,
            value: desc.clone(),
            value_checksum: compute_crc64(value),
            transfer_props: Some(TransferProps::with_scope(self.scope)),
        };
        let resp: SetResponse = self.handle.request(req).await?;
        self.endpoint.release(&desc)?;
        if !resp.result.is_success() {
            bail!("set of key {i} failed: {:?}", resp.result);
        }
        Ok(())
    }

    /// Fetch one value in two phases and check it against `expected`
    async fn get(&self, i: usize, expected: &[u8]) -> Result<()> {
        let probe = self.get_into(i, 0).await?;
        if probe.value_size != expected.len() as u64 {
            bail!(
                "key {i}: size probe says {}, wrote {}",
                probe.value_size,
                expected.len()
            );
        }

        let len = usize::try_from(probe.value_size)?;
        let resp = self.get_into(i, len).await?;
        if !self.scope.is_empty() && resp.value_checksum != compute_crc64(expected) {
            bail!("key {i}: checksum {:#018x} does not match", resp.value_checksum);
        }
        Ok(())
    }

    async fn get_into(&self, i: usize, len: usize) -> Result<GetResponse> {
        let desc = self.endpoint.expose(vec![0; len]);
        let req = GetRequest {
            container: self.coh,
            read_context: WRITE_EPOCH,
            cs_scope: IntegrityScope::ALL,
            target: self.target,
            key: Self::key(i),
            value_mem_type: Datatype::VarString,
            value_stored_type: Datatype::VarString,
            client_buf_size: len as u64,
            value: desc.clone(),
            value_is_vl: true,
            transfer_props: Some(TransferProps::with_scope(self.scope)),
        };
        let resp: GetResponse = self.handle.request(req).await?;
        self.endpoint.release(&desc)?;
        if !resp.result.is_success() {
            bail!("get of key {i} failed: {:?}", resp.result);
        }
        Ok(resp)
    }

    async fn exists(&self, i: usize, rtid: TransactionId) -> Result<Existence> {
        let req = ExistsRequest {
            container: self.coh,
            read_context: rtid,
            cs_scope: IntegrityScope::ALL,
            target: self.target,
            key: Self::key(i),
        };
        let resp: ExistsResponse = self.handle.request(req).await?;
        Ok(resp.exists)
    }

    async fn delete(&self, i: usize) -> Result<()> {
        let req = DeleteRequest {
            container: self.coh,
            trans: DELETE_EPOCH,
            cs_scope: IntegrityScope::ALL,
            target: self.target,
            key: Self::key(i),
        };
        let resp: DeleteResponse = self.handle.request(req).await?;
        if !resp.result.is_success() {
            bail!("delete of key {i} failed: {:?}", resp.result);
        }
        Ok(())
    }

    async fn count(&self, rtid: TransactionId) -> Result<u64> {
        let req = CountRequest {
            container: self.coh,
            read_context: rtid,
            cs_scope: IntegrityScope::ALL,
            target: self.target,
        };
        let resp: CountResponse = self.handle.request(req).await?;
        resp.count.get().context("count failed")
    }
}

/// Run `op` for every index, `concurrency` at a time
async fn run_phase<F, Fut>(name: &str, n: usize, concurrency: usize, op: F) -> Result<()>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let start = Instant::now();
    let indices: Vec<usize> = (0..n).collect();
    for chunk in indices.chunks(concurrency.max(1)) {
        try_join_all(chunk.iter().map(|&i| op(i))).await?;
    }
    report(name, n, start.elapsed());
    Ok(())
}

fn report(name: &str, n: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { n as f64 / secs } else { 0.0 };
    info!("{:<8} {:>8} ops in {:>8.3}s ({:.0} ops/s)", name, n, secs, rate);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config))?;

    // CLI takes precedence over the config file
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if let Some(timeout) = args.idle_timeout_ms {
        config.bulk.idle_timeout_ms = timeout;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    let scope = parse_scope(&args.integrity)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting IodMap bench");
    info!("Config file: {}", args.config);
    info!(
        "Server {}: {} keys of {} bytes, concurrency {}, {}",
        config.server.address,
        args.ops,
        args.value_size,
        args.concurrency,
        if args.co_resident { "co-resident" } else { "remote" }
    );

    let mem = Arc::new(MemoryObjectStore::new());
    let store: Arc<dyn ObjectStore> = mem.clone();
    let coh = mem.create_container();
    let root = HandlePair::new(
        store.open_read(coh, ROOT_ID, WRITE_EPOCH)?,
        store.open_write(coh, ROOT_ID, WRITE_EPOCH)?,
    );

    let fabric = MemoryFabric::new();
    let server = fabric.endpoint(config.server.address.clone());
    let endpoint = if args.co_resident {
        fabric.endpoint(config.server.address.clone())
    } else {
        fabric.endpoint("bench-client")
    };

    let server_name = config.server.address.clone();
    let service = Arc::new(MapService::new(Arc::clone(&store), Arc::new(server), config));
    let (handle, dispatcher) = Dispatcher::start(Arc::clone(&service));

    let created: CreateResponse = handle
        .request(CreateRequest {
            container: coh,
            trans: WRITE_EPOCH,
            read_context: WRITE_EPOCH,
            cs_scope: IntegrityScope::ALL,
            loc_id: ROOT_ID,
            loc_handles: root,
            path: "/bench".to_string(),
            create_props: None,
            key_type: Datatype::VarString,
            value_type: Datatype::VarString,
            map_id: ObjectId::new(100),
            metadata_id: ObjectId::new(101),
            attribute_id: ObjectId::new(102),
        })
        .await?;
    if !created.result.is_success() {
        bail!("create failed: {:?}", created.result);
    }
    debug!("Bench map open as {:?}", created.handles);

    let client = Client {
        handle,
        endpoint,
        coh,
        target: MapTarget::open(ObjectId::new(100), created.handles),
        scope,
    };

    let mut rng = rand::thread_rng();
    let values: Vec<Vec<u8>> = (0..args.ops)
        .map(|_| {
            let mut value = vec![0u8; args.value_size];
            rng.fill_bytes(&mut value);
            value
        })
        .collect();

    let n = args.ops;
    let concurrency = args.concurrency;
    {
        let client = &client;
        let values = &values;

        run_phase("set", n, concurrency, |i| async move { client.set(i, &values[i]).await })
            .await?;
        let count = client.count(WRITE_EPOCH).await?;
        if count != n as u64 {
            bail!("map holds {count} entries after {n} sets");
        }

        run_phase("get", n, concurrency, |i| async move { client.get(i, &values[i]).await })
            .await?;
        run_phase("exists", n, concurrency, |i| async move {
            match client.exists(i, WRITE_EPOCH).await? {
                Existence::Present => Ok(()),
                other => bail!("key {i} reported {other:?}"),
            }
        })
        .await?;

        let half = n / 2;
        run_phase("delete", half, concurrency, |i| async move { client.delete(i).await }).await?;
        let before = client.count(WRITE_EPOCH).await?;
        let after = client.count(DELETE_EPOCH).await?;
        info!("Entries at epoch 1: {}, at epoch 2: {}", before, after);
        if before != n as u64 || after != (n - half) as u64 {
            bail!("unexpected counts after delete: {before} / {after}");
        }
    }

    let closed: CloseResponse = client
        .handle
        .request(CloseRequest {
            handles: client.target.handles,
        })
        .await?;
    if !closed.result.is_success() {
        error!("close failed: {:?}", closed.result);
    }
    store.close(root.rd)?;
    store.close(root.wr)?;

    // the dispatch loop ends with the last handle
    drop(client);
    dispatcher.await?;

    info!("Open handles left: {}", mem.open_handle_count());
    info!(
        "Live regions on the server: {}",
        fabric.live_regions(&service.config().server.peer_addr())
    );
    print!("{}", service.metrics().export_prometheus(&server_name));
    Ok(())
}
