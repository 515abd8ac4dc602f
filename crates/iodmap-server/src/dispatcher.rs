//! Request dispatch
//!
//! Requests arrive on a bounded queue. Each one is handed to its handler on
//! a task of its own, which runs to its single response and cleanup without
//! being cancelled. A semaphore bounds how many handlers are in flight.

use crate::messages::{
    CloseRequest, CloseResponse, CountRequest, CountResponse, CreateRequest, CreateResponse,
    DeleteRequest, DeleteResponse, ExistsRequest, ExistsResponse, GetRequest, GetResponse,
    OpenRequest, OpenResponse, SetRequest, SetResponse,
};
use crate::responder::Responder;
use crate::service::MapService;
use iodmap_common::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Any map request
#[derive(Clone, Debug)]
pub enum MapRequest {
    Create(CreateRequest),
    Open(OpenRequest),
    Set(SetRequest),
    Get(GetRequest),
    GetCount(CountRequest),
    Exists(ExistsRequest),
    Delete(DeleteRequest),
    Close(CloseRequest),
}

/// Response to a [`MapRequest`] of the same variant
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapResponse {
    Create(CreateResponse),
    Open(OpenResponse),
    Set(SetResponse),
    Get(GetResponse),
    GetCount(CountResponse),
    Exists(ExistsResponse),
    Delete(DeleteResponse),
    Close(CloseResponse),
}

impl MapRequest {
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Open(_) => "open",
            Self::Set(_) => "set",
            Self::Get(_) => "get",
            Self::GetCount(_) => "get_count",
            Self::Exists(_) => "exists",
            Self::Delete(_) => "delete",
            Self::Close(_) => "close",
        }
    }
}

macro_rules! map_variant {
    ($variant:ident, $request:ty, $response:ty) => {
        impl From<$request> for MapRequest {
            fn from(req: $request) -> Self {
                Self::$variant(req)
            }
        }

        impl TryFrom<MapResponse> for $response {
            type Error = Error;

            fn try_from(resp: MapResponse) -> Result<Self> {
                match resp {
                    MapResponse::$variant(r) => Ok(r),
                    other => Err(Error::Unavailable(format!(
                        "expected a {} response, got {other:?}",
                        stringify!($variant)
                    ))),
                }
            }
        }
    };
}

map_variant!(Create, CreateRequest, CreateResponse);
map_variant!(Open, OpenRequest, OpenResponse);
map_variant!(Set, SetRequest, SetResponse);
map_variant!(Get, GetRequest, GetResponse);
map_variant!(GetCount, CountRequest, CountResponse);
map_variant!(Exists, ExistsRequest, ExistsResponse);
map_variant!(Delete, DeleteRequest, DeleteResponse);
map_variant!(Close, CloseRequest, CloseResponse);

struct Envelope {
    request: MapRequest,
    reply: oneshot::Sender<MapResponse>,
}

/// Client side of a running dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Envelope>,
}

impl DispatcherHandle {
    /// Submit one request and wait for its response
    pub async fn call(&self, request: MapRequest) -> Result<MapResponse> {
        let op = request.op();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| Error::Unavailable(format!("{op}: dispatcher is not running")))?;
        rx.await
            .map_err(|_| Error::Unavailable(format!("{op}: handler dropped its reply")))
    }

    /// Submit a typed request and unwrap the matching response
    pub async fn request<Req, Resp>(&self, request: Req) -> Result<Resp>
    where
        Req: Into<MapRequest>,
        Resp: TryFrom<MapResponse, Error = Error>,
    {
        Resp::try_from(self.call(request.into()).await?)
    }
}

pub struct Dispatcher {
    service: Arc<MapService>,
    rx: mpsc::Receiver<Envelope>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    /// Start the dispatch loop on the current runtime. The loop ends once
    /// every handle is dropped.
    pub fn start(service: Arc<MapService>) -> (DispatcherHandle, JoinHandle<()>) {
        let config = &service.config().dispatcher;
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        info!(
            "Dispatcher started: max_in_flight={}, queue_depth={}",
            config.max_in_flight, config.queue_depth
        );
        let dispatcher = Self {
            service,
            rx,
            permits,
        };
        (DispatcherHandle { tx }, tokio::spawn(dispatcher.run()))
    }

    async fn run(mut self) {
        while let Some(envelope) = self.rx.recv().await {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };
            let service = Arc::clone(&self.service);
            debug!("Dispatching {}", envelope.request.op());
            tokio::spawn(async move {
                dispatch(&service, envelope).await;
                drop(permit);
            });
        }
        info!("Dispatcher stopped");
    }
}

async fn dispatch(service: &MapService, envelope: Envelope) {
    let Envelope { request, reply } = envelope;
    match request {
        MapRequest::Create(req) => {
            service
                .create(req, responder("create", reply, MapResponse::Create))
                .await;
        }
        MapRequest::Open(req) => {
            service
                .open(req, responder("open", reply, MapResponse::Open))
                .await;
        }
        MapRequest::Set(req) => {
            service
                .set(req, responder("set", reply, MapResponse::Set))
                .await;
        }
        MapRequest::Get(req) => {
            service
                .get(req, responder("get", reply, MapResponse::Get))
                .await;
        }
        MapRequest::GetCount(req) => {
            service
                .get_count(req, responder("get_count", reply, MapResponse::GetCount))
                .await;
        }
        MapRequest::Exists(req) => {
            service
                .exists(req, responder("exists", reply, MapResponse::Exists))
                .await;
        }
        MapRequest::Delete(req) => {
            service
                .delete(req, responder("delete", reply, MapResponse::Delete))
                .await;
        }
        MapRequest::Close(req) => {
            service
                .close(req, responder("close", reply, MapResponse::Close))
                .await;
        }
    }
}

fn responder<T: Send + 'static>(
    op: &'static str,
    reply: oneshot::Sender<MapResponse>,
    wrap: fn(T) -> MapResponse,
) -> Responder<T> {
    Responder::new(op, move |response| {
        if reply.send(wrap(response)).is_err() {
            debug!("{}: caller went away before the response", op);
        }
    })
}
