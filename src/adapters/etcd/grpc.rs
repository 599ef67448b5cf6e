//! gRPC server for the etcd v3 KV service.
//!
//! [`EtcdKvServer`] is a tonic service named `etcdserverpb.KV` that routes
//! the five unary KV methods to a [`KvServerBridge`]. Framing and protobuf
//! coding go through `tonic::server::Grpc` with the prost codec, so any
//! etcd v3 client can talk to it. Unknown methods answer `UNIMPLEMENTED`.

use super::kv::KvServerBridge;
use super::proto;
use anyhow::Context as _;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::watch;
use tonic::codec::ProstCodec;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Context, Poll, Service, StdError};
use tonic::server::{NamedService, UnaryService};

/// Fully qualified gRPC service name.
pub const SERVICE_NAME: &str = "etcdserverpb.KV";

// ============================================================================
// Server
// ============================================================================

/// etcd gRPC listener with graceful shutdown.
pub struct EtcdGrpcServer {
    bind_addr: SocketAddr,
    bridge: KvServerBridge,
    shutdown_rx: watch::Receiver<bool>,
}

impl EtcdGrpcServer {
    pub fn new(
        bind_addr: SocketAddr,
        bridge: KvServerBridge,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            bridge,
            shutdown_rx,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Serve until the shutdown signal flips to `true` or its sender drops.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.bind_addr;
        let mut shutdown_rx = self.shutdown_rx;

        tracing::info!(%addr, "starting etcd gRPC server");

        tonic::transport::Server::builder()
            .add_service(EtcdKvServer::new(self.bridge))
            .serve_with_shutdown(addr, async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                tracing::info!("gRPC server shutting down");
            })
            .await
            .with_context(|| format!("gRPC server on {addr} failed"))?;

        Ok(())
    }
}

// ============================================================================
// Tonic service
// ============================================================================

/// `etcdserverpb.KV` service over a [`KvServerBridge`].
#[derive(Clone)]
pub struct EtcdKvServer {
    bridge: KvServerBridge,
}

impl EtcdKvServer {
    pub fn new(bridge: KvServerBridge) -> Self {
        Self { bridge }
    }
}

impl NamedService for EtcdKvServer {
    const NAME: &'static str = SERVICE_NAME;
}

/// Declares a unary handler that forwards one method to the bridge.
macro_rules! unary_handler {
    ($name:ident, $method:ident, $req:ty, $resp:ty) => {
        struct $name(KvServerBridge);

        impl UnaryService<$req> for $name {
            type Response = $resp;
            type Future = BoxFuture<tonic::Response<$resp>, tonic::Status>;

            fn call(&mut self, request: tonic::Request<$req>) -> Self::Future {
                let bridge = self.0.clone();
                Box::pin(async move {
                    bridge
                        .$method(request.into_inner())
                        .await
                        .map(tonic::Response::new)
                        .map_err(tonic::Status::from)
                })
            }
        }
    };
}

unary_handler!(RangeSvc, range, proto::RangeRequest, proto::RangeResponse);
unary_handler!(PutSvc, put, proto::PutRequest, proto::PutResponse);
unary_handler!(
    DeleteRangeSvc,
    delete_range,
    proto::DeleteRangeRequest,
    proto::DeleteRangeResponse
);
unary_handler!(TxnSvc, txn, proto::TxnRequest, proto::TxnResponse);
unary_handler!(
    CompactSvc,
    compact,
    proto::CompactionRequest,
    proto::CompactionResponse
);

fn unary<S, Req, Resp, B>(
    svc: S,
    req: http::Request<B>,
) -> BoxFuture<http::Response<tonic::body::BoxBody>, Infallible>
where
    S: UnaryService<Req, Response = Resp> + Send + 'static,
    S::Future: Send + 'static,
    Req: prost::Message + Default + Send + 'static,
    Resp: prost::Message + Send + 'static,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    Box::pin(async move {
        let mut grpc = tonic::server::Grpc::new(ProstCodec::<Resp, Req>::default());
        Ok(grpc.unary(svc, req).await)
    })
}

fn unimplemented(path: String) -> BoxFuture<http::Response<tonic::body::BoxBody>, Infallible> {
    Box::pin(async move {
        tracing::warn!(%path, "unknown KV method");
        let mut response = http::Response::new(empty_body());
        let headers = response.headers_mut();
        headers.insert(
            tonic::Status::GRPC_STATUS,
            (tonic::Code::Unimplemented as i32).into(),
        );
        headers.insert(
            http::header::CONTENT_TYPE,
            tonic::metadata::GRPC_CONTENT_TYPE,
        );
        Ok(response)
    })
}

impl<B> Service<http::Request<B>> for EtcdKvServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let bridge = self.bridge.clone();
        tracing::trace!(path = req.uri().path(), "KV call");
        match req.uri().path() {
            "/etcdserverpb.KV/Range" => unary(RangeSvc(bridge), req),
            "/etcdserverpb.KV/Put" => unary(PutSvc(bridge), req),
            "/etcdserverpb.KV/DeleteRange" => unary(DeleteRangeSvc(bridge), req),
            "/etcdserverpb.KV/Txn" => unary(TxnSvc(bridge), req),
            "/etcdserverpb.KV/Compact" => unary(CompactSvc(bridge), req),
            path => unimplemented(path.to_string()),
        }
    }
}
