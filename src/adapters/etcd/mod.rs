//! etcd v3 KV emulation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 etcdserverpb.KV (gRPC)                      │
//! │        Range │ Put │ DeleteRange │ Txn │ Compact            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     KvServerBridge                          │
//! │  - rejects unsupported options before storage is touched    │
//! │  - wraps records for the wire, logs failures                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     LimitedServer                           │
//! │  - get / list / put / delete range                          │
//! │  - txn shapes: create, update, delete, compact              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                      dyn Backend (storage)
//! ```
//!
//! # Modules
//!
//! - [`grpc`] - tonic service and listener
//! - [`kv`] - capability gatekeeper
//! - [`limited`] - revision-aware request handling
//! - [`txn`] - transaction shape classification
//! - [`convert`] - header and record conversion
//! - [`errors`] - mapping to gRPC status codes
//! - [`proto`] - wire messages

pub mod convert;
pub mod errors;
pub mod grpc;
pub mod kv;
pub mod limited;
pub mod proto;
pub mod txn;

pub use convert::HeaderIdentity;
pub use grpc::{EtcdGrpcServer, EtcdKvServer};
pub use kv::KvServerBridge;
pub use limited::{LimitedServer, RangeResult};
pub use txn::{classify, TxnShape, COMPACT_REV_KEY};
