//! Protocol adapters.
//!
//! Adapters translate an external client protocol into calls on the
//! [`Backend`](crate::backend::Backend) contract.
//!
//! - [`etcd`] - etcd v3 KV gRPC service

pub mod etcd;
