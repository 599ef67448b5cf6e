//! kvbridge - etcd v3 KV API emulation over pluggable key/value backends.
//!
//! Clients speaking etcd's KV gRPC service (Range, Put, DeleteRange, Txn,
//! Compact) are served from any store that implements the small
//! [`backend::Backend`] contract. Revision-based optimistic concurrency is
//! preserved by mapping the transaction shapes real clients issue onto the
//! backend's conditional primitives; anything else is rejected as
//! unsupported rather than approximated.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    etcd v3 gRPC (etcdserverpb.KV)                │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          KvServerBridge → LimitedServer → txn::classify         │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    dyn Backend (memory, ...)                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Main runtime orchestration
//! - [`core::error`] - Error types
//! - [`backend`] - Storage contract and the in-memory backend
//! - [`adapters::etcd`] - etcd v3 KV emulation and gRPC service
//! - [`cli::commands`] - CLI command implementations

// Core infrastructure
pub mod core;

// Storage contract
pub mod backend;

// Protocol adapters
pub mod adapters;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use adapters::etcd;
