//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: backend → KV bridge → gRPC listener
//! - Shutdown order: listener → backend handles dropped

use crate::adapters::etcd::{EtcdGrpcServer, HeaderIdentity, KvServerBridge, LimitedServer};
use crate::backend::{Backend, MemoryBackend};
use crate::core::config::Config;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long `stop` waits for the listener to drain.
const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the backend named by `kind`.
pub fn build_backend(kind: &str) -> Result<Arc<dyn Backend>> {
    match kind {
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        other => anyhow::bail!("unknown backend kind: {other}"),
    }
}

/// Runtime holding all component handles.
pub struct Runtime {
    config: Arc<Config>,

    /// KV bridge, present once the backend is started.
    bridge: Option<KvServerBridge>,

    running: Arc<AtomicBool>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    grpc_handle: Option<JoinHandle<Result<()>>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            bridge: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            grpc_handle: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The KV bridge, once the runtime has started.
    pub fn bridge(&self) -> Option<&KvServerBridge> {
        self.bridge.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Start the backend and the gRPC listener.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            backend = %self.config.backend.kind,
            bind = %self.config.listener.bind,
            "starting kvbridge runtime"
        );

        self.init_backend().await?;
        self.start_listener()?;

        self.running.store(true, Ordering::Release);
        tracing::info!("kvbridge runtime started");
        Ok(())
    }

    async fn init_backend(&mut self) -> Result<()> {
        tracing::debug!("initializing backend");

        let backend = build_backend(&self.config.backend.kind)?;
        backend.start().await.context("failed to start backend")?;

        let identity =
            HeaderIdentity::new(self.config.cluster.cluster_id, self.config.cluster.member_id);
        let limited = LimitedServer::new(backend, identity);
        self.bridge = Some(KvServerBridge::new(limited));

        tracing::info!(kind = %self.config.backend.kind, "backend initialized");
        Ok(())
    }

    fn start_listener(&mut self) -> Result<()> {
        let bridge = self
            .bridge
            .clone()
            .context("backend must be initialized before the listener")?;
        let bind_addr = self.config.bind_addr()?;

        let server = EtcdGrpcServer::new(bind_addr, bridge, self.shutdown_rx.clone());
        self.grpc_handle = Some(tokio::spawn(server.run()));

        tracing::info!(bind = %bind_addr, "gRPC listener started");
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the runtime until ctrl-c, a shutdown request, or listener failure.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        let shutdown_requested = async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        };

        let mut listener_exited = false;
        if let Some(handle) = self.grpc_handle.as_mut() {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("shutdown signal received (SIGINT)");
                }
                _ = shutdown_requested => {
                    tracing::info!("shutdown requested by component");
                }
                result = handle => {
                    listener_exited = true;
                    match result {
                        Ok(Ok(())) => tracing::info!("gRPC server stopped normally"),
                        Ok(Err(e)) => tracing::error!(error = %e, "gRPC server failed"),
                        Err(e) => tracing::error!(error = %e, "gRPC server task panicked"),
                    }
                }
            }
        }
        if listener_exited {
            // Already joined; awaiting it again would panic.
            self.grpc_handle = None;
        }

        self.stop().await
    }

    /// Stop the listener and release the backend.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping kvbridge runtime");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.grpc_handle.take() {
            match tokio::time::timeout(LISTENER_STOP_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => tracing::info!("gRPC server stopped"),
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "gRPC server stopped with error"),
                Ok(Err(e)) => tracing::warn!(error = %e, "gRPC server task panicked"),
                Err(_) => tracing::warn!("gRPC server stop timed out"),
            }
        }

        self.bridge = None;
        tracing::info!("kvbridge runtime stopped");
        Ok(())
    }

    /// Start the backend only (no listener or signal handling).
    pub async fn start_for_tests(&mut self) -> Result<()> {
        self.init_backend().await?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_backend() {
        assert!(build_backend("memory").is_ok());
        assert!(build_backend("sqlite").is_err());
    }

    #[tokio::test]
    async fn test_start_for_tests_wires_bridge() {
        let mut runtime = Runtime::new(Config::default()).unwrap();
        assert!(runtime.bridge().is_none());
        runtime.start_for_tests().await.unwrap();
        assert!(runtime.is_running());
        assert_eq!(runtime.bridge().unwrap().limited().identity().member_id, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut config = Config::default();
        config.listener.bind = "127.0.0.1:0".to_string();
        let mut runtime = Runtime::new(config).unwrap();
        let shutdown_tx = runtime.shutdown_tx.clone();
        let task = tokio::spawn(async move {
            runtime.run().await?;
            Ok::<_, anyhow::Error>(runtime.is_running())
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        let still_running = task.await.unwrap().unwrap();
        assert!(!still_running);
    }
}
