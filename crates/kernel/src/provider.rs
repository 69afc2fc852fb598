use async_trait::async_trait;

use crate::{
    config::SessionConfig,
    connection::{find_connection_file, ConnectionInfo, DiscoveryError},
    process::{self, KernelProcess, LaunchError},
    transport::{Transport, TransportError, ZmqTransport},
};

/// Everything a session needs from the outside world to reach a kernel.
#[async_trait]
pub trait KernelProvider: Send + Sync {
    type Transport: Transport + 'static;
    type Process: Send + 'static;

    /// Looks up the connection of an already running kernel.
    async fn resolve(&self, hint: &str) -> Result<ConnectionInfo, DiscoveryError>;

    /// Starts a new kernel.
    async fn spawn(&self) -> Result<(ConnectionInfo, Self::Process), LaunchError>;

    async fn terminate(&self, process: Self::Process) -> Result<(), LaunchError>;

    async fn open(&self, info: &ConnectionInfo) -> Result<Self::Transport, TransportError>;
}

/// Kernels on this machine: connection files in the runtime directory,
/// processes started from the configured command, ZeroMQ channels.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    config: SessionConfig,
}

impl LocalProvider {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl KernelProvider for LocalProvider {
    type Transport = ZmqTransport;
    type Process = KernelProcess;

    async fn resolve(&self, hint: &str) -> Result<ConnectionInfo, DiscoveryError> {
        let path = find_connection_file(hint, &self.config.runtime_dir())?;
        tracing::info!(hint, path = %path.display(), "found connection file");
        ConnectionInfo::read(&path)
    }

    async fn spawn(&self) -> Result<(ConnectionInfo, KernelProcess), LaunchError> {
        process::spawn(&self.config).await
    }

    async fn terminate(&self, process: KernelProcess) -> Result<(), LaunchError> {
        tracing::info!(pid = ?process.id(), "stopping kernel");
        process.terminate().await
    }

    async fn open(&self, info: &ConnectionInfo) -> Result<ZmqTransport, TransportError> {
        ZmqTransport::connect(info, &self.config.username).await
    }
}
