use std::{fmt, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    config::SessionConfig,
    connection::{ConnectionInfo, DiscoveryError},
    correlator::Correlator,
    message::{ExecutionResult, Message},
    process::LaunchError,
    provider::KernelProvider,
    transport::{Transport, TransportError},
    MessageId, Request,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Executing,
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    NotConnected,
    Busy,
    UnknownRequest(MessageId),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotConnected => write!(f, "no kernel connected"),
            Violation::Busy => write!(f, "kernel is still executing the previous request"),
            Violation::UnknownRequest(id) => write!(f, "no outstanding request {id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not find connection file for `{hint}`")]
    ConnectionNotFound { hint: String },
    #[error("could not load connection file")]
    Discovery(#[source] DiscoveryError),
    #[error("{0}")]
    ProtocolViolation(Violation),
    #[error("kernel connection closed")]
    TransportClosed,
    #[error("kernel channel error")]
    Transport(#[source] TransportError),
    #[error("could not start kernel")]
    Launch(#[from] LaunchError),
    #[error("kernel did not answer within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("execution cancelled")]
    Cancelled,
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => SessionError::TransportClosed,
            e => SessionError::Transport(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Established { owned: bool },
    AlreadyConnected,
}

/// What the kernel reported about itself during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KernelInfo {
    pub implementation: String,
    pub implementation_version: String,
    pub banner: String,
    pub language_info: LanguageInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
}

impl KernelInfo {
    fn from_reply(reply: &Message) -> Self {
        serde_json::from_value(reply.content.clone()).unwrap_or_default()
    }
}

impl fmt::Display for KernelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} / {} {}",
            self.implementation,
            self.implementation_version,
            self.language_info.name,
            self.language_info.version
        )
    }
}

enum Ownership<T> {
    Owned(T),
    Attached,
}

impl<T> Ownership<T> {
    fn is_owned(&self) -> bool {
        matches!(self, Ownership::Owned(_))
    }
}

struct Connection<P: KernelProvider> {
    info: ConnectionInfo,
    transport: P::Transport,
    ownership: Ownership<P::Process>,
    kernel: KernelInfo,
}

/// One client connection to one kernel, with at most one request in flight.
pub struct KernelSession<P: KernelProvider> {
    provider: P,
    config: SessionConfig,
    state: SessionState,
    connection: Option<Connection<P>>,
    outstanding: Option<MessageId>,
}

impl<P: KernelProvider> KernelSession<P> {
    pub fn new(provider: P, config: SessionConfig) -> Self {
        Self {
            provider,
            config,
            state: SessionState::Disconnected,
            connection: None,
            outstanding: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// `Some(true)` when this session started the kernel and will stop it.
    pub fn owns_kernel(&self) -> Option<bool> {
        self.connection.as_ref().map(|c| c.ownership.is_owned())
    }

    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref().map(|c| &c.info)
    }

    pub fn kernel_info(&self) -> Option<&KernelInfo> {
        self.connection.as_ref().map(|c| &c.kernel)
    }

    pub fn outstanding(&self) -> Option<&str> {
        self.outstanding.as_deref()
    }

    /// Starts a new kernel, or attaches to the one `hint` points at.
    ///
    /// Does nothing when a connection already exists. A hint that matches no
    /// connection file fails without starting a kernel.
    pub async fn connect(&mut self, hint: Option<&str>) -> Result<ConnectOutcome, SessionError> {
        if self.state != SessionState::Disconnected {
            tracing::debug!(state = ?self.state, "connect ignored");
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        self.state = SessionState::Connecting;

        match establish(&self.provider, &self.config, hint).await {
            Ok(connection) => {
                let owned = connection.ownership.is_owned();
                tracing::info!(owned, kernel = %connection.kernel, "connected");

                self.connection = Some(connection);
                self.state = SessionState::Connected;
                Ok(ConnectOutcome::Established { owned })
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Submits `code` and returns the id to collect its output with.
    pub async fn execute(&mut self, code: &str) -> Result<MessageId, SessionError> {
        match self.state {
            SessionState::Connected => {}
            SessionState::Executing => return Err(SessionError::ProtocolViolation(Violation::Busy)),
            _ => return Err(SessionError::ProtocolViolation(Violation::NotConnected)),
        }

        let Some(connection) = self.connection.as_mut() else {
            return Err(SessionError::ProtocolViolation(Violation::NotConnected));
        };

        self.state = SessionState::Executing;

        let request = Request::Execute {
            code: code.to_string(),
        };

        match connection.transport.send(request).await {
            Ok(request_id) => {
                tracing::info!(msg_id = %request_id, "execute");
                self.outstanding = Some(request_id.clone());
                Ok(request_id)
            }
            Err(e) => {
                self.state = SessionState::Connected;
                Err(self.fail(e).await)
            }
        }
    }

    /// Waits for the kernel to finish `request_id` and returns its output.
    ///
    /// Cancelling abandons the request: the partial output is dropped and the
    /// session is ready for the next `execute`.
    pub async fn collect(
        &mut self,
        request_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SessionError> {
        if self.state != SessionState::Executing || self.outstanding.as_deref() != Some(request_id)
        {
            return Err(SessionError::ProtocolViolation(Violation::UnknownRequest(
                request_id.to_string(),
            )));
        }

        let Some(connection) = self.connection.as_mut() else {
            return Err(SessionError::ProtocolViolation(Violation::NotConnected));
        };

        let correlator = Correlator::new(&mut connection.transport, request_id.to_string());

        let outcome = tokio::select! {
            biased;

            _ = cancel.cancelled() => None,
            result = correlator.collect() => Some(result),
        };

        self.outstanding = None;
        self.state = SessionState::Connected;
        connection.transport.discard_replies();

        match outcome {
            Some(Ok(result)) => Ok(result),
            Some(Err(e)) => Err(self.fail(e).await),
            None => {
                tracing::info!(msg_id = %request_id, "execution abandoned");
                Err(SessionError::Cancelled)
            }
        }
    }

    /// Closes the connection. A kernel this session started is stopped; an
    /// attached kernel keeps running.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Executing
        ) {
            return Ok(());
        }

        self.state = SessionState::ShuttingDown;
        self.outstanding = None;

        let result = match self.connection.take() {
            Some(mut connection) => match connection.ownership {
                Ownership::Owned(process) => {
                    let request = Request::Shutdown { restart: false };
                    if let Err(e) = connection.transport.send(request).await {
                        tracing::debug!(error = %e, "shutdown request not sent");
                    }
                    connection.transport.close().await;
                    self.provider
                        .terminate(process)
                        .await
                        .map_err(SessionError::from)
                }
                Ownership::Attached => {
                    connection.transport.close().await;
                    Ok(())
                }
            },
            None => Ok(()),
        };

        tracing::info!("disconnected");
        self.state = SessionState::Disconnected;
        result
    }

    /// A closed channel leaves nothing to talk to, so the session is torn down.
    async fn fail(&mut self, e: TransportError) -> SessionError {
        let error = SessionError::from(e);

        if matches!(error, SessionError::TransportClosed) {
            tracing::warn!("kernel channel closed, disconnecting");
            if let Some(mut connection) = self.connection.take() {
                connection.transport.close().await;
                release(&self.provider, connection.ownership).await;
            }
            self.outstanding = None;
            self.state = SessionState::Disconnected;
        }

        error
    }
}

async fn establish<P: KernelProvider>(
    provider: &P,
    config: &SessionConfig,
    hint: Option<&str>,
) -> Result<Connection<P>, SessionError> {
    let (info, ownership) = match hint {
        Some(hint) => {
            let info = provider.resolve(hint).await.map_err(|e| match e {
                DiscoveryError::NotFound { .. } => SessionError::ConnectionNotFound {
                    hint: hint.to_string(),
                },
                e => SessionError::Discovery(e),
            })?;
            (info, Ownership::Attached)
        }
        None => {
            let (info, process) = provider.spawn().await?;
            (info, Ownership::Owned(process))
        }
    };

    let mut transport = match provider.open(&info).await {
        Ok(transport) => transport,
        Err(e) => {
            release(provider, ownership).await;
            return Err(e.into());
        }
    };

    match handshake(&mut transport, config.startup_timeout).await {
        Ok(kernel) => Ok(Connection {
            info,
            transport,
            ownership,
            kernel,
        }),
        Err(e) => {
            transport.close().await;
            release(provider, ownership).await;
            Err(e)
        }
    }
}

/// Sends a kernel info request and waits for its reply, which proves the
/// kernel is alive.
async fn handshake<T: Transport>(
    transport: &mut T,
    timeout: Duration,
) -> Result<KernelInfo, SessionError> {
    let exchange = async {
        let request_id = transport.send(Request::KernelInfo).await?;
        loop {
            let reply = transport.recv_reply().await?;
            if reply.is_child_of(&request_id) {
                return Ok::<_, TransportError>(KernelInfo::from_reply(&reply));
            }
            tracing::debug!(msg_type = reply.msg_type(), "skipping stale reply");
        }
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| SessionError::HandshakeTimeout(timeout))?
        .map_err(SessionError::from)
}

async fn release<P: KernelProvider>(provider: &P, ownership: Ownership<P::Process>) {
    if let Ownership::Owned(process) = ownership {
        if let Err(e) = provider.terminate(process).await {
            tracing::warn!(error = %e, "could not stop kernel");
        }
    }
}
