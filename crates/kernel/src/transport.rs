use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::mpsc, task};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqError, ZmqMessage};

use crate::{
    connection::ConnectionInfo,
    message::{Header, Message},
    wire::{Codec, WireError},
    MessageId, Request,
};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("kernel channel closed")]
    Closed,
    #[error("socket error")]
    Zmq(#[from] ZmqError),
    #[error("wire protocol error")]
    Wire(#[from] WireError),
    #[error("invalid multipart message: {0}")]
    Frame(&'static str),
}

/// An ordered stream of broadcast messages.
#[async_trait]
pub trait BroadcastSource: Send {
    /// Waits for the next broadcast. Fails with [`TransportError::Closed`]
    /// once the stream has ended.
    async fn recv_broadcast(&mut self) -> Result<Message, TransportError>;
}

#[async_trait]
impl BroadcastSource for mpsc::UnboundedReceiver<Message> {
    async fn recv_broadcast(&mut self) -> Result<Message, TransportError> {
        self.recv().await.ok_or(TransportError::Closed)
    }
}

/// The channels of one kernel connection.
#[async_trait]
pub trait Transport: BroadcastSource {
    /// Submits a request without waiting for its reply.
    async fn send(&mut self, request: Request) -> Result<MessageId, TransportError>;

    /// Waits for the next reply on the request channel.
    async fn recv_reply(&mut self) -> Result<Message, TransportError>;

    /// Drops replies that have arrived but were never read, such as
    /// `execute_reply`, and returns how many there were.
    fn discard_replies(&mut self) -> usize;

    /// Closes the local end of every channel. The kernel is left running.
    async fn close(&mut self);
}

/// Shell requests and replies go through a task that owns the DEALER socket,
/// so replies are buffered as they arrive and can be dropped without waiting.
pub struct ZmqTransport {
    requests: mpsc::UnboundedSender<ZmqMessage>,
    replies: mpsc::UnboundedReceiver<Message>,
    control: DealerSocket,
    broadcasts: mpsc::UnboundedReceiver<Message>,
    codec: Codec,
    session: String,
    username: String,
    stop: CancellationToken,
}

impl ZmqTransport {
    pub async fn connect(info: &ConnectionInfo, username: &str) -> Result<Self, TransportError> {
        let codec = Codec::new(&info.key, &info.signature_scheme)?;

        let mut shell = DealerSocket::new();
        shell.connect(&info.shell_endpoint()).await?;

        let mut control = DealerSocket::new();
        control.connect(&info.control_endpoint()).await?;

        let mut iopub = SubSocket::new();
        iopub.connect(&info.iopub_endpoint()).await?;
        iopub.subscribe("").await?;

        let stop = CancellationToken::new();

        let (sender, broadcasts) = mpsc::unbounded_channel();
        task::spawn(
            read_broadcasts(iopub, codec.clone(), sender, stop.clone()).with_current_subscriber(),
        );

        let (requests, outgoing) = mpsc::unbounded_channel();
        let (incoming, replies) = mpsc::unbounded_channel();
        task::spawn(
            run_shell(shell, codec.clone(), outgoing, incoming, stop.clone())
                .with_current_subscriber(),
        );

        tracing::debug!(shell = %info.shell_endpoint(), iopub = %info.iopub_endpoint(), "channels open");

        Ok(Self {
            requests,
            replies,
            control,
            broadcasts,
            codec,
            session: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            stop,
        })
    }
}

fn to_frames(codec: &Codec, message: &Message) -> Result<ZmqMessage, TransportError> {
    let frames = codec.encode(message)?;
    ZmqMessage::try_from(frames).map_err(|_| TransportError::Frame("empty message"))
}

#[async_trait]
impl BroadcastSource for ZmqTransport {
    async fn recv_broadcast(&mut self) -> Result<Message, TransportError> {
        self.broadcasts.recv_broadcast().await
    }
}

#[async_trait]
impl Transport for ZmqTransport {
    async fn send(&mut self, request: Request) -> Result<MessageId, TransportError> {
        let header = Header::new(request.msg_type(), &self.session, &self.username);
        let message = Message::new(header, None, request.content());
        let frames = to_frames(&self.codec, &message)?;

        match request {
            Request::Shutdown { .. } => self.control.send(frames).await?,
            _ => self
                .requests
                .send(frames)
                .map_err(|_| TransportError::Closed)?,
        }

        tracing::debug!(msg_id = %message.header.msg_id, msg_type = message.msg_type(), "request sent");

        Ok(message.header.msg_id)
    }

    async fn recv_reply(&mut self) -> Result<Message, TransportError> {
        self.replies.recv().await.ok_or(TransportError::Closed)
    }

    fn discard_replies(&mut self) -> usize {
        let mut discarded = 0;
        while let Ok(reply) = self.replies.try_recv() {
            tracing::trace!(msg_type = reply.msg_type(), "discarding reply");
            discarded += 1;
        }
        discarded
    }

    async fn close(&mut self) {
        self.stop.cancel();
        self.broadcasts.close();
        self.replies.close();
    }
}

impl Drop for ZmqTransport {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn run_shell(
    mut shell: DealerSocket,
    codec: Codec,
    mut outgoing: mpsc::UnboundedReceiver<ZmqMessage>,
    incoming: mpsc::UnboundedSender<Message>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => break,
            request = outgoing.recv() => match request {
                Some(frames) => {
                    if let Err(e) = shell.send(frames).await {
                        tracing::warn!(error = %e, "request channel failed");
                        break;
                    }
                }
                None => break,
            },
            received = shell.recv() => match received {
                Ok(frames) => match codec.decode(frames.into_vec()) {
                    Ok(message) => {
                        if incoming.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "dropping undecodable reply"),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "request channel failed");
                    break;
                }
            },
        }
    }
}

async fn read_broadcasts(
    mut iopub: SubSocket,
    codec: Codec,
    sender: mpsc::UnboundedSender<Message>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => break,
            received = iopub.recv() => match received {
                Ok(frames) => match codec.decode(frames.into_vec()) {
                    Ok(message) => {
                        if sender.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "dropping undecodable broadcast"),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "broadcast channel failed");
                    break;
                }
            },
        }
    }
}
