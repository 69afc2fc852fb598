//! Collects the broadcast output of one request.
//!
//! The broadcast channel carries the traffic of every request and every client
//! attached to the kernel. Only messages whose parent is the tracked request
//! are kept, and only an idle status with that same parent ends collection:
//! the idle that follows the kernel info handshake must not be mistaken for
//! the end of an execution.

use crate::{
    message::{Broadcast, ExecutionResult, ExecutionState, Output},
    transport::{BroadcastSource, TransportError},
    MessageId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorState {
    Draining,
    Done,
}

pub struct Correlator<'a, S: ?Sized> {
    source: &'a mut S,
    request_id: MessageId,
    state: CorrelatorState,
}

impl<'a, S> Correlator<'a, S>
where
    S: BroadcastSource + ?Sized,
{
    pub fn new(source: &'a mut S, request_id: MessageId) -> Self {
        Self {
            source,
            request_id,
            state: CorrelatorState::Draining,
        }
    }

    pub fn state(&self) -> CorrelatorState {
        self.state
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Next output fragment of the request, or `None` once the kernel went
    /// idle for it.
    pub async fn next_output(&mut self) -> Result<Option<Output>, TransportError> {
        while self.state == CorrelatorState::Draining {
            let message = self.source.recv_broadcast().await?;

            let Some(broadcast) = Broadcast::parse(&message) else {
                tracing::trace!(msg_type = message.msg_type(), "ignoring broadcast");
                continue;
            };

            if !message.is_child_of(&self.request_id) {
                tracing::trace!(msg_type = message.msg_type(), parent = ?message.parent_id(), "ignoring unrelated broadcast");
                continue;
            }

            match broadcast {
                Broadcast::Output(output) => return Ok(Some(output)),
                Broadcast::Status(ExecutionState::Idle) => {
                    tracing::debug!(msg_id = %self.request_id, "kernel idle");
                    self.state = CorrelatorState::Done;
                }
                Broadcast::Status(_) => {}
            }
        }

        Ok(None)
    }

    /// Drains the request's output into one result.
    pub async fn collect(mut self) -> Result<ExecutionResult, TransportError> {
        let mut result = ExecutionResult::default();
        while let Some(output) = self.next_output().await? {
            result.merge(output);
        }

        Ok(result)
    }
}
