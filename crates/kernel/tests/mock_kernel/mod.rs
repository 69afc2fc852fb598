#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use kernlink_kernel::{
    BroadcastSource, ConnectionInfo, DiscoveryError, Header, KernelProvider, LaunchError, Message,
    MessageId, Request, Transport, TransportError,
};
use serde_json::json;
use tokio::sync::mpsc;

use crate::utils::{broadcast, error, input, result, status, stream};

/// What the session asked of the outside world.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Calls {
    pub spawned: usize,
    pub terminated: usize,
    pub resolved: Vec<String>,
    pub kernel_info_requests: usize,
    pub executions: Vec<String>,
    pub shutdown_requests: usize,
    pub discarded_replies: usize,
    pub closed: usize,
}

#[derive(Clone, Default)]
pub struct MockProvider {
    calls: Arc<Mutex<Calls>>,
    /// Hints that resolve to a running kernel.
    known_hints: Vec<String>,
    /// The kernel never answers the handshake.
    unresponsive: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running_kernel(hint: &str) -> Self {
        Self {
            known_hints: vec![hint.to_string()],
            ..Self::default()
        }
    }

    pub fn unresponsive() -> Self {
        Self {
            unresponsive: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

pub struct MockProcess;

fn connection_info() -> ConnectionInfo {
    ConnectionInfo {
        ip: "127.0.0.1".to_string(),
        transport: "tcp".to_string(),
        shell_port: 1,
        iopub_port: 2,
        stdin_port: 3,
        control_port: 4,
        hb_port: 5,
        key: String::new(),
        signature_scheme: "hmac-sha256".to_string(),
        kernel_name: None,
    }
}

#[async_trait]
impl KernelProvider for MockProvider {
    type Transport = MockTransport;
    type Process = MockProcess;

    async fn resolve(&self, hint: &str) -> Result<ConnectionInfo, DiscoveryError> {
        self.calls.lock().unwrap().resolved.push(hint.to_string());

        if self.known_hints.iter().any(|known| known == hint) {
            Ok(connection_info())
        } else {
            Err(DiscoveryError::NotFound {
                hint: hint.to_string(),
            })
        }
    }

    async fn spawn(&self) -> Result<(ConnectionInfo, MockProcess), LaunchError> {
        self.calls.lock().unwrap().spawned += 1;
        Ok((connection_info(), MockProcess))
    }

    async fn terminate(&self, _process: MockProcess) -> Result<(), LaunchError> {
        self.calls.lock().unwrap().terminated += 1;
        Ok(())
    }

    async fn open(&self, _info: &ConnectionInfo) -> Result<MockTransport, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();

        Ok(MockTransport {
            broadcasts: receiver,
            kernel: Some(sender),
            replies: VecDeque::new(),
            execution_count: 0,
            unresponsive: self.unresponsive,
            calls: self.calls.clone(),
        })
    }
}

/// Answers requests the way a Python kernel would, from a fixed script:
///
/// - `1+1` evaluates to `2`
/// - code containing `buggy` raises a `SyntaxError`
/// - `print_abc` prints `a`, `b` and `c` as three stream messages
/// - code containing `noisy` is surrounded by traffic from another client
/// - code containing `expensive` prints partial output and never finishes
/// - `hangup` closes the broadcast channel
/// - anything else prints `hello`
pub struct MockTransport {
    broadcasts: mpsc::UnboundedReceiver<Message>,
    kernel: Option<mpsc::UnboundedSender<Message>>,
    replies: VecDeque<Message>,
    execution_count: u32,
    unresponsive: bool,
    calls: Arc<Mutex<Calls>>,
}

impl MockTransport {
    fn publish(&self, messages: Vec<Message>) {
        if let Some(kernel) = &self.kernel {
            for message in messages {
                let _ = kernel.send(message);
            }
        }
    }

    fn handle_kernel_info(&mut self, parent: &Header) {
        self.calls.lock().unwrap().kernel_info_requests += 1;

        if self.unresponsive {
            return;
        }

        self.replies.push_back(Message::new(
            Header::new("kernel_info_reply", "kernel", "kernel"),
            Some(parent.clone()),
            json!({
                "status": "ok",
                "implementation": "ipython",
                "implementation_version": "8.12.0",
                "banner": "Python 3.11",
                "language_info": { "name": "python", "version": "3.11.4" },
            }),
        ));

        // The handshake leaves its own busy/idle pair on the broadcast channel.
        self.publish(vec![status(parent, "busy"), status(parent, "idle")]);
    }

    fn handle_execute(&mut self, parent: &Header, code: &str) {
        self.calls.lock().unwrap().executions.push(code.to_string());
        self.execution_count += 1;
        let count = self.execution_count;

        if code == "hangup" {
            self.kernel = None;
            return;
        }

        let mut messages = vec![status(parent, "busy"), input(parent, code, count)];

        if code == "1+1" {
            messages.push(result(parent, "2", count));
        } else if code.contains("buggy") {
            messages.push(error(
                parent,
                "SyntaxError",
                "invalid syntax",
                &["\u{1b}[0;31mSyntaxError\u{1b}[0m: invalid syntax"],
            ));
        } else if code == "print_abc" {
            messages.push(stream(parent, "a"));
            messages.push(stream(parent, "b"));
            messages.push(stream(parent, "c"));
        } else if code.contains("expensive") {
            messages.push(stream(parent, "Partial output..."));
            self.publish(messages);
            return;
        } else {
            messages.push(stream(parent, "hello"));
        }

        if code.contains("noisy") {
            let other = Header::new("execute_request", "other-client", "someone");
            messages.insert(0, status(&other, "busy"));
            messages.insert(1, broadcast(&other, "comm_msg", json!({ "comm_id": "x" })));
            messages.insert(2, stream(&other, "not mine"));
            messages.insert(3, status(&other, "idle"));
        }

        messages.push(status(parent, "idle"));
        self.publish(messages);

        self.replies.push_back(Message::new(
            Header::new("execute_reply", "kernel", "kernel"),
            Some(parent.clone()),
            json!({ "status": "ok", "execution_count": count }),
        ));
    }
}

#[async_trait]
impl BroadcastSource for MockTransport {
    async fn recv_broadcast(&mut self) -> Result<Message, TransportError> {
        self.broadcasts.recv_broadcast().await
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, request: Request) -> Result<MessageId, TransportError> {
        let header = Header::new(request.msg_type(), "client", "user");

        match &request {
            Request::KernelInfo => self.handle_kernel_info(&header),
            Request::Execute { code } => self.handle_execute(&header, code),
            Request::Shutdown { .. } => self.calls.lock().unwrap().shutdown_requests += 1,
        }

        Ok(header.msg_id)
    }

    async fn recv_reply(&mut self) -> Result<Message, TransportError> {
        match self.replies.pop_front() {
            Some(reply) => Ok(reply),
            None => std::future::pending().await,
        }
    }

    fn discard_replies(&mut self) -> usize {
        let discarded = self.replies.len();
        self.replies.clear();
        self.calls.lock().unwrap().discarded_replies += discarded;
        discarded
    }

    async fn close(&mut self) {
        self.calls.lock().unwrap().closed += 1;
        self.broadcasts.close();
    }
}
