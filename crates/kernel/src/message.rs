use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MessageId;

pub const PROTOCOL_VERSION: &str = "5.3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: MessageId,
    pub session: String,
    pub username: String,
    pub date: String,
    pub msg_type: String,
    pub version: String,
}

impl Header {
    pub fn new(msg_type: &str, session: &str, username: &str) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            session: session.to_string(),
            username: username.to_string(),
            date: chrono::Utc::now().to_rfc3339(),
            msg_type: msg_type.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// A decoded protocol message, without routing identities or binary buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub parent_header: Option<Header>,
    pub metadata: Value,
    pub content: Value,
}

impl Message {
    pub fn new(header: Header, parent_header: Option<Header>, content: Value) -> Self {
        Self {
            header,
            parent_header,
            metadata: Value::Object(Default::default()),
            content,
        }
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// Id of the request that produced this message, if any.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_header.as_ref().map(|h| h.msg_id.as_str())
    }

    pub fn is_child_of(&self, request_id: &str) -> bool {
        self.parent_id() == Some(request_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Starting,
    Busy,
    Idle,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteInput {
    pub code: String,
    #[serde(default)]
    pub execution_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub execution_count: Option<u32>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

impl ExecuteResult {
    /// The `text/plain` representation, which every kernel is expected to send.
    pub fn text(&self) -> Option<&str> {
        self.data.get("text/plain").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamOutput {
    pub name: StreamName,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorOutput {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

/// One output fragment produced by an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Input(ExecuteInput),
    Result(ExecuteResult),
    Stream(StreamOutput),
    Error(ErrorOutput),
}

/// A broadcast message of a recognized kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Broadcast {
    Output(Output),
    Status(ExecutionState),
}

#[derive(Deserialize)]
struct StatusContent {
    execution_state: ExecutionState,
}

impl Broadcast {
    /// Returns `None` for kinds the client does not care about and for
    /// recognized kinds whose content does not parse.
    pub fn parse(message: &Message) -> Option<Self> {
        let content = message.content.clone();

        let parsed = match message.msg_type() {
            "execute_input" => serde_json::from_value(content).map(Output::Input).map(Self::Output),
            "execute_result" => {
                serde_json::from_value(content).map(Output::Result).map(Self::Output)
            }
            "stream" => serde_json::from_value(content).map(Output::Stream).map(Self::Output),
            "error" => serde_json::from_value(content).map(Output::Error).map(Self::Output),
            "status" => serde_json::from_value::<StatusContent>(content)
                .map(|status| Self::Status(status.execution_state)),
            _ => return None,
        };

        match parsed {
            Ok(broadcast) => Some(broadcast),
            Err(e) => {
                tracing::debug!(msg_type = message.msg_type(), error = %e, "malformed broadcast");
                None
            }
        }
    }
}

/// Everything one execution produced, one slot per output kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub input: Option<ExecuteInput>,
    pub value: Option<ExecuteResult>,
    pub stream: Option<StreamOutput>,
    pub error: Option<ErrorOutput>,
}

impl ExecutionResult {
    /// Stream text accumulates in arrival order; every other kind replaces
    /// the previous fragment of the same kind.
    pub fn merge(&mut self, output: Output) {
        match output {
            Output::Input(input) => self.input = Some(input),
            Output::Result(value) => self.value = Some(value),
            Output::Stream(stream) => match self.stream.as_mut() {
                Some(existing) => {
                    existing.name = stream.name;
                    existing.text.push_str(&stream.text);
                }
                None => self.stream = Some(stream),
            },
            Output::Error(error) => self.error = Some(error),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.value.is_none() && self.stream.is_none() && self.error.is_none()
    }
}
