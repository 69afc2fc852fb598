pub mod config;
pub mod connection;
pub mod correlator;
pub mod message;
pub mod process;
pub mod provider;
pub mod session;
pub mod transport;
pub mod wire;

pub use config::SessionConfig;
pub use connection::{ConnectionInfo, DiscoveryError};
pub use correlator::{Correlator, CorrelatorState};
pub use message::{
    Broadcast, ErrorOutput, ExecuteInput, ExecuteResult, ExecutionResult, ExecutionState, Header,
    Message, Output, StreamName, StreamOutput,
};
pub use process::{KernelProcess, LaunchError};
pub use provider::{KernelProvider, LocalProvider};
pub use session::{
    ConnectOutcome, KernelInfo, KernelSession, SessionError, SessionState, Violation,
};
pub use transport::{BroadcastSource, Transport, TransportError, ZmqTransport};

/// Identifier of a submitted request, the `msg_id` of its header.
pub type MessageId = String;

/// A request a client can submit to the kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Execute { code: String },
    KernelInfo,
    Shutdown { restart: bool },
}

impl Request {
    pub fn msg_type(&self) -> &'static str {
        match self {
            Request::Execute { .. } => "execute_request",
            Request::KernelInfo => "kernel_info_request",
            Request::Shutdown { .. } => "shutdown_request",
        }
    }

    pub fn content(&self) -> serde_json::Value {
        match self {
            Request::Execute { code } => serde_json::json!({
                "code": code,
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": false,
                "stop_on_error": true,
            }),
            Request::KernelInfo => serde_json::json!({}),
            Request::Shutdown { restart } => serde_json::json!({ "restart": restart }),
        }
    }
}
