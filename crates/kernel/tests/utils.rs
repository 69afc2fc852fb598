#![allow(dead_code)]

use kernlink_kernel::{Header, Message};
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub fn request(msg_type: &str) -> Header {
    Header::new(msg_type, "client", "user")
}

pub fn broadcast(parent: &Header, msg_type: &str, content: Value) -> Message {
    Message::new(
        Header::new(msg_type, "kernel", "kernel"),
        Some(parent.clone()),
        content,
    )
}

pub fn status(parent: &Header, state: &str) -> Message {
    broadcast(parent, "status", json!({ "execution_state": state }))
}

pub fn input(parent: &Header, code: &str, count: u32) -> Message {
    broadcast(
        parent,
        "execute_input",
        json!({ "code": code, "execution_count": count }),
    )
}

pub fn stream(parent: &Header, text: &str) -> Message {
    broadcast(parent, "stream", json!({ "name": "stdout", "text": text }))
}

pub fn result(parent: &Header, text: &str, count: u32) -> Message {
    broadcast(
        parent,
        "execute_result",
        json!({ "execution_count": count, "data": { "text/plain": text }, "metadata": {} }),
    )
}

pub fn error(parent: &Header, ename: &str, evalue: &str, traceback: &[&str]) -> Message {
    broadcast(
        parent,
        "error",
        json!({ "ename": ename, "evalue": evalue, "traceback": traceback }),
    )
}

/// A broadcast stream fed with `messages`, still open for more.
pub fn feed(
    messages: Vec<Message>,
) -> (
    mpsc::UnboundedSender<Message>,
    mpsc::UnboundedReceiver<Message>,
) {
    let (sender, receiver) = mpsc::unbounded_channel();
    for message in messages {
        sender.send(message).unwrap();
    }
    (sender, receiver)
}
