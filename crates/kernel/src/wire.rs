//! Jupyter wire protocol framing.
//!
//! A message on the wire is a multipart frame sequence:
//!
//! ```text
//! [identities..., "<IDS|MSG>", signature, header, parent_header, metadata, content, buffers...]
//! ```
//!
//! The signature is the hex encoded HMAC of the four JSON frames, using the key
//! and scheme from the connection file. An empty key disables signing.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::message::{Header, Message};

pub const DELIMITER: &[u8] = b"<IDS|MSG>";

#[derive(Error, Debug)]
pub enum WireError {
    #[error("message has no <IDS|MSG> delimiter")]
    MissingDelimiter,
    #[error("message is missing the {0} frame")]
    MissingFrame(&'static str),
    #[error("message signature does not match")]
    BadSignature,
    #[error("unsupported signature scheme {0}")]
    UnsupportedScheme(String),
    #[error("invalid JSON in message frame")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct Codec {
    mac: Option<Hmac<Sha256>>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("signed", &self.mac.is_some())
            .finish()
    }
}

impl Codec {
    pub fn new(key: &str, scheme: &str) -> Result<Self, WireError> {
        if key.is_empty() {
            return Ok(Self { mac: None });
        }

        if scheme != "hmac-sha256" {
            return Err(WireError::UnsupportedScheme(scheme.to_string()));
        }

        // HMAC accepts keys of any length
        let mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
            .map_err(|_| WireError::UnsupportedScheme(scheme.to_string()))?;

        Ok(Self { mac: Some(mac) })
    }

    fn signature(&self, parts: &[&[u8]]) -> Option<Hmac<Sha256>> {
        self.mac.clone().map(|mut mac| {
            for part in parts {
                mac.update(part);
            }
            mac
        })
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<Bytes>, WireError> {
        let header = serde_json::to_vec(&message.header)?;
        let parent_header = match &message.parent_header {
            Some(parent) => serde_json::to_vec(parent)?,
            None => b"{}".to_vec(),
        };
        let metadata = serde_json::to_vec(&message.metadata)?;
        let content = serde_json::to_vec(&message.content)?;

        let signature = self
            .signature(&[&header, &parent_header, &metadata, &content])
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();

        Ok(vec![
            Bytes::from_static(DELIMITER),
            Bytes::from(signature),
            Bytes::from(header),
            Bytes::from(parent_header),
            Bytes::from(metadata),
            Bytes::from(content),
        ])
    }

    pub fn decode(&self, frames: Vec<Bytes>) -> Result<Message, WireError> {
        let delimiter = frames
            .iter()
            .position(|frame| frame.as_ref() == DELIMITER)
            .ok_or(WireError::MissingDelimiter)?;

        let mut rest = frames.into_iter().skip(delimiter + 1);
        let mut next = |name| rest.next().ok_or(WireError::MissingFrame(name));

        let signature = next("signature")?;
        let header = next("header")?;
        let parent_header = next("parent_header")?;
        let metadata = next("metadata")?;
        let content = next("content")?;

        if let Some(mac) = self.signature(&[&header, &parent_header, &metadata, &content]) {
            let expected = hex::decode(&signature).map_err(|_| WireError::BadSignature)?;
            mac.verify_slice(&expected)
                .map_err(|_| WireError::BadSignature)?;
        }

        Ok(Message {
            header: serde_json::from_slice(&header)?,
            parent_header: parse_parent(&parent_header)?,
            metadata: serde_json::from_slice(&metadata)?,
            content: serde_json::from_slice(&content)?,
        })
    }
}

/// Messages with no parent carry an empty object.
fn parse_parent(frame: &[u8]) -> Result<Option<Header>, WireError> {
    let value: Value = serde_json::from_slice(frame)?;
    match value {
        Value::Object(ref map) if map.is_empty() => Ok(None),
        value => Ok(Some(serde_json::from_value(value)?)),
    }
}
