//! Runs code from an editor buffer on a Jupyter kernel.
//!
//! The editor host registers the [`Commands`] of a [`Plugin`] under its own
//! command names and hands results to a [`DisplaySink`].

pub mod config;
pub mod host;
pub mod logging;
pub mod render;

pub use config::{Config, ConfigError, LogConfig};
pub use host::{Commands, ConnectArgs, DisplaySink, Plugin};
pub use kernlink_document as document;
pub use kernlink_kernel as kernel;
