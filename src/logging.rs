use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use thiserror::Error;
use tracing::Dispatch;
use tracing_subscriber::{filter::ParseError, fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("invalid log filter")]
    Filter(#[from] ParseError),
    #[error("could not open log file {path}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Builds the subscriber for one plugin instance.
///
/// The editor owns the process, so nothing is installed globally. Callers
/// scope their work with `WithSubscriber::with_subscriber`.
pub fn dispatch(config: &LogConfig) -> Result<Dispatch, LogError> {
    let filter = EnvFilter::try_new(&config.level)?;

    let dispatch = match &config.file {
        Some(path) => {
            let file = open(path).map_err(|source| LogError::File {
                path: path.clone(),
                source,
            })?;

            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));

            Dispatch::new(tracing_subscriber::registry().with(filter).with(layer))
        }
        None => {
            let layer = fmt::layer().with_target(true).with_writer(io::stderr);

            Dispatch::new(tracing_subscriber::registry().with(filter).with(layer))
        }
    };

    Ok(dispatch)
}

fn open(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    OpenOptions::new().create(true).append(true).open(path)
}
