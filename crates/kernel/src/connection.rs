use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pattern used when attaching without naming a kernel.
pub const DEFAULT_HINT: &str = "kernel-*.json";

/// Contents of a kernel connection file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub ip: String,
    pub transport: String,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub key: String,
    pub signature_scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no connection file matches `{hint}`")]
    NotFound { hint: String },
    #[error("invalid connection file pattern `{0}`")]
    Pattern(String),
    #[error("could not read connection file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed connection file {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConnectionInfo {
    pub fn endpoint(&self, port: u16) -> String {
        match self.transport.as_str() {
            "ipc" => format!("ipc://{}-{}", self.ip, port),
            transport => format!("{}://{}:{}", transport, self.ip, port),
        }
    }

    pub fn shell_endpoint(&self) -> String {
        self.endpoint(self.shell_port)
    }

    pub fn iopub_endpoint(&self) -> String {
        self.endpoint(self.iopub_port)
    }

    pub fn control_endpoint(&self) -> String {
        self.endpoint(self.control_port)
    }

    pub fn read(path: &Path) -> Result<Self, DiscoveryError> {
        let raw = fs::read(path).map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_slice(&raw).map_err(|source| DiscoveryError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Finds the connection file a hint refers to.
///
/// A hint naming an existing file is used as is. Otherwise it is looked up in
/// `runtime_dir`, first literally and then as a glob pattern; a hint without
/// `*` matches any file name containing it. When several files match, the most
/// recently modified one wins.
pub fn find_connection_file(hint: &str, runtime_dir: &Path) -> Result<PathBuf, DiscoveryError> {
    let direct = Path::new(hint);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    let in_runtime_dir = runtime_dir.join(hint);
    if in_runtime_dir.is_file() {
        return Ok(in_runtime_dir);
    }

    let pattern = if hint.contains('*') {
        hint.to_string()
    } else {
        format!("*{hint}*")
    };
    let full_pattern = runtime_dir.join(&pattern);
    let full_pattern = full_pattern.to_string_lossy();

    let paths =
        glob::glob(&full_pattern).map_err(|_| DiscoveryError::Pattern(pattern.clone()))?;

    paths
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .max_by_key(|path| modified(path))
        .ok_or_else(|| DiscoveryError::NotFound {
            hint: hint.to_string(),
        })
}

fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Directory where kernels write their connection files.
pub fn default_runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("JUPYTER_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(target_os = "macos") {
        if let Some(home) = dirs::home_dir() {
            return home.join("Library").join("Jupyter").join("runtime");
        }
    }

    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("jupyter")
        .join("runtime")
}
