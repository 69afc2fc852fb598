use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::connection::default_runtime_dir;

/// Placeholder replaced by the connection file path in `kernel_command`.
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Settings a [`KernelSession`](crate::KernelSession) is constructed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Command line that starts a new kernel.
    pub kernel_command: Vec<String>,
    /// Where connection files are looked up and written. Defaults to the
    /// Jupyter runtime directory.
    pub runtime_dir: Option<PathBuf>,
    /// How long a kernel may take to answer the kernel info handshake.
    #[serde(with = "seconds")]
    pub startup_timeout: Duration,
    /// Name sent in message headers.
    pub username: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kernel_command: ["python3", "-m", "ipykernel_launcher", "-f", CONNECTION_FILE_PLACEHOLDER]
                .map(String::from)
                .to_vec(),
            runtime_dir: None,
            startup_timeout: Duration::from_secs(30),
            username: std::env::var("USER").unwrap_or_else(|_| "kernlink".to_string()),
        }
    }
}

impl SessionConfig {
    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir.clone().unwrap_or_else(default_runtime_dir)
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
