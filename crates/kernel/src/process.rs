use std::{
    fs, io,
    net::{Ipv4Addr, TcpListener},
    path::{Path, PathBuf},
    process::Stdio,
};

use thiserror::Error;
use tokio::process::{Child, Command};

use crate::{
    config::{SessionConfig, CONNECTION_FILE_PLACEHOLDER},
    connection::ConnectionInfo,
};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("kernel command is empty")]
    EmptyCommand,
    #[error("could not allocate kernel ports")]
    Ports(#[source] io::Error),
    #[error("could not write connection file {path}")]
    ConnectionFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not start kernel `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("could not stop kernel")]
    Terminate(#[source] io::Error),
}

/// A kernel process started by this client.
#[derive(Debug)]
pub struct KernelProcess {
    child: Child,
    connection_file: PathBuf,
}

impl KernelProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn connection_file(&self) -> &Path {
        &self.connection_file
    }

    /// Kills the process, waits for it to exit and removes its connection file.
    pub async fn terminate(mut self) -> Result<(), LaunchError> {
        if self.child.try_wait().map_err(LaunchError::Terminate)?.is_none() {
            self.child.kill().await.map_err(LaunchError::Terminate)?;
        }

        if let Err(e) = fs::remove_file(&self.connection_file) {
            tracing::debug!(path = %self.connection_file.display(), error = %e, "connection file not removed");
        }

        Ok(())
    }
}

/// Writes a fresh connection file and starts the configured kernel command on it.
pub async fn spawn(config: &SessionConfig) -> Result<(ConnectionInfo, KernelProcess), LaunchError> {
    let (program, args) = config
        .kernel_command
        .split_first()
        .ok_or(LaunchError::EmptyCommand)?;

    let info = allocate_connection()?;

    let runtime_dir = config.runtime_dir();
    let connection_file = runtime_dir.join(format!("kernel-{}.json", uuid::Uuid::new_v4()));
    write_connection_file(&connection_file, &info)?;

    let file_arg = connection_file.to_string_lossy();
    let args = args
        .iter()
        .map(|arg| arg.replace(CONNECTION_FILE_PLACEHOLDER, &file_arg));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| {
            let _ = fs::remove_file(&connection_file);
            LaunchError::Spawn {
                command: config.kernel_command.join(" "),
                source,
            }
        })?;

    tracing::info!(pid = ?child.id(), file = %connection_file.display(), "kernel started");

    Ok((
        info,
        KernelProcess {
            child,
            connection_file,
        },
    ))
}

fn allocate_connection() -> Result<ConnectionInfo, LaunchError> {
    // All listeners stay open until every port is known, so no port is handed out twice.
    let listeners = (0..5)
        .map(|_| TcpListener::bind((Ipv4Addr::LOCALHOST, 0)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(LaunchError::Ports)?;
    let ports = listeners
        .iter()
        .map(|listener| listener.local_addr().map(|addr| addr.port()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(LaunchError::Ports)?;

    Ok(ConnectionInfo {
        ip: Ipv4Addr::LOCALHOST.to_string(),
        transport: "tcp".to_string(),
        shell_port: ports[0],
        iopub_port: ports[1],
        stdin_port: ports[2],
        control_port: ports[3],
        hb_port: ports[4],
        key: uuid::Uuid::new_v4().to_string(),
        signature_scheme: "hmac-sha256".to_string(),
        kernel_name: None,
    })
}

fn write_connection_file(path: &Path, info: &ConnectionInfo) -> Result<(), LaunchError> {
    let write = || -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(info).map_err(io::Error::other)?;
        fs::write(path, json)
    };

    write().map_err(|source| LaunchError::ConnectionFile {
        path: path.to_path_buf(),
        source,
    })
}
