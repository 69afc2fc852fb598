//! The commands an editor exposes to its user.
//!
//! `JKernel [-e|--existing [FILEHINT]]` starts or attaches to a kernel and
//! `[range]JExecute` runs the selected code. The host translates its own
//! command invocations into calls on [`Commands`] and shows whatever reaches
//! its [`DisplaySink`].

use std::{error::Error as StdError, iter};

use async_trait::async_trait;
use clap::{error::ErrorKind, Parser};
use kernlink_document::{extract, format, DisplayBlock, Selection};
use kernlink_kernel::{
    connection::DEFAULT_HINT, ConnectOutcome, KernelProvider, KernelSession, LocalProvider,
    SessionConfig, SessionError,
};
use tokio_util::sync::CancellationToken;
use tracing::{instrument::WithSubscriber, Dispatch};

use crate::{
    config::Config,
    logging::{self, LogError},
};

pub const CONNECT_COMMAND: &str = "JKernel";
pub const EXECUTE_COMMAND: &str = "JExecute";

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = CONNECT_COMMAND, about = "Start or attach to a Jupyter kernel")]
pub struct ConnectArgs {
    /// Attach to a running kernel whose connection file matches FILEHINT.
    #[arg(
        short = 'e',
        long,
        value_name = "FILEHINT",
        num_args = 0..=1,
        default_missing_value = DEFAULT_HINT
    )]
    pub existing: Option<String>,
}

impl ConnectArgs {
    /// Parses the arguments the user typed after the command name.
    pub fn parse_args<I, S>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = iter::once(CONNECT_COMMAND.to_string()).chain(args.into_iter().map(Into::into));
        Self::try_parse_from(args)
    }
}

/// Where the editor shows results and messages.
pub trait DisplaySink: Send {
    fn blocks(&mut self, blocks: &[DisplayBlock]);
    fn status(&mut self, line: &str);
    fn warning(&mut self, line: &str);
    fn error(&mut self, line: &str);
}

#[async_trait]
pub trait Commands: Send {
    async fn connect(&mut self, args: &[String], sink: &mut dyn DisplaySink);

    /// Runs the code `selection` picks out of `lines`. Cancelling `cancel`
    /// stops waiting for output; the kernel keeps running the code.
    async fn execute(
        &mut self,
        lines: &[String],
        selection: Selection,
        cancel: &CancellationToken,
        sink: &mut dyn DisplaySink,
    );

    async fn shutdown(&mut self, sink: &mut dyn DisplaySink);
}

/// One editor's connection to a kernel.
pub struct Plugin<P: KernelProvider> {
    session: KernelSession<P>,
    dispatch: Dispatch,
}

impl Plugin<LocalProvider> {
    /// A plugin for kernels on this machine.
    pub fn local(config: &Config) -> Result<Self, LogError> {
        Self::new(LocalProvider::new(config.session.clone()), config)
    }
}

impl<P: KernelProvider> Plugin<P> {
    pub fn new(provider: P, config: &Config) -> Result<Self, LogError> {
        let dispatch = logging::dispatch(&config.log)?;
        Ok(Self::with_dispatch(provider, config.session.clone(), dispatch))
    }

    pub fn with_dispatch(provider: P, config: SessionConfig, dispatch: Dispatch) -> Self {
        Self {
            session: KernelSession::new(provider, config),
            dispatch,
        }
    }

    pub fn session(&self) -> &KernelSession<P> {
        &self.session
    }

    async fn run_connect(&mut self, args: &[String], sink: &mut dyn DisplaySink) {
        let args = match ConnectArgs::parse_args(args) {
            Ok(args) => args,
            Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                for line in err.to_string().lines() {
                    sink.status(line);
                }
                return;
            }
            Err(err) => {
                let reason = err.to_string();
                let reason = reason.lines().next().unwrap_or_default();
                sink.error(&format!("{CONNECT_COMMAND}: {reason}"));
                return;
            }
        };

        match self.session.connect(args.existing.as_deref()).await {
            Ok(ConnectOutcome::Established { owned }) => {
                tracing::info!(owned, "kernel ready");
                if let Some(info) = self.session.kernel_info() {
                    sink.status(&info.to_string());
                }
            }
            Ok(ConnectOutcome::AlreadyConnected) => {
                tracing::debug!("already connected");
            }
            Err(SessionError::ConnectionNotFound { hint }) => {
                tracing::warn!(hint, "no connection file");
                sink.warning(&format!(
                    "{CONNECT_COMMAND}: Could not find connection file. Not connected!"
                ));
            }
            Err(err) => report(sink, CONNECT_COMMAND, &err),
        }
    }

    async fn run_execute(
        &mut self,
        lines: &[String],
        selection: Selection,
        cancel: &CancellationToken,
        sink: &mut dyn DisplaySink,
    ) {
        let code = extract(lines, &selection);
        if code.trim().is_empty() {
            tracing::debug!(?selection, "nothing to execute");
            return;
        }

        let request_id = match self.session.execute(&code).await {
            Ok(id) => id,
            Err(err) => return report(sink, EXECUTE_COMMAND, &err),
        };

        match self.session.collect(&request_id, cancel).await {
            Ok(result) => sink.blocks(&format(&result)),
            Err(SessionError::Cancelled) => {
                sink.status(&format!("{EXECUTE_COMMAND}: stopped waiting for output"));
            }
            Err(err) => report(sink, EXECUTE_COMMAND, &err),
        }
    }

    async fn run_shutdown(&mut self, sink: &mut dyn DisplaySink) {
        if let Err(err) = self.session.shutdown().await {
            report(sink, "shutdown", &err);
        }
    }
}

#[async_trait]
impl<P: KernelProvider> Commands for Plugin<P> {
    async fn connect(&mut self, args: &[String], sink: &mut dyn DisplaySink) {
        let dispatch = self.dispatch.clone();
        self.run_connect(args, sink).with_subscriber(dispatch).await
    }

    async fn execute(
        &mut self,
        lines: &[String],
        selection: Selection,
        cancel: &CancellationToken,
        sink: &mut dyn DisplaySink,
    ) {
        let dispatch = self.dispatch.clone();
        self.run_execute(lines, selection, cancel, sink)
            .with_subscriber(dispatch)
            .await
    }

    async fn shutdown(&mut self, sink: &mut dyn DisplaySink) {
        let dispatch = self.dispatch.clone();
        self.run_shutdown(sink).with_subscriber(dispatch).await
    }
}

fn report(sink: &mut dyn DisplaySink, command: &str, err: &SessionError) {
    tracing::error!(command, error = %describe(err), "command failed");
    sink.error(&format!("{command}: {}", describe(err)));
}

/// The error and its sources on one line.
fn describe(err: &dyn StdError) -> String {
    let mut line = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        line.push_str(": ");
        line.push_str(&cause.to_string());
        source = cause.source();
    }

    line
}
