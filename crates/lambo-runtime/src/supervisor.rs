use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::config::RuntimeConfig;
use crate::error::LaunchError;
use crate::runtime_api::RuntimeApi;

/// Address of the Runtime API, as read by the function's runtime client.
pub const ENV_RUNTIME_API: &str = "AWS_LAMBDA_RUNTIME_API";
/// Legacy RPC port. Forced empty so the function polls instead.
pub const ENV_LEGACY_RPC_PORT: &str = "_LAMBDA_SERVER_PORT";

/// What to run and how.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub path: PathBuf,
    /// Defaults to the directory containing the executable.
    pub working_dir: Option<PathBuf>,
    pub args: Vec<String>,
    /// Extra environment on top of the inherited one. The Runtime API
    /// variables always win over these.
    pub env: Vec<(String, String)>,
}

impl LaunchOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Owns the function process and the Runtime API it talks to.
///
/// The process is started once and never restarted. Closing the supervisor
/// stops the Runtime API but leaves the process running.
pub struct Supervisor {
    addr: SocketAddr,
    child_id: Option<u32>,
    broker: Arc<Broker>,
    shutdown: CancellationToken,
    server: Option<JoinHandle<std::io::Result<()>>>,
    abandon_on_close: bool,
}

impl Supervisor {
    /// Validate the executable, open the Runtime API listener and start the
    /// function pointed at it.
    pub async fn launch(
        options: LaunchOptions,
        broker: Arc<Broker>,
        config: &RuntimeConfig,
    ) -> Result<Self, LaunchError> {
        let executable = validate_executable(&options.path).await?;
        let working_dir = options
            .working_dir
            .clone()
            .or_else(|| executable.parent().map(Path::to_path_buf));

        tracing::info!(path = %executable.display(), "Function located");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(LaunchError::Bind)?;
        let addr = listener.local_addr().map_err(LaunchError::Bind)?;
        tracing::info!(%addr, "Runtime API listening");

        let mut command = Command::new(&executable);
        command
            .args(&options.args)
            .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(ENV_RUNTIME_API, addr.to_string())
            .env(ENV_LEGACY_RPC_PORT, "");
        if let Some(dir) = &working_dir {
            tracing::info!(dir = %dir.display(), "Working directory set");
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            path: executable.clone(),
            source,
        })?;
        let child_id = child.id();
        tracing::info!(pid = ?child_id, "Function launched");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::warn!(%status, "Function process exited"),
                Err(e) => tracing::warn!(error = %e, "Lost track of function process"),
            }
        });

        let function_name = config.function_name.clone().unwrap_or_else(|| {
            executable
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "function".into())
        });

        let shutdown = CancellationToken::new();
        let api = RuntimeApi::new(broker.clone(), config, &function_name, shutdown.clone());
        let server = tokio::spawn(api.serve(listener));

        Ok(Self {
            addr,
            child_id,
            broker,
            shutdown,
            server: Some(server),
            abandon_on_close: config.abandon_on_close,
        })
    }

    /// The address handed to the function in `AWS_LAMBDA_RUNTIME_API`.
    pub fn runtime_api_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn child_id(&self) -> Option<u32> {
        self.child_id
    }

    /// Stop the Runtime API and wait for it to finish.
    ///
    /// Outstanding invocations are released with `Abandoned` when
    /// `abandon_on_close` is set; otherwise their callers stay suspended.
    pub async fn close(&mut self) -> Result<(), LaunchError> {
        tracing::info!("Stopping runtime API");
        self.shutdown.cancel();

        let result = match self.server.take() {
            Some(server) => match server.await {
                Ok(result) => result.map_err(LaunchError::Server),
                Err(e) => Err(LaunchError::Server(std::io::Error::other(e))),
            },
            None => Ok(()),
        };

        if self.abandon_on_close {
            let abandoned = self.broker.abandon_outstanding();
            if abandoned > 0 {
                tracing::warn!(abandoned, "Released invocations left without a result");
            }
        }
        result
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Resolve `path` to an absolute location and check it is an executable file.
pub async fn validate_executable(path: &Path) -> Result<PathBuf, LaunchError> {
    let absolute = std::path::absolute(path).map_err(|source| LaunchError::Resolve {
        path: path.to_path_buf(),
        source,
    })?;

    let metadata = match tokio::fs::metadata(&absolute).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LaunchError::NotFound(absolute));
        }
        Err(source) => {
            return Err(LaunchError::Stat {
                path: absolute,
                source,
            });
        }
    };

    if metadata.is_dir() {
        return Err(LaunchError::IsDirectory(absolute));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(LaunchError::NotExecutable(absolute));
        }
    }

    Ok(absolute)
}
