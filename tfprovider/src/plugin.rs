//! Launching provider plugins
//!
//! A provider is an ordinary executable. It is started with a magic cookie
//! and the list of protocol versions the client speaks, then announces on
//! its first line of stdout where it is listening:
//!
//! ```text
//! CORE-VERSION|APP-VERSION|NETWORK|ADDRESS|PROTOCOL
//! 1|6|tcp|127.0.0.1:1234|grpc
//! ```

use crate::context::Context;
use crate::error::{Result, TfproviderError};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tonic::transport::{Channel, Endpoint};

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

const CORE_PROTOCOL_VERSION: &str = "1";
const PLUGIN_LOG_TARGET: &str = "tfprovider::plugin";

/// How to start a provider plugin
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Path to the provider executable
    pub executable: PathBuf,
    /// Extra command line arguments
    pub args: Vec<OsString>,
    /// Extra environment variables for the plugin process
    pub env: Vec<(OsString, OsString)>,
    /// How long to wait for the plugin to announce its address
    pub handshake_timeout: Duration,
    /// Maximum gRPC message size in bytes, in both directions
    pub max_message_size: usize,
    /// Ports the plugin may listen on, inclusive
    pub port_range: Option<(u16, u16)>,
    /// Protocol major versions offered to the plugin
    pub protocol_versions: Vec<u32>,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl LaunchConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: Vec::new(),
            handshake_timeout: Duration::from_secs(60),
            max_message_size: 256 << 20, // 256MB
            port_range: None,
            protocol_versions: vec![5, 6],
            magic_cookie_key: MAGIC_COOKIE_KEY.to_string(),
            magic_cookie_value: MAGIC_COOKIE_VALUE.to_string(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_port_range(mut self, min: u16, max: u16) -> Self {
        self.port_range = Some((min, max));
        self
    }

    pub fn with_protocol_versions(mut self, versions: impl IntoIterator<Item = u32>) -> Self {
        self.protocol_versions = versions.into_iter().collect();
        self
    }

    fn protocol_versions_env(&self) -> String {
        self.protocol_versions
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PluginAddress {
    Tcp(String),
    Unix(PathBuf),
}

/// What the plugin announced on startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Handshake {
    pub protocol_version: u32,
    pub address: PluginAddress,
}

pub(crate) fn parse_handshake(line: &str) -> Result<Handshake> {
    let line = line.trim();
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 4 {
        return Err(TfproviderError::Handshake(format!(
            "unrecognised handshake line {line:?}; the executable is probably not a provider plugin"
        )));
    }

    if parts[0] != CORE_PROTOCOL_VERSION {
        return Err(TfproviderError::Handshake(format!(
            "unsupported core protocol version {:?}",
            parts[0]
        )));
    }

    let protocol_version = parts[1].parse::<u32>().map_err(|_| {
        TfproviderError::Handshake(format!("invalid protocol version {:?}", parts[1]))
    })?;

    let address = match parts[2] {
        "tcp" => PluginAddress::Tcp(parts[3].to_string()),
        "unix" => PluginAddress::Unix(PathBuf::from(parts[3])),
        other => {
            return Err(TfproviderError::Handshake(format!(
                "unsupported network type {other:?}"
            )))
        }
    };

    match parts.get(4) {
        Some(&"grpc") => {}
        Some(other) => {
            return Err(TfproviderError::Handshake(format!(
                "unsupported plugin protocol {other:?}"
            )))
        }
        None => {
            return Err(TfproviderError::Handshake(
                "plugin did not announce a protocol; only grpc is supported".to_string(),
            ))
        }
    }

    if parts.get(5).is_some_and(|cert| !cert.is_empty()) {
        return Err(TfproviderError::Handshake(
            "plugin requested a TLS connection, which is not supported".to_string(),
        ));
    }

    Ok(Handshake {
        protocol_version,
        address,
    })
}

/// A running plugin process
#[derive(Debug)]
pub(crate) struct PluginProcess {
    child: Child,
    executable: PathBuf,
}

impl PluginProcess {
    pub async fn kill(&mut self) -> Result<()> {
        tracing::info!(executable = %self.executable.display(), "stopping provider plugin");
        match self.child.kill().await {
            Ok(()) => Ok(()),
            // Already exited.
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub(crate) struct LaunchedPlugin {
    pub process: PluginProcess,
    pub protocol_version: u32,
    pub channel: Channel,
}

fn forward_output<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    tokio::spawn(async move {
        while let Some(Ok(line)) = lines.next().await {
            tracing::debug!(target: PLUGIN_LOG_TARGET, stream, "{line}");
        }
    });
}

/// Starts the plugin, waits for its handshake and connects to it.
///
/// The child is killed if this fails part way, or whenever the returned
/// process handle is dropped.
pub(crate) async fn launch(ctx: &Context, config: &LaunchConfig) -> Result<LaunchedPlugin> {
    tracing::info!(
        executable = %config.executable.display(),
        versions = %config.protocol_versions_env(),
        "launching provider plugin"
    );

    let mut command = Command::new(&config.executable);
    command
        .args(&config.args)
        .env(&config.magic_cookie_key, &config.magic_cookie_value)
        .env("PLUGIN_PROTOCOL_VERSIONS", config.protocol_versions_env())
        .envs(config.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some((min, max)) = config.port_range {
        command
            .env("PLUGIN_MIN_PORT", min.to_string())
            .env("PLUGIN_MAX_PORT", max.to_string());
    }

    let mut child = command.spawn().map_err(TfproviderError::Launch)?;

    if let Some(stderr) = child.stderr.take() {
        forward_output(stderr, "stderr");
    }
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TfproviderError::Handshake("plugin stdout is not available".to_string()))?;
    let mut stdout = BufReader::new(stdout).lines();

    let first_line = tokio::select! {
        line = tokio::time::timeout(config.handshake_timeout, stdout.next_line()) => match line {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                return Err(TfproviderError::Handshake(
                    "plugin exited before completing the handshake".to_string(),
                ))
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                return Err(TfproviderError::Handshake(format!(
                    "timed out after {:?} waiting for the plugin handshake",
                    config.handshake_timeout
                )))
            }
        },
        _ = ctx.cancelled() => {
            return Err(TfproviderError::Handshake("cancelled while waiting for the plugin handshake".to_string()))
        }
    };

    let handshake = parse_handshake(&first_line)?;
    if !config.protocol_versions.contains(&handshake.protocol_version) {
        return Err(TfproviderError::UnsupportedVersion(handshake.protocol_version));
    }
    tracing::debug!(
        version = handshake.protocol_version,
        address = ?handshake.address,
        "provider plugin handshake complete"
    );

    forward_output(stdout.into_inner(), "stdout");

    let channel = connect(&handshake.address).await?;

    Ok(LaunchedPlugin {
        process: PluginProcess {
            child,
            executable: config.executable.clone(),
        },
        protocol_version: handshake.protocol_version,
        channel,
    })
}

async fn connect(address: &PluginAddress) -> Result<Channel> {
    match address {
        PluginAddress::Tcp(addr) => {
            let channel = Endpoint::from_shared(format!("http://{addr}"))?
                .connect()
                .await?;
            Ok(channel)
        }
        PluginAddress::Unix(path) => connect_unix(path.clone()).await,
    }
}

#[cfg(unix)]
async fn connect_unix(path: PathBuf) -> Result<Channel> {
    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;
    use tonic::transport::Uri;
    use tower::service_fn;

    // The URI is ignored by the connector; it only has to parse.
    let channel = Endpoint::try_from("http://[::]:50051")?
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
        }))
        .await?;
    Ok(channel)
}

#[cfg(not(unix))]
async fn connect_unix(path: PathBuf) -> Result<Channel> {
    Err(TfproviderError::Handshake(format!(
        "unix socket {} is not supported on this platform",
        path.display()
    )))
}
