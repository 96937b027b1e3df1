//! Error types for tfprovider
//!
//! Only starting a provider can fail outright. Everything that happens after
//! a provider is running is reported through [`Diagnostics`] instead.

use crate::diagnostics::Diagnostics;
use crate::schema::SchemaError;

/// Error type for launching and constructing a provider
#[derive(Debug, thiserror::Error)]
pub enum TfproviderError {
    #[error("failed to launch provider plugin: {0}")]
    Launch(#[source] std::io::Error),

    #[error("provider plugin handshake failed: {0}")]
    Handshake(String),

    /// The plugin negotiated a protocol version the client never offered.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("failed to connect to provider plugin: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("failed to retrieve provider schema: {0}")]
    Schema(Diagnostics),

    #[error("provider returned an invalid schema: {0}")]
    SchemaTranslation(#[from] SchemaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tfprovider operations
pub type Result<T> = std::result::Result<T, TfproviderError>;

/// Failure of a single RPC call.
///
/// Never returned to callers directly; it is turned into exactly one error
/// diagnostic by [`crate::diagnostics::rpc_error_diagnostics`].
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("call cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("{0}")]
    Status(Box<tonic::Status>),
}

impl From<tonic::Status> for CallError {
    fn from(status: tonic::Status) -> Self {
        CallError::Status(Box::new(status))
    }
}
