//! tfprovider - Terraform provider plugin client for Rust
//!
//! Starts a Terraform provider plugin as a child process and talks to it
//! over plugin protocol 5 or 6, whichever the plugin prefers.
//!
//! ```no_run
//! # async fn example() -> tfprovider::Result<()> {
//! use tfprovider::{Context, Dynamic};
//!
//! let provider = tfprovider::start("./terraform-provider-example", Vec::<String>::new()).await?;
//! let ctx = Context::new();
//! let (config, diags) = provider
//!     .prepare_config(&ctx, &Dynamic::object([("endpoint", Dynamic::from("https://api"))]))
//!     .await;
//! if !diags.has_errors() {
//!     provider.configure(&ctx, &config).await;
//! }
//! provider.close().await?;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod attribute_type;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod schema;
pub mod types;

// Wire format
pub mod codec;
pub mod proto;

// Client
pub mod plugin;
pub mod provider;
pub mod resource;

mod grpc;
mod protocol;

#[cfg(test)]
mod testing;

pub use attribute_type::AttributeType;
pub use context::Context;
pub use diagnostics::{Diagnostic, DiagnosticOrigin, DiagnosticSeverity, Diagnostics};
pub use error::{Result, TfproviderError};
pub use plugin::LaunchConfig;
pub use protocol::ProtocolVersion;
pub use provider::{Config, Provider};
pub use resource::{
    DataResourceType, ImportedResource, ManagedResourceReadRequest, ManagedResourceReadResponse,
    ManagedResourceType,
};
pub use schema::{Attribute, Block, NestedBlockType, NestingMode, Schema};
pub use types::{AttributePath, AttributePathStep, Dynamic};

use grpc::PluginClient;
use protocol::{PluginProtocol, Protocol5, Protocol6};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

/// Starts the provider plugin at `executable` with default settings.
pub async fn start<I, S>(executable: impl Into<PathBuf>, args: I) -> Result<Provider>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let config = LaunchConfig::new(executable).with_args(args);
    start_with_config(&Context::new(), config).await
}

/// Starts a provider plugin and loads its schema.
///
/// The plugin picks the protocol version from those offered in `config`.
/// On any error the plugin process is stopped again.
pub async fn start_with_config(ctx: &Context, config: LaunchConfig) -> Result<Provider> {
    let launched = plugin::launch(ctx, &config).await?;
    let mut process = launched.process;

    let client = PluginClient::new(launched.channel, config.max_message_size);
    let protocol: Arc<dyn PluginProtocol> =
        match ProtocolVersion::from_major(launched.protocol_version) {
            Some(ProtocolVersion::V5) => Arc::new(Protocol5::new(client)),
            Some(ProtocolVersion::V6) => Arc::new(Protocol6::new(client)),
            None => {
                if let Err(err) = process.kill().await {
                    tracing::warn!(error = %err, "failed to stop provider plugin");
                }
                return Err(TfproviderError::UnsupportedVersion(launched.protocol_version));
            }
        };

    Provider::new(ctx, protocol, Some(process)).await
}
