//! The provider client
//!
//! A [`Provider`] is a running plugin plus the schema it reported when it
//! started. It moves through three states:
//!
//! ```text
//! Unconfigured --configure--> Configured --close--> Closed
//!       \___________________________________close__/
//! ```
//!
//! Configuration happens at most once. Resource types only become
//! available once the provider is configured.

use crate::codec::{decode, encode};
use crate::context::Context;
use crate::diagnostics::{decode_diagnostics, rpc_error_diagnostics, Diagnostic, Diagnostics};
use crate::error::{Result, TfproviderError};
use crate::plugin::PluginProcess;
use crate::proto;
use crate::protocol::{PluginProtocol, ProtocolVersion};
use crate::resource::{
    decode_imported_resources, DataResourceType, ImportedResource, ManagedResourceType,
};
use crate::schema::{load_schema, Schema};
use crate::types::Dynamic;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Unconfigured,
    Configured,
    Closed,
}

/// Provider configuration ready to be passed to [`Provider::configure`].
///
/// Only [`Provider::prepare_config`] creates these; a `Config` is not
/// meaningful for any provider other than the one that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    value: Dynamic,
}

impl Config {
    pub fn value(&self) -> &Dynamic {
        &self.value
    }

    pub fn into_value(self) -> Dynamic {
        self.value
    }
}

pub struct Provider {
    protocol: Arc<dyn PluginProtocol>,
    schema: Arc<Schema>,
    state: Mutex<Lifecycle>,
    plugin: Mutex<Option<PluginProcess>>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("protocol_version", &self.protocol.version())
            .field("managed_resource_types", &self.schema.managed_resource_types.len())
            .field("data_resource_types", &self.schema.data_resource_types.len())
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Fetches and translates the schema, which every later call needs.
    pub(crate) async fn new(
        ctx: &Context,
        protocol: Arc<dyn PluginProtocol>,
        plugin: Option<PluginProcess>,
    ) -> Result<Self> {
        let resp = protocol
            .get_provider_schema(ctx)
            .await
            .map_err(|err| TfproviderError::Schema(rpc_error_diagnostics(&err)))?;
        let schema = load_schema(&resp)?;

        tracing::info!(
            version = %protocol.version(),
            managed_resource_types = schema.managed_resource_types.len(),
            data_resource_types = schema.data_resource_types.len(),
            "provider schema loaded"
        );

        Ok(Self {
            protocol,
            schema: Arc::new(schema),
            state: Mutex::new(Lifecycle::Unconfigured),
            plugin: Mutex::new(plugin),
        })
    }

    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol.version()
    }

    /// Validates and normalizes a provider configuration value.
    ///
    /// Protocol 5 asks the plugin, which may propose a different value.
    /// Protocol 6 only checks that the value conforms to the schema.
    pub async fn prepare_config(&self, ctx: &Context, value: &Dynamic) -> (Config, Diagnostics) {
        let unchanged = || Config {
            value: value.clone(),
        };

        let dv = match encode(value, &self.schema.provider_config) {
            Ok(dv) => dv,
            Err(diags) => return (unchanged(), diags),
        };

        let req = proto::prepare_provider_config::Request { config: Some(dv) };
        let resp = match self.protocol.prepare_provider_config(ctx, req).await {
            None => return (unchanged(), Diagnostics::new()),
            Some(Err(err)) => return (unchanged(), rpc_error_diagnostics(&err)),
            Some(Ok(resp)) => resp,
        };

        let mut diags = decode_diagnostics(&resp.diagnostics);
        let config = match resp.prepared_config {
            Some(raw) if !raw.msgpack.is_empty() || !raw.json.is_empty() => {
                match decode(&raw, &self.schema.provider_config) {
                    Ok(value) => Config { value },
                    Err(more) => {
                        diags.append(more);
                        unchanged()
                    }
                }
            }
            _ => unchanged(),
        };
        (config, diags)
    }

    /// Configures the provider. Succeeds at most once.
    ///
    /// The state lock is held for the whole call, so concurrent callers
    /// are serialized and all but the first see an "already configured"
    /// error.
    pub async fn configure(&self, ctx: &Context, config: &Config) -> Diagnostics {
        let mut state = self.state.lock().await;
        match *state {
            Lifecycle::Unconfigured => {}
            Lifecycle::Configured => {
                return Diagnostic::error(
                    "Provider already configured",
                    "This operation requires an unconfigured provider, but this provider was already configured.",
                )
                .into()
            }
            Lifecycle::Closed => return closed_diagnostics(),
        }

        let dv = match encode(&config.value, &self.schema.provider_config) {
            Ok(dv) => dv,
            Err(diags) => return diags,
        };

        tracing::debug!("configuring provider");
        let req = proto::configure_provider::Request {
            terraform_version: String::new(),
            config: Some(dv),
        };
        let diags = match self.protocol.configure_provider(ctx, req).await {
            Ok(resp) => decode_diagnostics(&resp.diagnostics),
            Err(err) => return rpc_error_diagnostics(&err),
        };

        if !diags.has_errors() {
            *state = Lifecycle::Configured;
        }
        diags
    }

    pub async fn validate_managed_resource_config(
        &self,
        ctx: &Context,
        type_name: &str,
        value: &Dynamic,
    ) -> Diagnostics {
        let Some(rt) = self.schema.managed_resource_type(type_name) else {
            return Diagnostic::error(
                "Unsupported resource type",
                format!("This provider does not support managed resource type \"{type_name}\"."),
            )
            .into();
        };
        let dv = match encode(value, &rt.content) {
            Ok(dv) => dv,
            Err(diags) => return diags,
        };

        tracing::debug!(type_name, "validating resource config");
        let req = proto::validate_resource_config::Request {
            type_name: type_name.to_string(),
            config: Some(dv),
        };
        match self.protocol.validate_resource_config(ctx, req).await {
            Ok(resp) => decode_diagnostics(&resp.diagnostics),
            Err(err) => rpc_error_diagnostics(&err),
        }
    }

    pub async fn validate_data_resource_config(
        &self,
        ctx: &Context,
        type_name: &str,
        value: &Dynamic,
    ) -> Diagnostics {
        let Some(rt) = self.schema.data_resource_type(type_name) else {
            return Diagnostic::error(
                "Unsupported data source",
                format!("This provider does not support data source \"{type_name}\"."),
            )
            .into();
        };
        let dv = match encode(value, &rt.content) {
            Ok(dv) => dv,
            Err(diags) => return diags,
        };

        tracing::debug!(type_name, "validating data source config");
        let req = proto::validate_data_resource_config::Request {
            type_name: type_name.to_string(),
            config: Some(dv),
        };
        match self.protocol.validate_data_resource_config(ctx, req).await {
            Ok(resp) => decode_diagnostics(&resp.diagnostics),
            Err(err) => rpc_error_diagnostics(&err),
        }
    }

    async fn is_configured(&self) -> bool {
        *self.state.lock().await == Lifecycle::Configured
    }

    /// Handle for a managed resource type, once the provider is configured.
    pub async fn managed_resource_type(&self, type_name: &str) -> Option<ManagedResourceType> {
        if !self.is_configured().await {
            return None;
        }
        let schema = self.schema.managed_resource_type(type_name)?;
        Some(ManagedResourceType::new(
            Arc::clone(&self.protocol),
            type_name,
            schema.clone(),
            Arc::clone(&self.schema),
        ))
    }

    /// Handle for a data resource type, once the provider is configured.
    pub async fn data_resource_type(&self, type_name: &str) -> Option<DataResourceType> {
        if !self.is_configured().await {
            return None;
        }
        let schema = self.schema.data_resource_type(type_name)?;
        Some(DataResourceType::new(
            Arc::clone(&self.protocol),
            type_name,
            schema.clone(),
        ))
    }

    /// Asks the provider to import an existing object by id.
    ///
    /// A provider may answer with objects of several types. Objects whose
    /// type is not in the schema are reported and skipped.
    pub async fn import_managed_resource_state(
        &self,
        ctx: &Context,
        type_name: &str,
        id: &str,
    ) -> (Vec<ImportedResource>, Diagnostics) {
        if !self.is_configured().await {
            return (Vec::new(), Diagnostics::new());
        }

        tracing::debug!(type_name, id, "importing resource state");
        let req = proto::import_resource_state::Request {
            type_name: type_name.to_string(),
            id: id.to_string(),
        };
        let resp = match self.protocol.import_resource_state(ctx, req).await {
            Ok(resp) => resp,
            Err(err) => return (Vec::new(), rpc_error_diagnostics(&err)),
        };

        let mut diags = decode_diagnostics(&resp.diagnostics);
        let resources =
            decode_imported_resources(&self.schema, resp.imported_resources, &mut diags);
        (resources, diags)
    }

    /// Stops the plugin process. The provider is unusable afterwards.
    pub async fn close(&self) -> Result<()> {
        *self.state.lock().await = Lifecycle::Closed;
        match self.plugin.lock().await.take() {
            Some(mut process) => process.kill().await,
            None => Ok(()),
        }
    }
}

fn closed_diagnostics() -> Diagnostics {
    Diagnostic::error(
        "Provider closed",
        "This operation requires a running provider, but this provider has already been closed.",
    )
    .into()
}
