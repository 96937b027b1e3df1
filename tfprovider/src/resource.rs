//! Managed and data resource type handles
//!
//! Handles are obtained from a configured [`crate::Provider`] and stay
//! valid for as long as the provider is running.

use crate::codec::{decode, encode};
use crate::context::Context;
use crate::diagnostics::{decode_diagnostics, rpc_error_diagnostics, Diagnostics};
use crate::proto;
use crate::protocol::PluginProtocol;
use crate::schema::{DataResourceTypeSchema, ManagedResourceTypeSchema, Schema};
use crate::types::Dynamic;
use std::sync::Arc;

/// Request to refresh a managed resource's state
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResourceReadRequest {
    pub previous_value: Dynamic,
    /// Bytes the provider stored with the resource; sent back untouched
    pub opaque_private: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResourceReadResponse {
    /// Null if the resource no longer exists
    pub refreshed_value: Dynamic,
    pub opaque_private: Vec<u8>,
}

/// An object returned by an import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    pub type_name: String,
    pub state: Dynamic,
    pub opaque_private: Vec<u8>,
}

pub struct ManagedResourceType {
    protocol: Arc<dyn PluginProtocol>,
    type_name: String,
    schema: ManagedResourceTypeSchema,
    provider_schema: Arc<Schema>,
}

impl ManagedResourceType {
    pub(crate) fn new(
        protocol: Arc<dyn PluginProtocol>,
        type_name: &str,
        schema: ManagedResourceTypeSchema,
        provider_schema: Arc<Schema>,
    ) -> Self {
        Self {
            protocol,
            type_name: type_name.to_string(),
            schema,
            provider_schema,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn schema(&self) -> &ManagedResourceTypeSchema {
        &self.schema
    }

    /// Refreshes the resource from the remote system.
    pub async fn read(
        &self,
        ctx: &Context,
        req: ManagedResourceReadRequest,
    ) -> (ManagedResourceReadResponse, Diagnostics) {
        let mut resp = ManagedResourceReadResponse {
            refreshed_value: Dynamic::Null,
            opaque_private: Vec::new(),
        };

        let dv = match encode(&req.previous_value, &self.schema.content) {
            Ok(dv) => dv,
            Err(diags) => return (resp, diags),
        };

        tracing::debug!(type_name = %self.type_name, "reading resource");
        let raw = match self
            .protocol
            .read_resource(
                ctx,
                proto::read_resource::Request {
                    type_name: self.type_name.clone(),
                    current_state: Some(dv),
                    private: req.opaque_private,
                    provider_meta: None,
                },
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => return (resp, rpc_error_diagnostics(&err)),
        };

        let mut diags = decode_diagnostics(&raw.diagnostics);
        if let Some(new_state) = &raw.new_state {
            match decode(new_state, &self.schema.content) {
                Ok(value) => resp.refreshed_value = value,
                Err(more) => diags.append(more),
            }
        }
        resp.opaque_private = raw.private;
        (resp, diags)
    }

    /// Imports objects by id through this type.
    ///
    /// The provider may answer with objects of other types too; each is
    /// decoded with its own type's schema.
    pub async fn import_state(
        &self,
        ctx: &Context,
        id: &str,
    ) -> (Vec<ImportedResource>, Diagnostics) {
        tracing::debug!(type_name = %self.type_name, id, "importing resource state");
        let raw = match self
            .protocol
            .import_resource_state(
                ctx,
                proto::import_resource_state::Request {
                    type_name: self.type_name.clone(),
                    id: id.to_string(),
                },
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => return (Vec::new(), rpc_error_diagnostics(&err)),
        };

        let mut diags = decode_diagnostics(&raw.diagnostics);
        let resources =
            decode_imported_resources(&self.provider_schema, raw.imported_resources, &mut diags);
        (resources, diags)
    }
}

/// Decodes imported objects, each against the schema of its own type.
///
/// Objects of a type the schema does not declare, or whose state does not
/// decode, are reported in `diags` and left out.
pub(crate) fn decode_imported_resources(
    schema: &Schema,
    raws: Vec<proto::import_resource_state::ImportedResource>,
    diags: &mut Diagnostics,
) -> Vec<ImportedResource> {
    let mut resources = Vec::with_capacity(raws.len());
    for raw in raws {
        let Some(rt) = schema.managed_resource_type(&raw.type_name) else {
            diags.add_error(
                "Provider returned unsupported resource type",
                format!(
                    "The provider returned an imported object of type \"{}\", which is not a managed resource type in its schema.",
                    raw.type_name
                ),
            );
            continue;
        };
        let state = match &raw.state {
            Some(state) => match decode(state, &rt.content) {
                Ok(value) => value,
                Err(more) => {
                    diags.append(more);
                    continue;
                }
            },
            None => Dynamic::Null,
        };
        resources.push(ImportedResource {
            type_name: raw.type_name,
            state,
            opaque_private: raw.private,
        });
    }
    resources
}

pub struct DataResourceType {
    protocol: Arc<dyn PluginProtocol>,
    type_name: String,
    schema: DataResourceTypeSchema,
}

impl DataResourceType {
    pub(crate) fn new(
        protocol: Arc<dyn PluginProtocol>,
        type_name: &str,
        schema: DataResourceTypeSchema,
    ) -> Self {
        Self {
            protocol,
            type_name: type_name.to_string(),
            schema,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn schema(&self) -> &DataResourceTypeSchema {
        &self.schema
    }

    /// Reads the data source with the given configuration.
    pub async fn read(&self, ctx: &Context, config: &Dynamic) -> (Dynamic, Diagnostics) {
        let dv = match encode(config, &self.schema.content) {
            Ok(dv) => dv,
            Err(diags) => return (Dynamic::Null, diags),
        };

        tracing::debug!(type_name = %self.type_name, "reading data source");
        let raw = match self
            .protocol
            .read_data_source(
                ctx,
                proto::read_data_source::Request {
                    type_name: self.type_name.clone(),
                    config: Some(dv),
                    provider_meta: None,
                },
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => return (Dynamic::Null, rpc_error_diagnostics(&err)),
        };

        let mut diags = decode_diagnostics(&raw.diagnostics);
        let value = match &raw.state {
            Some(state) => decode(state, &self.schema.content).unwrap_or_else(|more| {
                diags.append(more);
                Dynamic::Null
            }),
            None => Dynamic::Null,
        };
        (value, diags)
    }
}

impl std::fmt::Debug for ManagedResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedResourceType")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for DataResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataResourceType")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
