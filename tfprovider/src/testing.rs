//! Scripted protocol adapter for unit tests
//!
//! Serves a fixed schema:
//! - provider config: `endpoint` (string)
//! - managed resource `widget`: `id` (string), `size` (number)
//! - data source `info`: `name` (string)

use crate::codec::{infer_type, marshal_msgpack};
use crate::context::Context;
use crate::error::CallError;
use crate::proto;
use crate::protocol::{PluginProtocol, ProtocolVersion};
use crate::types::Dynamic;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    GetProviderSchema,
    PrepareProviderConfig(proto::prepare_provider_config::Request),
    ConfigureProvider(proto::configure_provider::Request),
    ValidateResourceConfig(proto::validate_resource_config::Request),
    ValidateDataResourceConfig(proto::validate_data_resource_config::Request),
    ReadResource(proto::read_resource::Request),
    ImportResourceState(proto::import_resource_state::Request),
    ReadDataSource(proto::read_data_source::Request),
}

pub(crate) fn error_diagnostic(summary: &str) -> proto::Diagnostic {
    proto::Diagnostic {
        severity: proto::diagnostic::Severity::Error as i32,
        summary: summary.to_string(),
        ..Default::default()
    }
}

fn msgpack(value: &Dynamic) -> proto::DynamicValue {
    proto::DynamicValue {
        msgpack: marshal_msgpack(value, &infer_type(value)).unwrap(),
        json: Vec::new(),
    }
}

fn wire_block(attrs: &[(&str, &str)]) -> proto::schema::Block {
    proto::schema::Block {
        attributes: attrs
            .iter()
            .map(|(name, ty)| proto::schema::Attribute {
                name: name.to_string(),
                r#type: ty.as_bytes().to_vec(),
                optional: true,
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub(crate) fn wire_schema() -> proto::get_provider_schema::Response {
    let mut resp = proto::get_provider_schema::Response {
        provider: Some(proto::Schema {
            version: 0,
            block: Some(wire_block(&[("endpoint", r#""string""#)])),
        }),
        ..Default::default()
    };
    resp.resource_schemas.insert(
        "widget".to_string(),
        proto::Schema {
            version: 1,
            block: Some(wire_block(&[("id", r#""string""#), ("size", r#""number""#)])),
        },
    );
    resp.data_source_schemas.insert(
        "info".to_string(),
        proto::Schema {
            version: 0,
            block: Some(wire_block(&[("name", r#""string""#)])),
        },
    );
    resp
}

pub(crate) struct FakeProtocol {
    version: ProtocolVersion,
    schema: proto::get_provider_schema::Response,
    prepared_config: Option<proto::DynamicValue>,
    configure_diagnostics: Vec<proto::Diagnostic>,
    configure_delay: Option<Duration>,
    hang_next_configure: AtomicBool,
    read_state: Option<proto::DynamicValue>,
    read_private: Vec<u8>,
    imported: Vec<proto::import_resource_state::ImportedResource>,
    data_state: Option<proto::DynamicValue>,
    data_diagnostics: Vec<proto::Diagnostic>,
    calls: Mutex<Vec<Call>>,
}

impl FakeProtocol {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            schema: wire_schema(),
            prepared_config: None,
            configure_diagnostics: Vec::new(),
            configure_delay: None,
            hang_next_configure: AtomicBool::new(false),
            read_state: None,
            read_private: Vec::new(),
            imported: Vec::new(),
            data_state: None,
            data_diagnostics: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_schema_diagnostics(mut self, diags: Vec<proto::Diagnostic>) -> Self {
        self.schema.diagnostics = diags;
        self
    }

    pub fn with_prepared_config(mut self, value: &Dynamic) -> Self {
        self.prepared_config = Some(msgpack(value));
        self
    }

    pub fn with_configure_diagnostics(mut self, diags: Vec<proto::Diagnostic>) -> Self {
        self.configure_diagnostics = diags;
        self
    }

    pub fn with_configure_delay(mut self, delay: Duration) -> Self {
        self.configure_delay = Some(delay);
        self
    }

    /// The next configure call never answers.
    pub fn with_hanging_configure(self) -> Self {
        self.hang_next_configure.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_read_state(mut self, state: Option<&Dynamic>, private: &[u8]) -> Self {
        self.read_state = state.map(msgpack);
        self.read_private = private.to_vec();
        self
    }

    pub fn with_imported(mut self, type_name: &str, state: &Dynamic, private: &[u8]) -> Self {
        self.imported.push(proto::import_resource_state::ImportedResource {
            type_name: type_name.to_string(),
            state: Some(msgpack(state)),
            private: private.to_vec(),
        });
        self
    }

    pub fn with_data_state(mut self, state: &Dynamic) -> Self {
        self.data_state = Some(msgpack(state));
        self
    }

    pub fn with_data_diagnostics(mut self, diags: Vec<proto::Diagnostic>) -> Self {
        self.data_diagnostics = diags;
        self
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn configure_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::ConfigureProvider(_)))
            .count()
    }

    pub fn prepare_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::PrepareProviderConfig(_)))
            .count()
    }

    pub fn validated_type_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::ValidateResourceConfig(req) => Some(req.type_name),
                Call::ValidateDataResourceConfig(req) => Some(req.type_name),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PluginProtocol for FakeProtocol {
    fn version(&self) -> ProtocolVersion {
        self.version
    }

    async fn get_provider_schema(
        &self,
        ctx: &Context,
    ) -> Result<proto::get_provider_schema::Response, CallError> {
        self.record(Call::GetProviderSchema);
        ctx.run(async { Ok(self.schema.clone()) }).await
    }

    async fn prepare_provider_config(
        &self,
        ctx: &Context,
        req: proto::prepare_provider_config::Request,
    ) -> Option<Result<proto::prepare_provider_config::Response, CallError>> {
        if self.version == ProtocolVersion::V6 {
            return None;
        }
        self.record(Call::PrepareProviderConfig(req));
        Some(
            ctx.run(async {
                Ok(proto::prepare_provider_config::Response {
                    prepared_config: self.prepared_config.clone(),
                    diagnostics: Vec::new(),
                })
            })
            .await,
        )
    }

    async fn configure_provider(
        &self,
        ctx: &Context,
        req: proto::configure_provider::Request,
    ) -> Result<proto::configure_provider::Response, CallError> {
        self.record(Call::ConfigureProvider(req));
        let hang = self.hang_next_configure.swap(false, Ordering::SeqCst);
        ctx.run(async {
            if hang {
                std::future::pending::<()>().await;
            }
            if let Some(delay) = self.configure_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(proto::configure_provider::Response {
                diagnostics: self.configure_diagnostics.clone(),
            })
        })
        .await
    }

    async fn validate_resource_config(
        &self,
        ctx: &Context,
        req: proto::validate_resource_config::Request,
    ) -> Result<proto::validate_resource_config::Response, CallError> {
        self.record(Call::ValidateResourceConfig(req));
        ctx.run(async { Ok(proto::validate_resource_config::Response::default()) })
            .await
    }

    async fn validate_data_resource_config(
        &self,
        ctx: &Context,
        req: proto::validate_data_resource_config::Request,
    ) -> Result<proto::validate_data_resource_config::Response, CallError> {
        self.record(Call::ValidateDataResourceConfig(req));
        ctx.run(async { Ok(proto::validate_data_resource_config::Response::default()) })
            .await
    }

    async fn read_resource(
        &self,
        ctx: &Context,
        req: proto::read_resource::Request,
    ) -> Result<proto::read_resource::Response, CallError> {
        self.record(Call::ReadResource(req));
        ctx.run(async {
            Ok(proto::read_resource::Response {
                new_state: self.read_state.clone(),
                diagnostics: Vec::new(),
                private: self.read_private.clone(),
            })
        })
        .await
    }

    async fn import_resource_state(
        &self,
        ctx: &Context,
        req: proto::import_resource_state::Request,
    ) -> Result<proto::import_resource_state::Response, CallError> {
        self.record(Call::ImportResourceState(req));
        ctx.run(async {
            Ok(proto::import_resource_state::Response {
                imported_resources: self.imported.clone(),
                diagnostics: Vec::new(),
            })
        })
        .await
    }

    async fn read_data_source(
        &self,
        ctx: &Context,
        req: proto::read_data_source::Request,
    ) -> Result<proto::read_data_source::Response, CallError> {
        self.record(Call::ReadDataSource(req));
        ctx.run(async {
            Ok(proto::read_data_source::Response {
                state: self.data_state.clone(),
                diagnostics: self.data_diagnostics.clone(),
            })
        })
        .await
    }
}
