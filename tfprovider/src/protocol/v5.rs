use super::{PluginProtocol, ProtocolVersion};
use crate::context::Context;
use crate::error::CallError;
use crate::grpc::PluginClient;
use crate::proto;
use async_trait::async_trait;

const GET_SCHEMA: &str = "/tfplugin5.Provider/GetSchema";
const PREPARE_PROVIDER_CONFIG: &str = "/tfplugin5.Provider/PrepareProviderConfig";
const CONFIGURE: &str = "/tfplugin5.Provider/Configure";
const VALIDATE_RESOURCE_TYPE_CONFIG: &str = "/tfplugin5.Provider/ValidateResourceTypeConfig";
const VALIDATE_DATA_SOURCE_CONFIG: &str = "/tfplugin5.Provider/ValidateDataSourceConfig";
const READ_RESOURCE: &str = "/tfplugin5.Provider/ReadResource";
const IMPORT_RESOURCE_STATE: &str = "/tfplugin5.Provider/ImportResourceState";
const READ_DATA_SOURCE: &str = "/tfplugin5.Provider/ReadDataSource";

/// Adapter for `tfplugin5.Provider`
pub(crate) struct Protocol5 {
    client: PluginClient,
}

impl Protocol5 {
    pub fn new(client: PluginClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginProtocol for Protocol5 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V5
    }

    async fn get_provider_schema(
        &self,
        ctx: &Context,
    ) -> Result<proto::get_provider_schema::Response, CallError> {
        self.client
            .unary(ctx, GET_SCHEMA, proto::get_provider_schema::Request {})
            .await
    }

    async fn prepare_provider_config(
        &self,
        ctx: &Context,
        req: proto::prepare_provider_config::Request,
    ) -> Option<Result<proto::prepare_provider_config::Response, CallError>> {
        Some(self.client.unary(ctx, PREPARE_PROVIDER_CONFIG, req).await)
    }

    async fn configure_provider(
        &self,
        ctx: &Context,
        req: proto::configure_provider::Request,
    ) -> Result<proto::configure_provider::Response, CallError> {
        self.client.unary(ctx, CONFIGURE, req).await
    }

    async fn validate_resource_config(
        &self,
        ctx: &Context,
        req: proto::validate_resource_config::Request,
    ) -> Result<proto::validate_resource_config::Response, CallError> {
        self.client
            .unary(ctx, VALIDATE_RESOURCE_TYPE_CONFIG, req)
            .await
    }

    async fn validate_data_resource_config(
        &self,
        ctx: &Context,
        req: proto::validate_data_resource_config::Request,
    ) -> Result<proto::validate_data_resource_config::Response, CallError> {
        self.client
            .unary(ctx, VALIDATE_DATA_SOURCE_CONFIG, req)
            .await
    }

    async fn read_resource(
        &self,
        ctx: &Context,
        req: proto::read_resource::Request,
    ) -> Result<proto::read_resource::Response, CallError> {
        self.client.unary(ctx, READ_RESOURCE, req).await
    }

    async fn import_resource_state(
        &self,
        ctx: &Context,
        req: proto::import_resource_state::Request,
    ) -> Result<proto::import_resource_state::Response, CallError> {
        self.client.unary(ctx, IMPORT_RESOURCE_STATE, req).await
    }

    async fn read_data_source(
        &self,
        ctx: &Context,
        req: proto::read_data_source::Request,
    ) -> Result<proto::read_data_source::Response, CallError> {
        self.client.unary(ctx, READ_DATA_SOURCE, req).await
    }
}
