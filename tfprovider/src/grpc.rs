//! Unary gRPC calls to the plugin
//!
//! The plugin services are small and every method is unary, so a single
//! generic call path over [`tonic::client::Grpc`] serves both protocol
//! versions. Only the method path differs.

use crate::context::Context;
use crate::error::CallError;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

#[derive(Debug, Clone)]
pub(crate) struct PluginClient {
    inner: tonic::client::Grpc<Channel>,
}

impl PluginClient {
    pub fn new(channel: Channel, max_message_size: usize) -> Self {
        let inner = tonic::client::Grpc::new(channel)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size);
        Self { inner }
    }

    /// Calls `path` with `message`, honouring the context's cancellation
    /// and deadline. The deadline is also sent to the plugin as the gRPC
    /// timeout.
    pub async fn unary<Req, Resp>(
        &self,
        ctx: &Context,
        path: &'static str,
        message: Req,
    ) -> Result<Resp, CallError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut inner = self.inner.clone();
        let mut request = tonic::Request::new(message);
        if let Some(remaining) = ctx.remaining() {
            request.set_timeout(remaining);
        }

        tracing::trace!(method = path, "calling provider plugin");

        ctx.run(async move {
            inner
                .ready()
                .await
                .map_err(|err| tonic::Status::from_error(Box::new(err)))?;
            let response = inner
                .unary(request, PathAndQuery::from_static(path), ProstCodec::default())
                .await?;
            Ok(response.into_inner())
        })
        .await
    }
}
