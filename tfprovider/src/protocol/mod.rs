//! Per-version protocol adapters
//!
//! Protocol 5 and protocol 6 exchange wire-identical messages for
//! everything this client does. They differ in service and method names,
//! and only protocol 5 has a remote step for preparing provider
//! configuration. Everything else is shared by [`crate::Provider`].

mod v5;
mod v6;

pub(crate) use v5::Protocol5;
pub(crate) use v6::Protocol6;

use crate::context::Context;
use crate::error::CallError;
use crate::proto;
use async_trait::async_trait;
use std::fmt;

/// Major version of the plugin protocol spoken with a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    V5,
    V6,
}

impl ProtocolVersion {
    pub fn from_major(major: u32) -> Option<Self> {
        match major {
            5 => Some(ProtocolVersion::V5),
            6 => Some(ProtocolVersion::V6),
            _ => None,
        }
    }

    pub fn major(self) -> u32 {
        match self {
            ProtocolVersion::V5 => 5,
            ProtocolVersion::V6 => 6,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major())
    }
}

/// The RPCs a provider client needs, in wire form.
///
/// Implemented only inside this crate, by one adapter per protocol version.
#[async_trait]
pub(crate) trait PluginProtocol: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    async fn get_provider_schema(
        &self,
        ctx: &Context,
    ) -> Result<proto::get_provider_schema::Response, CallError>;

    /// `None` when the protocol has no remote prepare step.
    async fn prepare_provider_config(
        &self,
        ctx: &Context,
        req: proto::prepare_provider_config::Request,
    ) -> Option<Result<proto::prepare_provider_config::Response, CallError>>;

    async fn configure_provider(
        &self,
        ctx: &Context,
        req: proto::configure_provider::Request,
    ) -> Result<proto::configure_provider::Response, CallError>;

    async fn validate_resource_config(
        &self,
        ctx: &Context,
        req: proto::validate_resource_config::Request,
    ) -> Result<proto::validate_resource_config::Response, CallError>;

    async fn validate_data_resource_config(
        &self,
        ctx: &Context,
        req: proto::validate_data_resource_config::Request,
    ) -> Result<proto::validate_data_resource_config::Response, CallError>;

    async fn read_resource(
        &self,
        ctx: &Context,
        req: proto::read_resource::Request,
    ) -> Result<proto::read_resource::Response, CallError>;

    async fn import_resource_state(
        &self,
        ctx: &Context,
        req: proto::import_resource_state::Request,
    ) -> Result<proto::import_resource_state::Response, CallError>;

    async fn read_data_source(
        &self,
        ctx: &Context,
        req: proto::read_data_source::Request,
    ) -> Result<proto::read_data_source::Response, CallError>;
}
