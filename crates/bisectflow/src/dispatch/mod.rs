//! Client for the remote build-scheduling service.
//!
//! One semantic operation set (schedule a build, query a build's status)
//! over two incompatible wire protocols, selected by configuration. Each
//! protocol variant owns its request-shape construction; the transport is a
//! trait so tests can substitute a spy.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::jobs::model::BuildSpec;

mod legacy;
mod modern;
pub mod transport;

pub use transport::{BuildTransport, HttpTransport, WireCall, WireMethod};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Modern-protocol bucket names must look like `luci.<project>.<bucket>`.
    /// Raised before any transport call is made.
    #[error("bucket {0:?} is not in luci.<project>.<bucket> form")]
    InvalidBucketFormat(String),

    #[error("{0}")]
    InvalidRequest(String),

    /// Transport failure, timeout, or non-success status from the remote
    /// service. Transient; the caller's retry policy applies.
    #[error("build service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response from build service: {0}")]
    BadResponse(String),
}

/// Which wire protocol of the remote service to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Legacy,
    Modern,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Base URL of the legacy API, trailing slash included.
    pub legacy_base: String,
    /// Base URL of the modern RPC surface, trailing slash included.
    pub modern_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            legacy_base: "https://cr-buildbucket.appspot.com/api/buildbucket/v1/".to_string(),
            modern_base: "https://cr-buildbucket.appspot.com/prpc/buildbucket.v2.Builds/"
                .to_string(),
        }
    }
}

/// Remote build status, normalized across protocols.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteBuild {
    pub handle: String,
    pub status: String,
}

pub struct BuildDispatchClient {
    protocol: Protocol,
    endpoints: Endpoints,
    transport: Arc<dyn BuildTransport>,
}

impl BuildDispatchClient {
    pub fn new(
        protocol: Protocol,
        endpoints: Endpoints,
        transport: Arc<dyn BuildTransport>,
    ) -> Self {
        Self {
            protocol,
            endpoints,
            transport,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Schedule a build and return the remote service's handle for it.
    pub async fn schedule_build(&self, spec: &BuildSpec) -> Result<String, DispatchError> {
        match self.protocol {
            Protocol::Legacy => {
                legacy::schedule_build(self.transport.as_ref(), &self.endpoints.legacy_base, spec)
                    .await
            }
            Protocol::Modern => {
                modern::schedule_build(self.transport.as_ref(), &self.endpoints.modern_base, spec)
                    .await
            }
        }
    }

    pub async fn query_status(&self, handle: &str) -> Result<RemoteBuild, DispatchError> {
        match self.protocol {
            Protocol::Legacy => {
                legacy::query_status(self.transport.as_ref(), &self.endpoints.legacy_base, handle)
                    .await
            }
            Protocol::Modern => {
                modern::query_status(self.transport.as_ref(), &self.endpoints.modern_base, handle)
                    .await
            }
        }
    }
}

/// Build ids come back as strings from one protocol and numbers from the
/// other; normalize both to a string handle.
fn handle_value(id: Option<&Value>) -> Result<String, DispatchError> {
    match id {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(DispatchError::BadResponse(
            "response carries no build id".to_string(),
        )),
    }
}

fn status_value(status: Option<&Value>) -> Result<String, DispatchError> {
    status
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| DispatchError::BadResponse("response carries no build status".to_string()))
}
