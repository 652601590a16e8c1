//! Legacy protocol: bucket and tags pass through verbatim, parameters travel
//! as one serialized blob, status lookups are keyed by handle in the path.

use serde_json::json;

use crate::jobs::model::BuildSpec;

use super::transport::{BuildTransport, WireCall, WireMethod};
use super::{handle_value, status_value, DispatchError, RemoteBuild};

pub(super) async fn schedule_build(
    transport: &dyn BuildTransport,
    base: &str,
    spec: &BuildSpec,
) -> Result<String, DispatchError> {
    let parameters_json = serde_json::to_string(&spec.parameters)
        .map_err(|e| DispatchError::InvalidRequest(format!("unserializable parameters: {e}")))?;

    let body = json!({
        "bucket": spec.bucket,
        "tags": spec.tags,
        "parameters_json": parameters_json,
    });

    let response = transport
        .send(WireCall {
            method: WireMethod::Put,
            url: format!("{base}builds"),
            body: Some(body),
        })
        .await?;

    handle_value(response.pointer("/build/id"))
}

pub(super) async fn query_status(
    transport: &dyn BuildTransport,
    base: &str,
    handle: &str,
) -> Result<RemoteBuild, DispatchError> {
    let response = transport
        .send(WireCall {
            method: WireMethod::Get,
            url: format!("{base}builds/{handle}"),
            body: None,
        })
        .await?;

    Ok(RemoteBuild {
        handle: handle.to_string(),
        status: status_value(response.pointer("/build/status"))?,
    })
}
