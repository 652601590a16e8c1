//! Modern protocol: structured builder/commit/patch references and a fresh
//! idempotency token per schedule call.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::jobs::model::BuildSpec;

use super::transport::{BuildTransport, WireCall, WireMethod};
use super::{handle_value, status_value, DispatchError, RemoteBuild};

const GITILES_PREFIX: &str = "commit/gitiles/";
const GERRIT_PREFIX: &str = "patch/gerrit/";
const DEFAULT_REF: &str = "refs/heads/main";

pub(super) async fn schedule_build(
    transport: &dyn BuildTransport,
    base: &str,
    spec: &BuildSpec,
) -> Result<String, DispatchError> {
    let (project, bucket) = split_bucket(&spec.bucket)?;
    let builder = spec
        .parameters
        .get("builder_name")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DispatchError::InvalidRequest("build parameters carry no builder_name".to_string())
        })?;
    let patch_project = spec
        .parameters
        .pointer("/properties/patch_project")
        .and_then(Value::as_str);

    let mut tags = Vec::new();
    let mut gerrit_changes = Vec::new();
    let mut gitiles_commit = None;
    for tag in &spec.tags {
        let (key, value) = tag.split_once(':').unwrap_or((tag.as_str(), ""));
        if key == "buildset" {
            if let Some(commit) = parse_gitiles(value) {
                // Last matching buildset wins, as with a keyed field.
                gitiles_commit = Some(commit);
                continue;
            }
            if let Some(change) = parse_gerrit(value, patch_project) {
                gerrit_changes.push(change);
                continue;
            }
        }
        tags.push(json!({ "key": key, "value": value }));
    }

    let mut body = Map::new();
    body.insert(
        "requestId".to_string(),
        Value::String(Uuid::new_v4().to_string()),
    );
    body.insert(
        "builder".to_string(),
        json!({ "project": project, "bucket": bucket, "builder": builder }),
    );
    body.insert("tags".to_string(), Value::Array(tags));
    body.insert(
        "properties".to_string(),
        spec.parameters
            .get("properties")
            .cloned()
            .unwrap_or_else(|| json!({})),
    );
    if !gerrit_changes.is_empty() {
        body.insert("gerritChanges".to_string(), Value::Array(gerrit_changes));
    }
    if let Some(commit) = gitiles_commit {
        body.insert("gitilesCommit".to_string(), commit);
    }

    let response = transport
        .send(WireCall {
            method: WireMethod::Post,
            url: format!("{base}ScheduleBuild"),
            body: Some(Value::Object(body)),
        })
        .await?;

    handle_value(response.get("id"))
}

pub(super) async fn query_status(
    transport: &dyn BuildTransport,
    base: &str,
    handle: &str,
) -> Result<RemoteBuild, DispatchError> {
    let response = transport
        .send(WireCall {
            method: WireMethod::Post,
            url: format!("{base}GetBuild"),
            body: Some(json!({ "id": handle })),
        })
        .await?;

    Ok(RemoteBuild {
        handle: handle.to_string(),
        status: status_value(response.get("status"))?,
    })
}

/// `luci.<project>.<bucket>`; the bucket part may itself contain dots.
fn split_bucket(bucket: &str) -> Result<(&str, &str), DispatchError> {
    let mut parts = bucket.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("luci"), Some(project), Some(name)) if !project.is_empty() && !name.is_empty() => {
            Ok((project, name))
        }
        _ => Err(DispatchError::InvalidBucketFormat(bucket.to_string())),
    }
}

/// `commit/gitiles/<host>/<project>/+/<hash>`, where the project may contain
/// slashes.
fn parse_gitiles(value: &str) -> Option<Value> {
    let rest = value.strip_prefix(GITILES_PREFIX)?;
    let (location, hash) = rest.split_once("/+/")?;
    let (host, project) = location.split_once('/')?;
    if host.is_empty() || project.is_empty() || hash.is_empty() {
        return None;
    }
    Some(json!({
        "host": host,
        "project": project,
        "id": hash,
        "ref": DEFAULT_REF,
    }))
}

/// `patch/gerrit/<host>/<change>/<patchset>`. The patch-set's project comes
/// from the build parameters, not the tag.
fn parse_gerrit(value: &str, patch_project: Option<&str>) -> Option<Value> {
    let rest = value.strip_prefix(GERRIT_PREFIX)?;
    let mut parts = rest.splitn(3, '/');
    let (host, change, patchset) = (parts.next()?, parts.next()?, parts.next()?);
    if host.is_empty() || change.is_empty() || patchset.is_empty() {
        return None;
    }
    let mut entry = Map::new();
    entry.insert("host".to_string(), Value::String(host.to_string()));
    entry.insert("change".to_string(), Value::String(change.to_string()));
    entry.insert("patchset".to_string(), Value::String(patchset.to_string()));
    if let Some(project) = patch_project {
        entry.insert("project".to_string(), Value::String(project.to_string()));
    }
    Some(Value::Object(entry))
}
