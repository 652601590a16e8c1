// Shared fixtures; not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bisectflow::dispatch::{BuildTransport, DispatchError, WireCall};
use bisectflow::jobs::model::{BuildSpec, JobRecord, JobState};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

pub fn build_spec() -> BuildSpec {
    BuildSpec {
        bucket: "luci.chrome.try".to_string(),
        tags: vec!["buildset:foo".to_string()],
        parameters: json!({
            "builder_name": "dummy_builder",
            "properties": {
                "bisect_config": {},
                "patch_project": "patch_project_x"
            }
        }),
    }
}

/// A Running job whose last observed progress lies `stale_for` in the past.
pub fn running_job(stale_for: Duration) -> JobRecord {
    let mut job = JobRecord::new("alice@example.com", build_spec());
    job.state = JobState::Running;
    job.dispatch_handle = Some("build-1".to_string());
    job.last_progress_time = Utc::now() - stale_for;
    job
}

/// Records every wire call and replies with scripted responses (falling back
/// to a fixed one), so tests can decode exactly what would have gone out.
pub struct SpyTransport {
    calls: Mutex<Vec<WireCall>>,
    responses: Mutex<VecDeque<Value>>,
    fallback: Value,
}

impl SpyTransport {
    pub fn new(fallback: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            fallback,
        })
    }

    pub fn push_response(&self, response: Value) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<WireCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildTransport for SpyTransport {
    async fn send(&self, call: WireCall) -> Result<Value, DispatchError> {
        self.calls.lock().unwrap().push(call);
        let scripted = self.responses.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Counts calls and fails every one of them with a transient error.
pub struct FailingTransport {
    calls: Mutex<usize>,
}

impl FailingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl BuildTransport for FailingTransport {
    async fn send(&self, _call: WireCall) -> Result<Value, DispatchError> {
        *self.calls.lock().unwrap() += 1;
        Err(DispatchError::Unavailable("connection refused".to_string()))
    }
}
