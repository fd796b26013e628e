//! In-memory collaborators for exercising handlers without AWS.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::adapters::callback::CallbackTransport;
use crate::adapters::distribution::DistributionProvider;
use crate::handlers::callback::CallbackReporter;
use crate::handlers::invalidation::InvalidationDriver;
use crate::handlers::lifecycle::LifecycleHandler;
use crate::runtime::contract::{
    CallbackEnvelope, CallbackRequest, InvalidationRequest, InvalidationStatus,
};
use crate::runtime::polling::{Clock, PollPolicy, Sleeper};

pub const SAMPLE_RESPONSE_URL: &str =
    "https://cloudformation-custom-resource-response-useast1.s3.amazonaws.com/resp?X-Amz-Signature=abc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderScript {
    /// Reports `Completed` on the n-th status query of each invalidation.
    CompleteAfter(u32),
    NeverComplete,
    RejectSubmission(String),
    FailStatus(String),
}

pub struct ScriptedProvider {
    script: ProviderScript,
    submissions: Mutex<Vec<InvalidationRequest>>,
    status_queries: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: ProviderScript) -> Self {
        Self {
            script,
            submissions: Mutex::new(Vec::new()),
            status_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> Vec<InvalidationRequest> {
        self.submissions.lock().expect("poisoned mutex").clone()
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.lock().expect("poisoned mutex").len()
    }

    pub fn was_called(&self) -> bool {
        !self.submissions().is_empty() || self.status_queries() > 0
    }
}

impl DistributionProvider for ScriptedProvider {
    fn create_invalidation(&self, request: &InvalidationRequest) -> Result<String, String> {
        let mut submissions = self.submissions.lock().expect("poisoned mutex");
        submissions.push(request.clone());

        match &self.script {
            ProviderScript::RejectSubmission(message) => Err(message.clone()),
            _ => Ok(format!("I{}EXAMPLE", submissions.len())),
        }
    }

    fn invalidation_status(
        &self,
        _distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, String> {
        let mut queries = self.status_queries.lock().expect("poisoned mutex");
        queries.push(invalidation_id.to_string());
        let queries_for_id = queries.iter().filter(|id| *id == invalidation_id).count();

        match &self.script {
            ProviderScript::CompleteAfter(n) if queries_for_id >= *n as usize => {
                Ok(InvalidationStatus::Completed)
            }
            ProviderScript::FailStatus(message) => Err(message.clone()),
            _ => Ok(InvalidationStatus::InProgress),
        }
    }
}

pub struct RecordingTransport {
    response: Result<u16, String>,
    requests: Mutex<Vec<CallbackRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::responding(200)
    }

    pub fn responding(status: u16) -> Self {
        Self {
            response: Ok(status),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CallbackRequest> {
        self.requests.lock().expect("poisoned mutex").clone()
    }

    pub fn envelopes(&self) -> Vec<CallbackEnvelope> {
        self.requests()
            .iter()
            .map(|request| {
                serde_json::from_slice(&request.body).expect("callback body should be an envelope")
            })
            .collect()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackTransport for RecordingTransport {
    fn put(&self, request: &CallbackRequest) -> Result<u16, String> {
        self.requests
            .lock()
            .expect("poisoned mutex")
            .push(request.clone());
        self.response.clone()
    }
}

/// Clock and sleeper in one: sleeping advances the clock instantly.
pub struct ManualTime {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().expect("poisoned mutex")
    }
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualTime {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

impl Sleeper for ManualTime {
    fn sleep(&self, duration: Duration) {
        *self.offset.lock().expect("poisoned mutex") += duration;
    }
}

pub fn handler<'a>(
    provider: &'a ScriptedProvider,
    transport: &'a RecordingTransport,
    time: &'a ManualTime,
    policy: PollPolicy,
) -> LifecycleHandler<'a> {
    LifecycleHandler::new(
        InvalidationDriver::new(provider, time, time, policy),
        CallbackReporter::new(transport),
    )
}

pub fn lifecycle_event(
    request_type: &str,
    resource_properties: Value,
    physical_resource_id: Option<&str>,
) -> Value {
    let mut event = json!({
        "RequestType": request_type,
        "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:CloudFrontInvalidate",
        "ResponseURL": SAMPLE_RESPONSE_URL,
        "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/opentuna/1a2b3c",
        "RequestId": "5d478078-13e9-baf0-464a-7ef285ecc786",
        "LogicalResourceId": "CloudFrontInvalidate",
        "ResourceType": "Custom::CloudFrontInvalidate",
        "ResourceProperties": resource_properties,
    });

    if let Some(physical_resource_id) = physical_resource_id {
        event["PhysicalResourceId"] = Value::from(physical_resource_id);
    }

    event
}
