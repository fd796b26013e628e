use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const DISTRIBUTION_ID_PROPERTY: &str = "DistributionId";
pub const DISTRIBUTION_PATHS_PROPERTY: &str = "DistributionPaths";
pub const UPDATE_KEY_PROPERTY: &str = "UpdateKey";
pub const INVALIDATION_ID_DATA_KEY: &str = "InvalidationId";
pub const CALLBACK_CONTENT_TYPE: &str = "";

pub type ResourceProperties = Map<String, Value>;
pub type ResponseData = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CloudFormation custom resource request, as delivered in the Lambda payload.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub service_token: Option<String>,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    pub resource_properties: ResourceProperties,
    #[serde(default)]
    pub old_resource_properties: Option<ResourceProperties>,
}

/// Envelope routing fields pulled out of an arbitrary payload.
///
/// Extraction never fails: a malformed event still has to be answered, so
/// absent fields collapse to empty strings and the callback is attempted
/// against whatever URL was present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackRoute {
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
}

impl CallbackRoute {
    pub fn from_payload(payload: &Value) -> Self {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            response_url: field("ResponseURL"),
            stack_id: field("StackId"),
            request_id: field("RequestId"),
            logical_resource_id: field("LogicalResourceId"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn parse_lifecycle_event(payload: Value) -> Result<LifecycleEvent, ValidationError> {
    if !payload.is_object() {
        return Err(ValidationError::new(
            "invalid request: payload must be a JSON object",
        ));
    }

    serde_json::from_value(payload)
        .map_err(|error| ValidationError::new(format!("invalid request: {error}")))
}

/// The `Custom::CloudFrontInvalidate` resource properties the handler acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationProperties {
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub update_key: Option<String>,
}

impl InvalidationProperties {
    pub fn from_resource_properties(
        properties: &ResourceProperties,
    ) -> Result<Self, ValidationError> {
        let distribution_id = match properties.get(DISTRIBUTION_ID_PROPERTY) {
            Some(Value::String(value)) if !value.trim().is_empty() => value.clone(),
            Some(Value::String(_)) => {
                return Err(ValidationError::new(format!(
                    "resource property {DISTRIBUTION_ID_PROPERTY} must be a non-empty string"
                )));
            }
            Some(_) => {
                return Err(ValidationError::new(format!(
                    "resource property {DISTRIBUTION_ID_PROPERTY} must be a string"
                )));
            }
            None => return Err(missing_property(DISTRIBUTION_ID_PROPERTY, properties)),
        };

        let paths = match properties.get(DISTRIBUTION_PATHS_PROPERTY) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ValidationError::new(format!(
                            "resource property {DISTRIBUTION_PATHS_PROPERTY} must only contain strings, found {item}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ValidationError::new(format!(
                    "resource property {DISTRIBUTION_PATHS_PROPERTY} must be a list of strings"
                )));
            }
            None => return Err(missing_property(DISTRIBUTION_PATHS_PROPERTY, properties)),
        };

        if paths.is_empty() {
            return Err(ValidationError::new(format!(
                "resource property {DISTRIBUTION_PATHS_PROPERTY} must be a non-empty list"
            )));
        }

        let update_key = properties.get(UPDATE_KEY_PROPERTY).map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });

        Ok(Self {
            distribution_id,
            paths,
            update_key,
        })
    }
}

fn missing_property(name: &str, properties: &ResourceProperties) -> ValidationError {
    ValidationError::new(format!(
        "missing request resource property {name}. props: {}",
        Value::Object(properties.clone())
    ))
}

/// One `CreateInvalidation` submission. The caller reference is minted per
/// request and never shared between submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub caller_reference: String,
}

impl InvalidationRequest {
    pub fn new(distribution_id: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            distribution_id: distribution_id.into(),
            paths,
            caller_reference: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationStatus {
    InProgress,
    Completed,
}

impl InvalidationStatus {
    pub fn from_provider_status(status: &str) -> Self {
        if status.eq_ignore_ascii_case("Completed") {
            Self::Completed
        } else {
            Self::InProgress
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationResult {
    pub invalidation_id: String,
    pub caller_reference: String,
    pub status: TerminalStatus,
    pub probes: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    Success,
    Failed,
}

/// Response document PUT back to CloudFormation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackEnvelope {
    pub status: CallbackStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub no_echo: bool,
    pub data: ResponseData,
}

impl CallbackEnvelope {
    /// Builds an envelope, falling back to the log stream name for both the
    /// reason and the physical id when they are not supplied.
    pub fn new(
        route: &CallbackRoute,
        status: CallbackStatus,
        reason: Option<String>,
        physical_resource_id: Option<String>,
        data: ResponseData,
        log_stream_name: &str,
    ) -> Self {
        let reason = reason
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                format!("See the details in CloudWatch Log Stream: {log_stream_name}")
            });
        let physical_resource_id = physical_resource_id
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| log_stream_name.to_string());

        Self {
            status,
            reason,
            physical_resource_id,
            stack_id: route.stack_id.clone(),
            request_id: route.request_id.clone(),
            logical_resource_id: route.logical_resource_id.clone(),
            no_echo: false,
            data,
        }
    }
}

/// Wire form of a single callback PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub url: String,
    pub body: Vec<u8>,
}

impl CallbackRequest {
    pub fn for_envelope(
        url: impl Into<String>,
        envelope: &CallbackEnvelope,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            url: url.into(),
            body: serde_json::to_vec(envelope)?,
        })
    }

    pub fn content_type(&self) -> &'static str {
        CALLBACK_CONTENT_TYPE
    }

    // The response endpoint rejects uploads whose length header is absent or wrong.
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// URL without the pre-signed query string, safe to log.
    pub fn redacted_url(&self) -> &str {
        self.url
            .split_once('?')
            .map(|(base, _)| base)
            .unwrap_or(&self.url)
    }
}
