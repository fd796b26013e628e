use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, info_span};

use crate::handlers::callback::CallbackReporter;
use crate::handlers::invalidation::{InvalidateError, InvalidationDriver};
use crate::runtime::contract::{
    parse_lifecycle_event, CallbackEnvelope, CallbackRoute, CallbackStatus,
    InvalidationProperties, InvalidationResult, ResponseData, ValidationError,
    INVALIDATION_ID_DATA_KEY,
};
use crate::runtime::identity::{resolve_identity, ResourceIdentity};

pub const DEFAULT_CALLBACK_RESERVE: Duration = Duration::from_secs(15);

/// What the Lambda runtime tells us about the current invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub log_stream_name: String,
    pub remaining_time: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invalidation(#[from] InvalidateError),
    #[error("invalidation aborted unexpectedly: {0}")]
    Panicked(String),
}

struct CompletedRequest {
    identity: ResourceIdentity,
    result: InvalidationResult,
}

pub struct LifecycleHandler<'a> {
    driver: InvalidationDriver<'a>,
    reporter: CallbackReporter<'a>,
    callback_reserve: Duration,
}

impl<'a> LifecycleHandler<'a> {
    pub fn new(driver: InvalidationDriver<'a>, reporter: CallbackReporter<'a>) -> Self {
        Self {
            driver,
            reporter,
            callback_reserve: DEFAULT_CALLBACK_RESERVE,
        }
    }

    pub fn with_callback_reserve(self, callback_reserve: Duration) -> Self {
        Self {
            callback_reserve,
            ..self
        }
    }

    /// Handles one custom resource request and reports its outcome exactly
    /// once. Never fails: every error becomes a FAILED envelope.
    pub fn handle(&self, payload: Value, context: &InvocationContext) -> CallbackEnvelope {
        let route = CallbackRoute::from_payload(&payload);
        let relayed_physical_id = payload
            .get("PhysicalResourceId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let span = info_span!(
            "lifecycle",
            request_id = route.request_id.as_str(),
            logical_resource_id = route.logical_resource_id.as_str()
        );
        let _entered = span.enter();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(payload, context)))
            .unwrap_or_else(|panic| Err(LifecycleError::Panicked(panic_message(panic))));

        let envelope = match outcome {
            Ok(completed) => {
                let data = ResponseData::from([(
                    INVALIDATION_ID_DATA_KEY.to_string(),
                    Value::from(completed.result.invalidation_id),
                )]);
                CallbackEnvelope::new(
                    &route,
                    CallbackStatus::Success,
                    None,
                    Some(completed.identity.into_string()),
                    data,
                    &context.log_stream_name,
                )
            }
            Err(err) => {
                error!(error = %err, "lifecycle request failed");
                CallbackEnvelope::new(
                    &route,
                    CallbackStatus::Failed,
                    Some(err.to_string()),
                    relayed_physical_id,
                    ResponseData::new(),
                    &context.log_stream_name,
                )
            }
        };

        self.reporter.report(&envelope, &route.response_url);
        envelope
    }

    fn process(
        &self,
        payload: Value,
        context: &InvocationContext,
    ) -> Result<CompletedRequest, LifecycleError> {
        let event = parse_lifecycle_event(payload)?;
        info!(
            request_type = %event.request_type,
            stack_id = event.stack_id.as_str(),
            resource_type = event.resource_type.as_deref().unwrap_or_default(),
            physical_resource_id = event.physical_resource_id.as_deref().unwrap_or_default(),
            "lifecycle event received"
        );

        let properties =
            InvalidationProperties::from_resource_properties(&event.resource_properties)?;
        let identity =
            resolve_identity(event.request_type, event.physical_resource_id.as_deref())?;

        // Delete is not special-cased: removing the resource invalidates too.
        info!(
            distribution_id = properties.distribution_id.as_str(),
            paths = ?properties.paths,
            update_key = properties.update_key.as_deref().unwrap_or_default(),
            physical_resource_id = identity.as_str(),
            "invalidating distribution"
        );
        let result = self
            .driver_for(context)
            .invalidate(&properties.distribution_id, &properties.paths)?;

        Ok(CompletedRequest { identity, result })
    }

    fn driver_for(&self, context: &InvocationContext) -> InvalidationDriver<'a> {
        match context.remaining_time {
            Some(remaining) => {
                let budget = remaining.saturating_sub(self.callback_reserve);
                self.driver
                    .with_policy(self.driver.policy().clamped_to(budget))
            }
            None => self.driver,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
