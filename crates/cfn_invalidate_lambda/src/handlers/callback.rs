use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapters::callback::CallbackTransport;
use crate::runtime::contract::{CallbackEnvelope, CallbackRequest};

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("event carries no ResponseURL")]
    MissingUrl,
    #[error("failed to serialize callback envelope: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unable to send response to CloudFormation: {0}")]
    Transport(String),
}

/// Delivers the single terminal signal for an invocation. Never retries.
pub struct CallbackReporter<'a> {
    transport: &'a dyn CallbackTransport,
}

impl<'a> CallbackReporter<'a> {
    pub fn new(transport: &'a dyn CallbackTransport) -> Self {
        Self { transport }
    }

    /// Best-effort delivery: failures are logged and swallowed, since nobody
    /// is left to report them to.
    pub fn report(&self, envelope: &CallbackEnvelope, callback_url: &str) -> Option<u16> {
        match self.deliver(envelope, callback_url) {
            Ok(status) => Some(status),
            Err(err) => {
                error!(
                    error = %err,
                    request_id = envelope.request_id.as_str(),
                    "callback not delivered"
                );
                None
            }
        }
    }

    pub fn deliver(
        &self,
        envelope: &CallbackEnvelope,
        callback_url: &str,
    ) -> Result<u16, CallbackError> {
        if callback_url.trim().is_empty() {
            return Err(CallbackError::MissingUrl);
        }

        let request = CallbackRequest::for_envelope(callback_url, envelope)?;
        info!(
            url = request.redacted_url(),
            content_length = request.content_length(),
            body = %String::from_utf8_lossy(&request.body),
            "sending callback"
        );

        let status = self
            .transport
            .put(&request)
            .map_err(CallbackError::Transport)?;

        if (200..300).contains(&status) {
            info!(status, "callback acknowledged");
        } else {
            warn!(status, "callback endpoint returned a non-success status");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::contract::{CallbackRoute, CallbackStatus, ResponseData};
    use crate::test_helpers::RecordingTransport;

    fn envelope() -> CallbackEnvelope {
        CallbackEnvelope::new(
            &CallbackRoute {
                response_url: "https://example.com/cb".to_string(),
                stack_id: "stack".to_string(),
                request_id: "req-1".to_string(),
                logical_resource_id: "Invalidate".to_string(),
            },
            CallbackStatus::Success,
            None,
            Some("invalidate.abc".to_string()),
            ResponseData::new(),
            "stream-1",
        )
    }

    #[test]
    fn puts_serialized_envelope_once() {
        let transport = RecordingTransport::new();
        let reporter = CallbackReporter::new(&transport);

        let status = reporter.report(&envelope(), "https://example.com/cb?sig=abc");

        assert_eq!(status, Some(200));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://example.com/cb?sig=abc");
        assert_eq!(requests[0].content_length(), requests[0].body.len());
        assert_eq!(transport.envelopes(), vec![envelope()]);
    }

    #[test]
    fn transport_failure_is_swallowed() {
        let transport = RecordingTransport::failing("connection reset");
        let reporter = CallbackReporter::new(&transport);

        assert_eq!(reporter.report(&envelope(), "https://example.com/cb"), None);
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn transport_failure_is_typed_on_deliver() {
        let transport = RecordingTransport::failing("connection reset");
        let reporter = CallbackReporter::new(&transport);

        let error = reporter
            .deliver(&envelope(), "https://example.com/cb")
            .expect_err("delivery should fail");
        assert_eq!(
            error.to_string(),
            "unable to send response to CloudFormation: connection reset"
        );
    }

    #[test]
    fn non_success_status_is_not_retried() {
        let transport = RecordingTransport::responding(403);
        let reporter = CallbackReporter::new(&transport);

        assert_eq!(
            reporter.report(&envelope(), "https://example.com/cb"),
            Some(403)
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn missing_url_skips_transport() {
        let transport = RecordingTransport::new();
        let reporter = CallbackReporter::new(&transport);

        let error = reporter
            .deliver(&envelope(), "")
            .expect_err("empty url should fail");
        assert!(matches!(error, CallbackError::MissingUrl));
        assert!(transport.requests().is_empty());
    }
}
