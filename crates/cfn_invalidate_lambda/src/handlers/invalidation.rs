use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::adapters::distribution::DistributionProvider;
use crate::runtime::contract::{
    InvalidationRequest, InvalidationResult, InvalidationStatus, TerminalStatus,
};
use crate::runtime::polling::{poll_until, Clock, PollOutcome, PollPolicy, Sleeper};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidateError {
    #[error("failed to create invalidation on distribution {distribution_id}: {message}")]
    Submit {
        distribution_id: String,
        message: String,
    },
    #[error("failed to read status of invalidation {invalidation_id} on distribution {distribution_id}: {message}")]
    Status {
        distribution_id: String,
        invalidation_id: String,
        message: String,
    },
    #[error("invalidation {invalidation_id} on distribution {distribution_id} did not complete within {}s", .timeout.as_secs())]
    TimedOut {
        distribution_id: String,
        invalidation_id: String,
        timeout: Duration,
    },
}

/// Submits one invalidation and blocks until CloudFront reports it completed.
#[derive(Clone, Copy)]
pub struct InvalidationDriver<'a> {
    provider: &'a dyn DistributionProvider,
    clock: &'a dyn Clock,
    sleeper: &'a dyn Sleeper,
    policy: PollPolicy,
}

impl<'a> InvalidationDriver<'a> {
    pub fn new(
        provider: &'a dyn DistributionProvider,
        clock: &'a dyn Clock,
        sleeper: &'a dyn Sleeper,
        policy: PollPolicy,
    ) -> Self {
        Self {
            provider,
            clock,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn with_policy(self, policy: PollPolicy) -> Self {
        Self { policy, ..self }
    }

    pub fn invalidate(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> Result<InvalidationResult, InvalidateError> {
        let result = self.submit_and_wait(distribution_id, paths)?;
        match result.status {
            TerminalStatus::Completed => Ok(result),
            TerminalStatus::TimedOut => Err(InvalidateError::TimedOut {
                distribution_id: distribution_id.to_string(),
                invalidation_id: result.invalidation_id,
                timeout: self.policy.timeout(),
            }),
        }
    }

    /// Like [`Self::invalidate`], but a poll ceiling is reported as a
    /// `TimedOut` result instead of an error.
    pub fn submit_and_wait(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> Result<InvalidationResult, InvalidateError> {
        let request = InvalidationRequest::new(distribution_id, paths.to_vec());
        let invalidation_id = self
            .provider
            .create_invalidation(&request)
            .and_then(|id| {
                if id.trim().is_empty() {
                    Err("provider returned an empty invalidation id".to_string())
                } else {
                    Ok(id)
                }
            })
            .map_err(|message| InvalidateError::Submit {
                distribution_id: distribution_id.to_string(),
                message,
            })?;

        info!(
            distribution_id,
            invalidation_id = invalidation_id.as_str(),
            caller_reference = request.caller_reference.as_str(),
            paths = request.paths.len(),
            timeout_secs = self.policy.timeout().as_secs(),
            "invalidation submitted"
        );

        let outcome = poll_until(self.policy, self.clock, self.sleeper, |probe| {
            let status = self
                .provider
                .invalidation_status(distribution_id, &invalidation_id)
                .map_err(|message| InvalidateError::Status {
                    distribution_id: distribution_id.to_string(),
                    invalidation_id: invalidation_id.clone(),
                    message,
                })?;
            debug!(
                invalidation_id = invalidation_id.as_str(),
                probe,
                status = ?status,
                "invalidation status polled"
            );
            Ok((status == InvalidationStatus::Completed).then_some(()))
        })?;

        let (status, probes) = match outcome {
            PollOutcome::Ready { probes, .. } => {
                info!(
                    invalidation_id = invalidation_id.as_str(),
                    probes, "invalidation completed"
                );
                (TerminalStatus::Completed, probes)
            }
            PollOutcome::TimedOut { probes, elapsed } => {
                info!(
                    invalidation_id = invalidation_id.as_str(),
                    probes,
                    elapsed_secs = elapsed.as_secs(),
                    "invalidation still in progress at poll ceiling"
                );
                (TerminalStatus::TimedOut, probes)
            }
        };

        Ok(InvalidationResult {
            invalidation_id,
            caller_reference: request.caller_reference,
            status,
            probes,
        })
    }
}
