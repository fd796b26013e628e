use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_sdk_cloudfront::error::DisplayErrorContext;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use cfn_invalidate_lambda::adapters::callback::CallbackTransport;
use cfn_invalidate_lambda::adapters::clock::{RuntimeSleeper, SystemClock};
use cfn_invalidate_lambda::adapters::distribution::DistributionProvider;
use cfn_invalidate_lambda::config::HandlerConfig;
use cfn_invalidate_lambda::handlers::callback::CallbackReporter;
use cfn_invalidate_lambda::handlers::invalidation::InvalidationDriver;
use cfn_invalidate_lambda::handlers::lifecycle::{InvocationContext, LifecycleHandler};
use cfn_invalidate_lambda::runtime::contract::{
    CallbackRequest, InvalidationRequest, InvalidationStatus,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const CALLBACK_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

struct CloudFrontProvider {
    client: aws_sdk_cloudfront::Client,
}

impl DistributionProvider for CloudFrontProvider {
    fn create_invalidation(&self, request: &InvalidationRequest) -> Result<String, String> {
        let batch = invalidation_batch(request)?;
        let client = self.client.clone();
        let distribution_id = request.distribution_id.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .create_invalidation()
                    .distribution_id(distribution_id)
                    .invalidation_batch(batch)
                    .send()
                    .await
                    .map_err(|error| {
                        format!("CreateInvalidation failed: {}", DisplayErrorContext(&error))
                    })?;

                output
                    .invalidation()
                    .map(|invalidation| invalidation.id().to_string())
                    .ok_or_else(|| {
                        "CreateInvalidation response carried no invalidation".to_string()
                    })
            })
        })
    }

    fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, String> {
        let client = self.client.clone();
        let distribution_id = distribution_id.to_string();
        let invalidation_id = invalidation_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_invalidation()
                    .distribution_id(distribution_id)
                    .id(invalidation_id)
                    .send()
                    .await
                    .map_err(|error| {
                        format!("GetInvalidation failed: {}", DisplayErrorContext(&error))
                    })?;

                output
                    .invalidation()
                    .map(|invalidation| {
                        InvalidationStatus::from_provider_status(invalidation.status())
                    })
                    .ok_or_else(|| "GetInvalidation response carried no invalidation".to_string())
            })
        })
    }
}

fn invalidation_batch(request: &InvalidationRequest) -> Result<InvalidationBatch, String> {
    let quantity = i32::try_from(request.paths.len())
        .map_err(|_| format!("too many invalidation paths: {}", request.paths.len()))?;
    let paths = Paths::builder()
        .quantity(quantity)
        .set_items(Some(request.paths.clone()))
        .build()
        .map_err(|error| format!("invalid invalidation paths: {error}"))?;

    InvalidationBatch::builder()
        .paths(paths)
        .caller_reference(request.caller_reference.clone())
        .build()
        .map_err(|error| format!("invalid invalidation batch: {error}"))
}

struct HttpCallbackTransport {
    http_client: reqwest::Client,
}

impl CallbackTransport for HttpCallbackTransport {
    fn put(&self, request: &CallbackRequest) -> Result<u16, String> {
        let client = self.http_client.clone();
        let url = request.url.clone();
        let content_type = request.content_type();
        let content_length = request.content_length();
        let body = request.body.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put(url)
                    .header(CONTENT_TYPE, content_type)
                    .header(CONTENT_LENGTH, content_length)
                    .body(body)
                    .send()
                    .await
                    .map(|response| response.status().as_u16())
                    .map_err(|error| format!("callback PUT failed: {error}"))
            })
        })
    }
}

struct RuntimeDependencies {
    provider: CloudFrontProvider,
    transport: HttpCallbackTransport,
    config: HandlerConfig,
}

async fn handle_request(
    deps: &RuntimeDependencies,
    event: LambdaEvent<Value>,
) -> Result<Value, Error> {
    let (payload, lambda_context) = event.into_parts();
    let context = InvocationContext {
        log_stream_name: lambda_context.env_config.log_stream.clone(),
        remaining_time: remaining_time(lambda_context.deadline, SystemTime::now()),
    };

    let handler = LifecycleHandler::new(
        InvalidationDriver::new(
            &deps.provider,
            &SystemClock,
            &RuntimeSleeper,
            deps.config.poll_policy,
        ),
        CallbackReporter::new(&deps.transport),
    )
    .with_callback_reserve(deps.config.callback_reserve);

    let envelope = handler.handle(payload, &context);
    Ok(json!({
        "Status": envelope.status,
        "PhysicalResourceId": envelope.physical_resource_id,
    }))
}

/// Time left before the runtime's deadline (epoch milliseconds), if known.
fn remaining_time(deadline_ms: u64, now: SystemTime) -> Option<Duration> {
    if deadline_ms == 0 {
        return None;
    }
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    Some(deadline.duration_since(now).unwrap_or(Duration::ZERO))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = HandlerConfig::from_env().unwrap_or_else(|error| {
        tracing::warn!(error = %error, "invalid handler configuration, using defaults");
        HandlerConfig::default()
    });
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies {
        provider: CloudFrontProvider {
            client: aws_sdk_cloudfront::Client::new(&aws_config),
        },
        transport: HttpCallbackTransport {
            http_client: reqwest::Client::builder()
                .timeout(CALLBACK_HTTP_TIMEOUT)
                .build()?,
        },
        config,
    };

    let deps = &deps;
    lambda_runtime::run(service_fn(move |event| async move {
        handle_request(deps, event).await
    }))
    .await
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use cfn_invalidate_lambda::runtime::contract::{
        CallbackEnvelope, CallbackRoute, CallbackStatus, ResponseData,
    };

    use super::*;

    /// Accepts one connection, answers 200 and hands back the raw head and body.
    fn capture_one_request(listener: TcpListener) -> thread::JoinHandle<(String, Vec<u8>)> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("callback should connect");
            let mut received = Vec::new();
            let mut chunk = [0_u8; 1024];

            let head_end = loop {
                let read = stream.read(&mut chunk).expect("request should be readable");
                assert!(read > 0, "connection closed before headers ended");
                received.extend_from_slice(&chunk[..read]);
                if let Some(at) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    break at + 4;
                }
            };

            let head = String::from_utf8_lossy(&received[..head_end]).to_string();
            let body_len: usize = header_values(&head, "content-length")
                .first()
                .and_then(|value| value.parse().ok())
                .expect("request should declare content-length");

            while received.len() < head_end + body_len {
                let read = stream.read(&mut chunk).expect("body should be readable");
                assert!(read > 0, "connection closed before body ended");
                received.extend_from_slice(&chunk[..read]);
            }

            let response = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
            stream
                .write_all(response.as_bytes())
                .expect("response should be written");

            (head, received[head_end..head_end + body_len].to_vec())
        })
    }

    fn header_values<'h>(head: &'h str, name: &str) -> Vec<&'h str> {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .filter(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn callback_put_sends_empty_content_type_and_exact_length() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("loopback should bind");
        let url = format!(
            "http://{}/cb?sig=1",
            listener.local_addr().expect("bound address")
        );
        let server = capture_one_request(listener);

        let route = CallbackRoute {
            response_url: url.clone(),
            stack_id: "arn:aws:cloudformation:us-east-1:123456789012:stack/site/1".to_string(),
            request_id: "req-wire".to_string(),
            logical_resource_id: "CloudFrontInvalidate".to_string(),
        };
        let envelope = CallbackEnvelope::new(
            &route,
            CallbackStatus::Failed,
            Some("Verteilung fehlgeschlagen: ungültige Pfade – 失敗".to_string()),
            Some("invalidate.wire".to_string()),
            ResponseData::new(),
            "2026/10/18/[$LATEST]wire",
        );
        let request =
            CallbackRequest::for_envelope(&url, &envelope).expect("envelope should encode");
        assert!(!request.body.is_ascii());

        let transport = HttpCallbackTransport {
            http_client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .expect("client should build"),
        };
        let status = transport.put(&request).expect("PUT should succeed");
        let (head, body) = server.join().expect("listener thread should finish");

        assert_eq!(status, 200);
        assert!(head.starts_with("PUT /cb?sig=1 HTTP/1.1\r\n"), "{head}");
        assert_eq!(header_values(&head, "content-type"), vec![""]);
        assert_eq!(
            header_values(&head, "content-length"),
            vec![request.body.len().to_string()]
        );
        assert_eq!(body, request.body);
    }

    #[test]
    fn batch_carries_quantity_items_and_caller_reference() {
        let request = InvalidationRequest::new(
            "EDFDVBD6EXAMPLE",
            vec!["/index.html".to_string(), "/assets/*".to_string()],
        );

        let batch = invalidation_batch(&request).expect("batch should build");
        let paths = batch.paths().expect("batch should carry paths");

        assert_eq!(paths.quantity(), 2);
        assert_eq!(paths.items(), ["/index.html", "/assets/*"]);
        assert_eq!(batch.caller_reference(), request.caller_reference);
    }

    #[test]
    fn remaining_time_counts_down_to_deadline() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        assert_eq!(
            remaining_time(1_600_000, now),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn remaining_time_saturates_after_deadline() {
        let now = UNIX_EPOCH + Duration::from_secs(2_000);
        assert_eq!(remaining_time(1_000_000, now), Some(Duration::ZERO));
    }

    #[test]
    fn unknown_deadline_leaves_ceiling_alone() {
        assert_eq!(remaining_time(0, SystemTime::now()), None);
    }
}
