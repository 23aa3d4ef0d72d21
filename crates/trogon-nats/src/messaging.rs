use crate::client::RequestClient;
use async_nats::header::HeaderMap;
use async_nats::Message;
use bytes::Bytes;
use opentelemetry::propagation::Injector;
use std::time::Duration;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

struct HeaderMapCarrier<'a>(&'a mut HeaderMap);

impl Injector for HeaderMapCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

pub fn inject_trace_context(headers: &mut HeaderMap) {
    let cx = Span::current().context();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, &mut HeaderMapCarrier(headers));
    });
}

pub fn headers_with_trace_context() -> HeaderMap {
    let mut headers = HeaderMap::new();
    inject_trace_context(&mut headers);
    headers
}

/// Send a request carrying `headers` (plus the current trace context) and
/// wait at most `timeout` for the reply.
///
/// The reply is returned as-is; interpreting its headers and payload is the
/// caller's job.
pub async fn request_with_timeout<N: RequestClient>(
    client: &N,
    subject: &str,
    mut headers: HeaderMap,
    payload: Bytes,
    timeout: Duration,
) -> Result<Message, NatsError> {
    inject_trace_context(&mut headers);

    let response = tokio::time::timeout(
        timeout,
        client.request_with_headers(subject.to_string(), headers, payload),
    )
    .await
    .map_err(|_| NatsError::Timeout {
        subject: subject.to_string(),
    })?
    .map_err(|e| NatsError::Request {
        subject: subject.to_string(),
        error: e.to_string(),
    })?;

    tracing::debug!(
        subject,
        payload_len = response.payload.len(),
        "Received NATS reply"
    );
    Ok(response)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatsError {
    Request { subject: String, error: String },
    Timeout { subject: String },
}

impl std::fmt::Display for NatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request { subject, error } => {
                write!(f, "Request to '{}' failed: {}", subject, error)
            }
            Self::Timeout { subject } => write!(f, "Request to '{}' timed out", subject),
        }
    }
}

impl std::error::Error for NatsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockError, MockNatsClient};

    #[tokio::test]
    async fn returns_reply_from_client() {
        let mock = MockNatsClient::new();
        mock.reply_with(|req| Ok(MockNatsClient::message(&req.subject, req.payload.clone(), None)));

        let reply = request_with_timeout(
            &mock,
            "kv.store.request",
            HeaderMap::new(),
            Bytes::from_static(b"ping"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(reply.payload, Bytes::from_static(b"ping"));
        assert_eq!(mock.requests()[0].subject, "kv.store.request");
    }

    #[tokio::test]
    async fn client_error_maps_to_request_error() {
        let mock = MockNatsClient::new();
        mock.reply_with(|_| Err(MockError("no responders".to_string())));

        let err = request_with_timeout(
            &mock,
            "kv.store.request",
            HeaderMap::new(),
            Bytes::new(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err,
            NatsError::Request {
                subject: "kv.store.request".to_string(),
                error: "no responders".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reply_times_out() {
        let mock = MockNatsClient::new();
        mock.delay_replies(Duration::from_secs(60));

        let err = request_with_timeout(
            &mock,
            "kv.store.request",
            HeaderMap::new(),
            Bytes::new(),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, NatsError::Timeout { .. }));
        assert!(err.to_string().contains("timed out"));
    }
}
