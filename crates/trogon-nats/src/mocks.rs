//! Scriptable in-process NATS client.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! trogon-nats = { path = "...", features = ["test-support"] }
//! ```

use crate::client::{RequestClient, SubscribeClient};
use async_nats::subject::ToSubject;
use async_nats::{HeaderMap, Message};
use bytes::Bytes;
use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

/// A request observed by [`MockNatsClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub subject: String,
    pub headers: HeaderMap,
    pub payload: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> Result<Message, MockError> + Send + Sync>;

/// Records requests and answers them with a caller-supplied responder.
///
/// Subscriptions are fed through [`MockNatsClient::feed`]: the returned
/// sender pushes messages into the subscription, dropping it ends the stream.
#[derive(Clone)]
pub struct MockNatsClient {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Arc<Mutex<Option<Responder>>>,
    reply_delay: Arc<Mutex<Option<Duration>>>,
    feeds: Arc<Mutex<HashMap<String, mpsc::UnboundedReceiver<Message>>>>,
    subscribed_subjects: Arc<Mutex<Vec<String>>>,
    inbox_seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for MockNatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNatsClient")
            .field("requests", &self.requests.lock().unwrap().len())
            .field("pending_feeds", &self.feeds.lock().unwrap().len())
            .field("subscribed_subjects", &self.subscribed_subjects)
            .finish()
    }
}

impl MockNatsClient {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Mutex::new(None)),
            reply_delay: Arc::new(Mutex::new(None)),
            feeds: Arc::new(Mutex::new(HashMap::new())),
            subscribed_subjects: Arc::new(Mutex::new(Vec::new())),
            inbox_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build a reply message the way the server would deliver it.
    pub fn message(subject: &str, payload: impl Into<Bytes>, headers: Option<HeaderMap>) -> Message {
        let payload = payload.into();
        Message {
            subject: subject.to_string().into(),
            reply: None,
            length: payload.len(),
            payload,
            headers,
            status: None,
            description: None,
        }
    }

    pub fn reply_with<F>(&self, responder: F)
    where
        F: Fn(&RecordedRequest) -> Result<Message, MockError> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Some(Arc::new(responder));
    }

    /// Hold every reply for `delay` before returning it.
    pub fn delay_replies(&self, delay: Duration) {
        *self.reply_delay.lock().unwrap() = Some(delay);
    }

    /// Register the message source for the next subscription to `subject`.
    pub fn feed(&self, subject: &str) -> mpsc::UnboundedSender<Message> {
        let (tx, rx) = mpsc::unbounded();
        self.feeds.lock().unwrap().insert(subject.to_string(), rx);
        tx
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn subscribed_to(&self) -> Vec<String> {
        self.subscribed_subjects.lock().unwrap().clone()
    }
}

impl Default for MockNatsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestClient for MockNatsClient {
    type RequestError = MockError;

    async fn request_with_headers<S: ToSubject + Send>(
        &self,
        subject: S,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<Message, MockError> {
        let recorded = RecordedRequest {
            subject: subject.to_subject().to_string(),
            headers,
            payload,
        };
        self.requests.lock().unwrap().push(recorded.clone());

        let delay = *self.reply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let responder = self.responder.lock().unwrap().clone();
        match responder {
            Some(respond) => respond(&recorded),
            None => Err(MockError(format!(
                "no responders for subject: {}",
                recorded.subject
            ))),
        }
    }
}

impl SubscribeClient for MockNatsClient {
    type SubscribeError = MockError;
    type Subscription = mpsc::UnboundedReceiver<Message>;

    /// Inboxes are numbered from 1: `_INBOX.mock.1`, `_INBOX.mock.2`, ...
    fn new_inbox(&self) -> String {
        let n = self.inbox_seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("_INBOX.mock.{n}")
    }

    async fn subscribe<S: ToSubject + Send>(
        &self,
        subject: S,
    ) -> Result<Self::Subscription, MockError> {
        let subject = subject.to_subject().to_string();
        self.subscribed_subjects.lock().unwrap().push(subject.clone());
        self.feeds
            .lock()
            .unwrap()
            .remove(&subject)
            .ok_or_else(|| MockError(format!("no feed registered for subject: {}", subject)))
    }
}
