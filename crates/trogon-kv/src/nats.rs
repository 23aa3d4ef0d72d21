//! Store transport over NATS request/reply.
//!
//! Every store call is a request on `{prefix}.store.request`. The request
//! headers carry the method, path, content format and token; the body is
//! the payload. Replies report their outcome in `Store-Status` (absent means
//! 200). OBSERVE names the delivery subject in `Observe-Subject`; the client
//! subscribes to it before sending the request so no update can be missed.

use crate::token::Token;
use crate::transport::{
    ContentFormat, ObserveStore, ProbeStore, RawFeed, ReadStore, TransportError, WriteStore,
};
use async_nats::{HeaderMap, Message};
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info};
use trogon_nats::{NatsError, RequestClient, SubscribeClient, request_with_timeout};

pub mod header {
    pub const STORE_METHOD: &str = "Store-Method";
    pub const STORE_PATH: &str = "Store-Path";
    pub const CONTENT_FORMAT: &str = "Content-Format";
    pub const API_KEY: &str = "X-Api-Key";
    pub const STORE_STATUS: &str = "Store-Status";
    pub const OBSERVE_SUBJECT: &str = "Observe-Subject";
    pub const OBSERVE_END: &str = "Observe-End";
}

pub const STATUS_PATH: &str = "/status";

pub fn request_subject(prefix: &str) -> String {
    format!("{prefix}.store.request")
}

#[derive(Clone)]
pub struct NatsStore<N> {
    client: N,
    subject: String,
    timeout: Duration,
}

impl<N> std::fmt::Debug for NatsStore<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsStore")
            .field("subject", &self.subject)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<N: RequestClient + SubscribeClient> NatsStore<N> {
    pub fn new(client: N, subject_prefix: &str, timeout: Duration) -> Self {
        Self {
            client,
            subject: request_subject(subject_prefix),
            timeout,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    async fn call(
        &self,
        method: &str,
        path: &str,
        token: Option<&Token>,
        format: Option<ContentFormat>,
        payload: Bytes,
    ) -> Result<Bytes, TransportError> {
        let headers = store_headers(method, path, token, format);
        self.send(path, headers, payload).await
    }

    async fn send(
        &self,
        path: &str,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<Bytes, TransportError> {
        let reply = request_with_timeout(&self.client, &self.subject, headers, payload, self.timeout)
            .await
            .map_err(|e| match e {
                NatsError::Timeout { .. } => TransportError::Timeout {
                    path: path.to_string(),
                },
                NatsError::Request { error, .. } => TransportError::Request(error),
            })?;

        into_payload(reply)
    }
}

fn store_headers(
    method: &str,
    path: &str,
    token: Option<&Token>,
    format: Option<ContentFormat>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::STORE_METHOD, method);
    headers.insert(header::STORE_PATH, path);
    if let Some(format) = format {
        headers.insert(header::CONTENT_FORMAT, format.as_str());
    }
    if let Some(token) = token {
        headers.insert(header::API_KEY, token.as_str());
    }
    headers
}

fn reply_status(reply: &Message) -> Result<u16, TransportError> {
    let Some(value) = reply
        .headers
        .as_ref()
        .and_then(|h| h.get(header::STORE_STATUS))
    else {
        return Ok(200);
    };

    value.as_str().trim().parse::<u16>().map_err(|_| {
        TransportError::Protocol(format!(
            "invalid {} header: {:?}",
            header::STORE_STATUS,
            value.as_str()
        ))
    })
}

fn into_payload(reply: Message) -> Result<Bytes, TransportError> {
    let status = reply_status(&reply)?;
    match status {
        200..=299 => Ok(reply.payload),
        401 | 403 => Err(TransportError::Unauthorized {
            status,
            message: String::from_utf8_lossy(&reply.payload).into_owned(),
        }),
        _ => Err(TransportError::Status {
            status,
            message: String::from_utf8_lossy(&reply.payload).into_owned(),
        }),
    }
}

fn is_end_of_feed(msg: &Message) -> bool {
    msg.headers
        .as_ref()
        .is_some_and(|h| h.get(header::OBSERVE_END).is_some())
}

impl<N: RequestClient + SubscribeClient> ReadStore for NatsStore<N> {
    async fn get(
        &self,
        token: &Token,
        path: &str,
        format: ContentFormat,
    ) -> Result<Bytes, TransportError> {
        self.call("GET", path, Some(token), Some(format), Bytes::new())
            .await
    }
}

impl<N: RequestClient + SubscribeClient> WriteStore for NatsStore<N> {
    async fn post(
        &self,
        token: &Token,
        path: &str,
        payload: Bytes,
        format: ContentFormat,
    ) -> Result<Bytes, TransportError> {
        self.call("POST", path, Some(token), Some(format), payload)
            .await
    }
}

impl<N: RequestClient + SubscribeClient> ObserveStore for NatsStore<N> {
    async fn observe(
        &self,
        token: &Token,
        path: &str,
        format: ContentFormat,
    ) -> Result<RawFeed, TransportError> {
        let delivery = self.client.new_inbox();
        let subscription = tokio::time::timeout(self.timeout, self.client.subscribe(delivery.clone()))
            .await
            .map_err(|_| TransportError::Timeout {
                path: path.to_string(),
            })?
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let mut headers = store_headers("OBSERVE", path, Some(token), Some(format));
        headers.insert(header::OBSERVE_SUBJECT, delivery.as_str());
        self.send(path, headers, Bytes::new()).await?;

        info!(path, subject = %delivery, "Observing store path");

        let feed = subscription
            .take_while(|msg| futures::future::ready(!is_end_of_feed(msg)))
            .map(|msg| msg.payload)
            .boxed();
        Ok(feed)
    }
}

impl<N: RequestClient + SubscribeClient> ProbeStore for NatsStore<N> {
    async fn status(&self) -> Result<(), TransportError> {
        debug!(subject = %self.subject, "Probing store status");
        self.call("GET", STATUS_PATH, None, None, Bytes::new())
            .await
            .map(|_| ())
    }
}
