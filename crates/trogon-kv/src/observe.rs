//! Observation relay.
//!
//! A relay task owns the raw feed of one subscription. It decodes each frame
//! into an [`UpdateEvent`] and forwards it on a capacity-1 channel, so a
//! slow consumer holds the relay back instead of growing a buffer. The
//! channel closes after the last frame once the feed ends, or as soon as the
//! caller closes or drops its [`Subscription`].

use crate::error::DecodeError;
use crate::transport::RawFeed;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info_span, warn};

/// One value change delivered by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub timestamp_ms: i64,
    pub data_source_id: String,
    pub key: String,
    pub data: Bytes,
}

/// Decode a raw frame: `<timestamp_ms> <data_source_id> <key> <payload>`.
///
/// The payload is everything after the third space, spaces included, and
/// may be empty. The other fields may not.
pub fn parse_frame(frame: &[u8]) -> Result<UpdateEvent, DecodeError> {
    let mut parts = frame.splitn(4, |b| *b == b' ');

    let timestamp = next_field(&mut parts, "timestamp")?;
    let timestamp_ms = timestamp
        .parse::<i64>()
        .map_err(|_| DecodeError::Frame(format!("invalid timestamp {timestamp:?}")))?;
    let data_source_id = next_field(&mut parts, "data source id")?.to_string();
    let key = next_field(&mut parts, "key")?.to_string();
    let data = parts
        .next()
        .map(Bytes::copy_from_slice)
        .unwrap_or_default();

    Ok(UpdateEvent {
        timestamp_ms,
        data_source_id,
        key,
        data,
    })
}

fn next_field<'a>(
    parts: &mut impl Iterator<Item = &'a [u8]>,
    name: &str,
) -> Result<&'a str, DecodeError> {
    let raw = parts
        .next()
        .ok_or_else(|| DecodeError::Frame(format!("missing {name}")))?;
    if raw.is_empty() {
        return Err(DecodeError::Frame(format!("empty {name}")));
    }
    std::str::from_utf8(raw).map_err(|_| DecodeError::Frame(format!("{name} is not UTF-8")))
}

pub type ObserveItem = Result<UpdateEvent, DecodeError>;

/// Caller's handle on a running relay.
///
/// Yields events in feed order; a frame that fails to decode shows up as an
/// `Err` item and the relay carries on. Dropping the handle stops the relay.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<ObserveItem>,
    cancel: Option<oneshot::Sender<()>>,
    path: String,
}

impl Subscription {
    /// Wait for the next item. `None` once the relay has stopped and every
    /// item sent before that has been received.
    pub async fn next(&mut self) -> Option<ObserveItem> {
        self.events.recv().await
    }

    /// Stop the relay. Items it already handed over can still be received.
    pub fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Stream for Subscription {
    type Item = ObserveItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Spawn the relay task for `feed` and return its handle.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_relay(mut feed: RawFeed, path: impl Into<String>) -> Subscription {
    let path = path.into();
    let (tx, rx) = mpsc::channel::<ObserveItem>(1);
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let span = info_span!("observe_relay", path = %path);
    tokio::spawn(
        async move {
            let mut relayed = 0u64;
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        debug!(relayed, "Observation cancelled");
                        break;
                    }
                    frame = feed.next() => frame,
                };

                let Some(frame) = frame else {
                    debug!(relayed, "Feed ended, closing subscription");
                    break;
                };

                let item = parse_frame(&frame);
                if let Err(e) = &item {
                    warn!(error = %e, frame_len = frame.len(), "Undecodable update frame");
                }

                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        debug!(relayed, "Observation cancelled while delivering");
                        break;
                    }
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            debug!(relayed, "Subscriber went away");
                            break;
                        }
                    }
                }
                relayed += 1;
            }
        }
        .instrument(span),
    );

    Subscription {
        events: rx,
        cancel: Some(cancel_tx),
        path,
    }
}
