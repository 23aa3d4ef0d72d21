//! In-process doubles for the arbiter and the store.
//!
//! Enabled with the `test-support` feature.

use crate::arbiter::TokenIssuer;
use crate::error::AuthError;
use crate::route::Method;
use crate::token::Token;
use crate::transport::{ContentFormat, ObserveStore, ProbeStore, RawFeed, ReadStore, TransportError, WriteStore};
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A token request seen by [`MockTokenIssuer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCall {
    pub target_host: String,
    pub path: String,
    pub method: Method,
}

type AuthFailure = Arc<dyn Fn() -> AuthError + Send + Sync>;

/// Issues `token-1`, `token-2`, ... and records every call.
#[derive(Clone, Default)]
pub struct MockTokenIssuer {
    calls: Arc<Mutex<Vec<TokenCall>>>,
    issued: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<AuthFailure>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockTokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every following request with the error built by `failure`.
    pub fn fail_with<F>(&self, failure: F)
    where
        F: Fn() -> AuthError + Send + Sync + 'static,
    {
        *self.failure.lock().unwrap() = Some(Arc::new(failure));
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Hold each token for `delay` before returning it.
    pub fn delay_tokens(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<TokenCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl TokenIssuer for MockTokenIssuer {
    async fn request_token(
        &self,
        target_host: &str,
        path: &str,
        method: Method,
    ) -> Result<Token, AuthError> {
        self.calls.lock().unwrap().push(TokenCall {
            target_host: target_host.to_string(),
            path: path.to_string(),
            method,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().unwrap().clone();
        if let Some(failure) = failure {
            return Err(failure());
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Token::new(format!("token-{n}")))
    }
}

/// Which store operation a [`StoreCall`] was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Read,
    Write,
    Observe,
}

/// A store request seen by [`MockStore`].
#[derive(Debug, Clone)]
pub struct StoreCall {
    pub op: StoreOp,
    pub verb: Method,
    pub path: String,
    pub format: ContentFormat,
    pub token: Token,
    pub payload: Bytes,
}

#[derive(Default)]
struct StoreState {
    values: BTreeMap<String, Bytes>,
    calls: Vec<StoreCall>,
    rejections: usize,
    failures: VecDeque<TransportError>,
    feeds: HashMap<String, mpsc::UnboundedReceiver<Bytes>>,
    probe_failures: usize,
    probes: usize,
}

/// Key-value store kept in memory.
///
/// Writes to `/kv/{ds}/{key}` are readable back from the same path and are
/// listed, sorted, by `/kv/{ds}/keys`. Values seeded with [`MockStore::set`]
/// are returned verbatim, which also overrides the computed key list.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &str, value: impl Into<Bytes>) {
        self.state
            .lock()
            .unwrap()
            .values
            .insert(path.to_string(), value.into());
    }

    pub fn value(&self, path: &str) -> Option<Bytes> {
        self.state.lock().unwrap().values.get(path).cloned()
    }

    /// Answer the next `count` requests with 403.
    pub fn reject_next(&self, count: usize) {
        self.state.lock().unwrap().rejections = count;
    }

    /// Fail the next request with `error`. Queued failures apply in order.
    pub fn fail_next(&self, error: TransportError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// Register the raw frames for the next observe on `path`.
    pub fn feed(&self, path: &str) -> mpsc::UnboundedSender<Bytes> {
        let (tx, rx) = mpsc::unbounded();
        self.state
            .lock()
            .unwrap()
            .feeds
            .insert(path.to_string(), rx);
        tx
    }

    /// Fail the next `count` readiness probes.
    pub fn fail_probes(&self, count: usize) {
        self.state.lock().unwrap().probe_failures = count;
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().unwrap().probes
    }

    pub fn requests(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: StoreCall) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);

        if state.rejections > 0 {
            state.rejections -= 1;
            return Err(TransportError::Unauthorized {
                status: 403,
                message: "token rejected".to_string(),
            });
        }
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn key_list(values: &BTreeMap<String, Bytes>, keys_path: &str) -> Option<Bytes> {
        let prefix = keys_path.strip_suffix("keys")?;
        let keys: Vec<&str> = values
            .keys()
            .filter_map(|p| p.strip_prefix(prefix))
            .filter(|k| !k.is_empty() && !k.contains('/'))
            .collect();
        serde_json::to_vec(&keys).ok().map(Bytes::from)
    }
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("MockStore")
            .field("values", &state.values.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl ReadStore for MockStore {
    async fn get(
        &self,
        token: &Token,
        path: &str,
        format: ContentFormat,
    ) -> Result<Bytes, TransportError> {
        self.record(StoreCall {
            op: StoreOp::Read,
            verb: Method::Get,
            path: path.to_string(),
            format,
            token: token.clone(),
            payload: Bytes::new(),
        })?;

        let state = self.state.lock().unwrap();
        if let Some(value) = state.values.get(path) {
            return Ok(value.clone());
        }
        if path.ends_with("/keys")
            && let Some(list) = Self::key_list(&state.values, path)
        {
            return Ok(list);
        }
        Err(TransportError::Status {
            status: 404,
            message: format!("no value at {path}"),
        })
    }
}

impl WriteStore for MockStore {
    async fn post(
        &self,
        token: &Token,
        path: &str,
        payload: Bytes,
        format: ContentFormat,
    ) -> Result<Bytes, TransportError> {
        self.record(StoreCall {
            op: StoreOp::Write,
            verb: Method::Post,
            path: path.to_string(),
            format,
            token: token.clone(),
            payload: payload.clone(),
        })?;

        self.state
            .lock()
            .unwrap()
            .values
            .insert(path.to_string(), payload);
        Ok(Bytes::new())
    }
}

impl ObserveStore for MockStore {
    async fn observe(
        &self,
        token: &Token,
        path: &str,
        format: ContentFormat,
    ) -> Result<RawFeed, TransportError> {
        self.record(StoreCall {
            op: StoreOp::Observe,
            verb: Method::Get,
            path: path.to_string(),
            format,
            token: token.clone(),
            payload: Bytes::new(),
        })?;

        self.state
            .lock()
            .unwrap()
            .feeds
            .remove(path)
            .map(|rx| rx.boxed())
            .ok_or_else(|| TransportError::Status {
                status: 404,
                message: format!("nothing to observe at {path}"),
            })
    }
}

impl ProbeStore for MockStore {
    async fn status(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.probes += 1;
        if state.probe_failures > 0 {
            state.probe_failures -= 1;
            return Err(TransportError::Request("no responders".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issuer_numbers_tokens() {
        let issuer = MockTokenIssuer::new();
        let a = issuer.request_token("h", "/a", Method::Get).await.unwrap();
        let b = issuer.request_token("h", "/b", Method::Post).await.unwrap();
        assert_eq!(a.as_str(), "token-1");
        assert_eq!(b.as_str(), "token-2");
        assert_eq!(issuer.calls()[1].method, Method::Post);
    }

    #[tokio::test]
    async fn issuer_failure_can_be_cleared() {
        let issuer = MockTokenIssuer::new();
        issuer.fail_with(|| AuthError::Request("down".into()));
        assert!(issuer.request_token("h", "/a", Method::Get).await.is_err());
        issuer.succeed();
        assert!(issuer.request_token("h", "/a", Method::Get).await.is_ok());
    }

    #[tokio::test]
    async fn store_lists_only_direct_keys_of_datasource() {
        let store = MockStore::new();
        let token = Token::new("t");
        for path in ["/kv/ds/b", "/kv/ds/a", "/kv/other/x"] {
            store
                .post(&token, path, Bytes::from("v"), ContentFormat::Binary)
                .await
                .unwrap();
        }

        let list = store
            .get(&token, "/kv/ds/keys", ContentFormat::Json)
            .await
            .unwrap();

        assert_eq!(list, Bytes::from(r#"["a","b"]"#));
    }

    #[tokio::test]
    async fn missing_value_is_not_found() {
        let store = MockStore::new();
        let err = store
            .get(&Token::new("t"), "/kv/ds/nope", ContentFormat::Binary)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn probes_fail_then_succeed() {
        let store = MockStore::new();
        store.fail_probes(1);
        assert!(store.status().await.is_err());
        assert!(store.status().await.is_ok());
        assert_eq!(store.probe_count(), 2);
    }
}
