//! Authorized store requests.
//!
//! The [`Executor`] pairs every store call with a token: cached when one
//! exists for the route, freshly issued otherwise. When the store rejects the
//! token the cache entry is dropped before the error is returned, so the next
//! call on that route re-authorizes.

use crate::arbiter::TokenIssuer;
use crate::cache::TokenCache;
use crate::error::ExecuteError;
use crate::route::{Method, RouteKey};
use crate::token::Token;
use crate::transport::{ContentFormat, ReadStore, WriteStore};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One store call plus the method its token must be issued for.
///
/// The two methods usually match. Reads are the exception: they are sent as
/// GET but authorized as POST.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    path: String,
    verb: Method,
    auth_method: Method,
    format: ContentFormat,
    body: Bytes,
}

impl StoreRequest {
    pub fn get(path: impl Into<String>, format: ContentFormat) -> Self {
        Self {
            path: path.into(),
            verb: Method::Get,
            auth_method: Method::Get,
            format,
            body: Bytes::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>, format: ContentFormat) -> Self {
        Self {
            path: path.into(),
            verb: Method::Post,
            auth_method: Method::Post,
            format,
            body: body.into(),
        }
    }

    /// Request the token for `method` instead of the verb being sent.
    pub fn authorized_for(mut self, method: Method) -> Self {
        self.auth_method = method;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn verb(&self) -> Method {
        self.verb
    }

    pub fn auth_method(&self) -> Method {
        self.auth_method
    }
}

/// How many times a rejected token is replaced and the request resent.
///
/// Only stale-credential failures are retried; authorization and transport
/// failures always return on the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn exponential(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based): doubles each time,
    /// capped at the maximum backoff.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Clone)]
pub struct Executor<I, S> {
    issuer: I,
    store: S,
    cache: TokenCache,
    endpoint: String,
    target_host: String,
    retry: RetryPolicy,
}

impl<I, S> std::fmt::Debug for Executor<I, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("endpoint", &self.endpoint)
            .field("target_host", &self.target_host)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<I: TokenIssuer, S> Executor<I, S> {
    /// `endpoint` prefixes every path when deriving route keys; `target_host`
    /// is the host the arbiter scopes tokens to.
    pub fn new(
        issuer: I,
        store: S,
        cache: TokenCache,
        endpoint: impl Into<String>,
        target_host: impl Into<String>,
    ) -> Self {
        Self {
            issuer,
            store,
            cache,
            endpoint: endpoint.into(),
            target_host: target_host.into(),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn route(&self, path: &str, method: Method) -> RouteKey {
        RouteKey::new(&self.endpoint, path, method)
    }

    /// Return the cached token for (`path`, `method`), requesting and caching
    /// a new one on a miss.
    pub async fn authorize(
        &self,
        path: &str,
        method: Method,
    ) -> Result<(RouteKey, Token), ExecuteError> {
        let route = self.route(path, method);
        if let Some(token) = self.cache.get(&route) {
            return Ok((route, token));
        }

        debug!(%route, "Token not cached, requesting one");
        match self
            .issuer
            .request_token(&self.target_host, path, method)
            .await
        {
            Ok(token) => {
                self.cache.put(route.clone(), token.clone());
                Ok((route, token))
            }
            Err(source) => {
                warn!(%route, error = %source, "Authorization failed");
                Err(ExecuteError::Authorization { route, source })
            }
        }
    }
}

impl<I: TokenIssuer, S: ReadStore + WriteStore> Executor<I, S> {
    #[instrument(
        skip(self, request),
        fields(path = %request.path, verb = %request.verb, auth = %request.auth_method)
    )]
    pub async fn execute(&self, request: &StoreRequest) -> Result<Bytes, ExecuteError> {
        let mut retries = 0u32;

        loop {
            let (route, token) = self.authorize(&request.path, request.auth_method).await?;

            let result = match request.verb {
                Method::Get => self.store.get(&token, &request.path, request.format).await,
                Method::Post => {
                    self.store
                        .post(&token, &request.path, request.body.clone(), request.format)
                        .await
                }
            };

            match result {
                Ok(reply) => return Ok(reply),
                Err(source) if source.is_unauthorized() => {
                    self.cache.invalidate(&route);

                    if retries < self.retry.max_retries {
                        retries += 1;
                        let delay = self.retry.backoff(retries);
                        warn!(
                            %route,
                            retry = retries,
                            max_retries = self.retry.max_retries,
                            delay_ms = delay.as_millis(),
                            "Token rejected, re-authorizing"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    warn!(%route, error = %source, "Token rejected, cache entry dropped");
                    return Err(ExecuteError::StaleCredential { route, source });
                }
                Err(source) => {
                    debug!(%route, error = %source, "Store request failed");
                    return Err(ExecuteError::Transport(source));
                }
            }
        }
    }
}
