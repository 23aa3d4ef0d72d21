//! Authorization client for the arbiter's `/token` endpoint.

use crate::error::AuthError;
use crate::route::Method;
use crate::token::Token;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const API_KEY_HEADER: &str = "X-Api-Key";

/// Issues capability tokens. Implementations never cache and never retry.
pub trait TokenIssuer: Send + Sync + Clone + 'static {
    fn request_token(
        &self,
        target_host: &str,
        path: &str,
        method: Method,
    ) -> impl Future<Output = Result<Token, AuthError>> + Send;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    target: &'a str,
    path: &'a str,
    method: &'a str,
}

/// [`TokenIssuer`] that asks an arbiter over HTTP(S).
///
/// The caller's credential is base64-encoded once at construction and sent
/// as `X-Api-Key` on every request.
#[derive(Clone)]
pub struct ArbiterClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl ArbiterClient {
    /// Build a client for the arbiter at `endpoint`.
    ///
    /// `root_ca_pem`, when given, is trusted in addition to the system roots.
    /// `timeout` bounds each token request end to end.
    pub fn new(
        endpoint: impl Into<String>,
        credential: &[u8],
        root_ca_pem: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout));

        if let Some(pem) = root_ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| AuthError::Config(format!("invalid root certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| AuthError::Config(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: STANDARD.encode(credential),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn token_url(&self) -> String {
        format!("{}/token", self.endpoint)
    }
}

impl std::fmt::Debug for ArbiterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbiterClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer for ArbiterClient {
    async fn request_token(
        &self,
        target_host: &str,
        path: &str,
        method: Method,
    ) -> Result<Token, AuthError> {
        debug!(target_host, path, %method, "Requesting token from arbiter");

        let body = TokenRequest {
            target: target_host,
            path,
            method: method.as_str(),
        };

        let resp = self
            .http
            .post(self.token_url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if status != StatusCode::OK {
            warn!(target_host, path, %method, status = status.as_u16(), "Arbiter refused token");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(Token::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> ArbiterClient {
        ArbiterClient::new(
            format!("http://{}", server.address()),
            b"arbiter-secret",
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn posts_scope_and_returns_token_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .header("X-Api-Key", STANDARD.encode("arbiter-secret"))
                .json_body(serde_json::json!({
                    "target": "store",
                    "path": "/kv/ds1/temp",
                    "method": "POST"
                }));
            then.status(200).body("macaroon-abc");
        });

        let token = client(&server)
            .request_token("store", "/kv/ds1/temp", Method::Post)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(token.as_str(), "macaroon-abc");
    }

    #[tokio::test]
    async fn non_200_is_rejected_with_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(401).body("Missing API key or token");
        });

        let err = client(&server)
            .request_token("store", "/kv/ds1/temp", Method::Get)
            .await
            .unwrap_err();

        match err {
            AuthError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Missing API key or token");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_2xx_is_still_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(204);
        });

        let err = client(&server)
            .request_token("store", "/cat", Method::Post)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Rejected { status: 204, .. }));
    }

    #[tokio::test]
    async fn unreachable_arbiter_is_request_error() {
        let client = ArbiterClient::new(
            "http://127.0.0.1:1",
            b"secret",
            None,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client
            .request_token("store", "/kv/a/b", Method::Get)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Request(_)));
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let client = ArbiterClient::new(
            "http://arbiter:8080/",
            b"secret",
            None,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://arbiter:8080");
        assert_eq!(client.token_url(), "http://arbiter:8080/token");
    }

    #[test]
    fn debug_hides_api_key() {
        let client = ArbiterClient::new(
            "http://arbiter:8080",
            b"secret",
            None,
            Duration::from_secs(10),
        )
        .unwrap();
        let dbg = format!("{:?}", client);
        assert!(!dbg.contains(&STANDARD.encode("secret")));
    }
}
