use crate::executor::RetryPolicy;
use crate::hrefs::{self, HrefError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use trogon_nats::NatsConfig;
use trogon_std::env::ReadEnv;
use trogon_std::fs::ReadFile;

const ENV_STORE_ENDPOINT: &str = "KV_STORE_ENDPOINT";
const ENV_ARBITER_ENDPOINT: &str = "KV_ARBITER_ENDPOINT";
const ENV_LOCAL_NAME: &str = "KV_LOCAL_NAME";
const ENV_ARBITER_TOKEN_FILE: &str = "KV_ARBITER_TOKEN_FILE";
const ENV_ROOT_CA_FILE: &str = "KV_ROOT_CA_FILE";
const ENV_SUBJECT_PREFIX: &str = "KV_SUBJECT_PREFIX";
const ENV_REQUEST_TIMEOUT_SECS: &str = "KV_REQUEST_TIMEOUT_SECS";

const DEFAULT_ARBITER_TOKEN_FILE: &str = "/run/secrets/ARBITER_TOKEN";
const DEFAULT_SUBJECT_PREFIX: &str = "kv";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_TIMEOUT_SECS: u64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid store endpoint: {0}")]
    InvalidEndpoint(#[from] HrefError),
}

/// Everything needed to reach the store and the arbiter.
#[derive(Clone)]
pub struct StoreConfig {
    pub store_endpoint: String,
    pub arbiter_endpoint: String,
    pub local_name: String,
    pub subject_prefix: String,
    /// Bound on every store request, token request and subscription open.
    pub request_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub nats: NatsConfig,
    arbiter_credential: Vec<u8>,
    root_ca_pem: Option<Vec<u8>>,
}

impl StoreConfig {
    pub fn new(
        store_endpoint: impl Into<String>,
        arbiter_endpoint: impl Into<String>,
        local_name: impl Into<String>,
        arbiter_credential: impl Into<Vec<u8>>,
    ) -> Self {
        let store_endpoint = store_endpoint.into();
        let local_name = local_name.into();
        Self {
            nats: NatsConfig::from_url(store_endpoint.clone()).with_name(local_name.clone()),
            store_endpoint,
            arbiter_endpoint: arbiter_endpoint.into(),
            local_name,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::none(),
            arbiter_credential: arbiter_credential.into(),
            root_ca_pem: None,
        }
    }

    /// Load from `KV_*` variables, reading the arbiter credential and the
    /// optional root CA through `fs`. NATS authentication comes from
    /// `NATS_CREDS` / `NATS_TOKEN`; the server is always the store endpoint.
    pub fn from_env<E: ReadEnv, F: ReadFile>(env: &E, fs: &F) -> Result<Self, ConfigError> {
        let store_endpoint = required(env, ENV_STORE_ENDPOINT)?;
        let arbiter_endpoint = required(env, ENV_ARBITER_ENDPOINT)?;
        let local_name = required(env, ENV_LOCAL_NAME)?;
        hrefs::target_host(&store_endpoint)?;

        let token_file = env
            .non_empty_var(ENV_ARBITER_TOKEN_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARBITER_TOKEN_FILE));
        let credential = read(fs, &token_file)?;

        let mut config = Self::new(store_endpoint, arbiter_endpoint, local_name, credential);

        let mut nats = NatsConfig::from_env(env);
        nats.servers = vec![config.store_endpoint.clone()];
        config.nats = nats.with_name(config.local_name.clone());

        if let Some(ca_file) = env.non_empty_var(ENV_ROOT_CA_FILE).map(PathBuf::from) {
            config.root_ca_pem = Some(read(fs, &ca_file)?);
            if config.nats.tls_root_ca.is_none() {
                config.nats = config.nats.with_tls_root_ca(ca_file);
            }
        }

        if let Some(prefix) = env.non_empty_var(ENV_SUBJECT_PREFIX) {
            config.subject_prefix = prefix;
        }

        if let Ok(raw) = env.var(ENV_REQUEST_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs >= MIN_TIMEOUT_SECS => {
                    config.request_timeout = Duration::from_secs(secs);
                }
                Ok(secs) => {
                    warn!(
                        "{ENV_REQUEST_TIMEOUT_SECS}={secs} is below minimum ({MIN_TIMEOUT_SECS}), using default"
                    );
                }
                Err(_) => {
                    warn!("{ENV_REQUEST_TIMEOUT_SECS}={raw:?} is not a valid integer, using default");
                }
            }
        }

        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_root_ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_ca_pem = Some(pem.into());
        self
    }

    /// Raw contents of the arbiter token file.
    pub fn arbiter_credential(&self) -> &[u8] {
        &self.arbiter_credential
    }

    pub fn root_ca_pem(&self) -> Option<&[u8]> {
        self.root_ca_pem.as_deref()
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("store_endpoint", &self.store_endpoint)
            .field("arbiter_endpoint", &self.arbiter_endpoint)
            .field("local_name", &self.local_name)
            .field("subject_prefix", &self.subject_prefix)
            .field("request_timeout", &self.request_timeout)
            .field("retry_policy", &self.retry_policy)
            .field("nats", &self.nats)
            .field("root_ca", &self.root_ca_pem.is_some())
            .finish_non_exhaustive()
    }
}

fn required<E: ReadEnv>(env: &E, key: &'static str) -> Result<String, ConfigError> {
    env.non_empty_var(key).ok_or(ConfigError::Missing(key))
}

fn read<F: ReadFile>(fs: &F, path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs.read(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}
