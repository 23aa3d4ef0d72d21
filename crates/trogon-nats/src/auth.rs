use std::path::PathBuf;
use trogon_std::env::ReadEnv;

const ENV_NATS_URL: &str = "NATS_URL";
const ENV_NATS_CREDS: &str = "NATS_CREDS";
const ENV_NATS_TOKEN: &str = "NATS_TOKEN";
const ENV_NATS_TLS_ROOT_CA: &str = "NATS_TLS_ROOT_CA";

const DEFAULT_NATS_URL: &str = "localhost:4222";

/// NATS authentication method.
///
/// When resolved from environment variables, a credentials file
/// (`NATS_CREDS`) wins over a token (`NATS_TOKEN`); with neither set the
/// connection is anonymous.
#[derive(Debug, Clone)]
pub enum NatsAuth {
    Credentials(PathBuf),
    Token(String),
    None,
}

impl NatsAuth {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "credentials file",
            Self::Token(_) => "token",
            Self::None => "none",
        }
    }

    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        if let Some(creds_path) = env.non_empty_var(ENV_NATS_CREDS) {
            return Self::Credentials(PathBuf::from(creds_path));
        }
        if let Some(token) = env.non_empty_var(ENV_NATS_TOKEN) {
            return Self::Token(token);
        }
        Self::None
    }
}

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    pub auth: NatsAuth,
    /// PEM file with the root certificate(s) the server chain must lead to.
    /// When set the connection requires TLS.
    pub tls_root_ca: Option<PathBuf>,
    /// Client name reported to the server.
    pub name: Option<String>,
}

impl NatsConfig {
    pub fn new(servers: Vec<String>, auth: NatsAuth) -> Self {
        Self {
            servers,
            auth,
            tls_root_ca: None,
            name: None,
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new(vec![url.into()], NatsAuth::None)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tls_root_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_root_ca = Some(path.into());
        self
    }

    /// Build config from environment variables.
    ///
    /// - `NATS_URL`: comma-separated server list (default: `localhost:4222`)
    /// - `NATS_CREDS` > `NATS_TOKEN` > none
    /// - `NATS_TLS_ROOT_CA`: optional trust root
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        let raw = env
            .non_empty_var(ENV_NATS_URL)
            .unwrap_or_else(|| DEFAULT_NATS_URL.to_string());
        Self {
            servers: split_servers(&raw),
            auth: NatsAuth::from_env(env),
            tls_root_ca: env.non_empty_var(ENV_NATS_TLS_ROOT_CA).map(PathBuf::from),
            name: None,
        }
    }
}

fn split_servers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
