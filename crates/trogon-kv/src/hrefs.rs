//! Helpers for data source hrefs such as `tcp://store:5555/ds1`.

use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HrefError {
    #[error("invalid href {href:?}: {reason}")]
    Invalid { href: String, reason: String },

    #[error("href {0:?} has no host")]
    MissingHost(String),
}

fn parse(href: &str) -> Result<Url, HrefError> {
    Url::parse(href).map_err(|e| HrefError::Invalid {
        href: href.to_string(),
        reason: e.to_string(),
    })
}

/// Base store URL (`scheme://host[:port]`) of a data source href.
pub fn store_url_from_ds_href(href: &str) -> Result<String, HrefError> {
    let url = parse(href)?;
    let host = url
        .host_str()
        .ok_or_else(|| HrefError::MissingHost(href.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Data source id carried in the path of a data source href.
pub fn data_source_id_from_ds_href(href: &str) -> Result<String, HrefError> {
    Ok(parse(href)?.path().replace('/', ""))
}

/// Host name, without port, the arbiter scopes tokens for this endpoint to.
pub fn target_host(endpoint: &str) -> Result<String, HrefError> {
    parse(endpoint)?
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| HrefError::MissingHost(endpoint.to_string()))
}
