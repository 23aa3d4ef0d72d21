//! Token cache keys.

use std::fmt;

/// Method a token is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one cached token: the absolute resource href plus the method
/// the token was granted for.
///
/// The href is upper-cased so that `tcp://Store:5555/kv/a/b` and
/// `tcp://store:5555/kv/a/b` share a slot. Different methods on the same href
/// never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    href: String,
    method: Method,
}

impl RouteKey {
    pub fn new(endpoint: &str, path: &str, method: Method) -> Self {
        let href = format!("{}{}", endpoint.trim_end_matches('/'), path);
        Self {
            href: href.to_uppercase(),
            method,
        }
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn method(&self) -> Method {
        self.method
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "nats://store:4222";

    #[test]
    fn same_path_and_method_give_equal_keys() {
        let a = RouteKey::new(ENDPOINT, "/kv/ds1/temp", Method::Post);
        let b = RouteKey::new(ENDPOINT, "/kv/ds1/temp", Method::Post);
        assert_eq!(a, b);
    }

    #[test]
    fn different_methods_give_distinct_keys() {
        let post = RouteKey::new(ENDPOINT, "/kv/ds1/temp", Method::Post);
        let get = RouteKey::new(ENDPOINT, "/kv/ds1/temp", Method::Get);
        assert_ne!(post, get);
        assert_eq!(post.href(), get.href());
        assert_eq!((post.method(), get.method()), (Method::Post, Method::Get));
    }

    #[test]
    fn href_case_is_normalized() {
        let lower = RouteKey::new(ENDPOINT, "/kv/ds1/temp", Method::Get);
        let upper = RouteKey::new("NATS://STORE:4222", "/KV/DS1/TEMP", Method::Get);
        assert_eq!(lower, upper);
        assert_eq!(lower.href(), "NATS://STORE:4222/KV/DS1/TEMP");
    }

    #[test]
    fn trailing_slash_on_endpoint_is_ignored() {
        let a = RouteKey::new("nats://store:4222/", "/cat", Method::Post);
        let b = RouteKey::new(ENDPOINT, "/cat", Method::Post);
        assert_eq!(a, b);
    }

    #[test]
    fn display_shows_method_then_href() {
        let key = RouteKey::new(ENDPOINT, "/cat", Method::Post);
        assert_eq!(key.to_string(), "POST NATS://STORE:4222/CAT");
    }
}
