//! In-memory [`TokenCache`] backed by `Arc<Mutex<HashMap>>`.

use crate::route::RouteKey;
use crate::token::Token;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Route-keyed token store owned by one client.
///
/// Clones share the same map, so the executor and the observe path see the
/// same entries. Holds at most one token per [`RouteKey`].
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<HashMap<RouteKey, Token>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, route: &RouteKey) -> Option<Token> {
        self.inner.lock().unwrap().get(route).cloned()
    }

    /// Insert or overwrite the token for `route`.
    pub fn put(&self, route: RouteKey, token: Token) {
        self.inner.lock().unwrap().insert(route, token);
    }

    /// Drop the entry for `route`. A no-op when nothing is cached.
    ///
    /// Unconditional: whichever token is current gets removed, even one
    /// stored by a concurrent caller after this caller's failure.
    pub fn invalidate(&self, route: &RouteKey) {
        self.inner.lock().unwrap().remove(route);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Method;

    fn route(path: &str, method: Method) -> RouteKey {
        RouteKey::new("nats://store:4222", path, method)
    }

    #[test]
    fn get_on_empty_cache_returns_none() {
        let cache = TokenCache::new();
        assert!(cache.get(&route("/kv/a/b", Method::Get)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn put_then_get_returns_token() {
        let cache = TokenCache::new();
        cache.put(route("/kv/a/b", Method::Post), Token::new("t1"));
        assert_eq!(
            cache.get(&route("/kv/a/b", Method::Post)),
            Some(Token::new("t1"))
        );
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let cache = TokenCache::new();
        let key = route("/kv/a/b", Method::Post);
        cache.put(key.clone(), Token::new("old"));
        cache.put(key.clone(), Token::new("new"));
        assert_eq!(cache.get(&key), Some(Token::new("new")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn methods_do_not_share_entries() {
        let cache = TokenCache::new();
        cache.put(route("/kv/a/b", Method::Post), Token::new("post"));
        assert!(cache.get(&route("/kv/a/b", Method::Get)).is_none());
    }

    #[test]
    fn invalidate_is_idempotent() {
        let cache = TokenCache::new();
        let key = route("/kv/a/b", Method::Get);
        cache.put(key.clone(), Token::new("t"));
        cache.invalidate(&key);
        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn clones_share_state() {
        let cache = TokenCache::new();
        let clone = cache.clone();
        clone.put(route("/cat", Method::Post), Token::new("t"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn debug_hides_tokens() {
        let cache = TokenCache::new();
        cache.put(route("/cat", Method::Post), Token::new("secret"));
        let dbg = format!("{:?}", cache);
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("entries: 1"));
    }
}
