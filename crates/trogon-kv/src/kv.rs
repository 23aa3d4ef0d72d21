//! Key-value operations over an authorized store.

use crate::arbiter::{ArbiterClient, TokenIssuer};
use crate::cache::TokenCache;
use crate::catalog::{self, DataSourceMetadata};
use crate::config::StoreConfig;
use crate::error::{DecodeError, ExecuteError, KvError, Result, SetupError};
use crate::executor::{Executor, StoreRequest};
use crate::hrefs;
use crate::nats::NatsStore;
use crate::observe::{Subscription, spawn_relay};
use crate::route::Method;
use crate::transport::{ContentFormat, ObserveStore, ProbeStore, ReadStore, WriteStore};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const CATALOG_PATH: &str = "/cat";

pub fn value_path(data_source_id: &str, key: &str) -> String {
    format!("/kv/{data_source_id}/{key}")
}

pub fn keys_path(data_source_id: &str) -> String {
    format!("/kv/{data_source_id}/keys")
}

pub fn all_keys_path(data_source_id: &str) -> String {
    format!("/kv/{data_source_id}/*")
}

const KEYS_SEGMENT: &str = "keys";
const WILDCARD_SEGMENT: &str = "*";

fn check_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(KvError::InvalidInput(format!("{what} must not be empty")));
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(KvError::InvalidInput(format!(
            "{what} {value:?} must not contain '/' or whitespace"
        )));
    }
    if value == WILDCARD_SEGMENT {
        return Err(KvError::InvalidInput(format!("{what} must not be {value:?}")));
    }
    Ok(())
}

/// Keys share the path level of the key listing and the wildcard observe path.
fn check_key(key: &str) -> Result<()> {
    check_segment("key", key)?;
    if key == KEYS_SEGMENT {
        return Err(KvError::InvalidInput(format!(
            "key {key:?} is reserved for the key listing"
        )));
    }
    Ok(())
}

/// Client for a binary key-value store.
///
/// Every operation is authorized per resource path through the shared token
/// cache. A store rejection drops the cached token and fails the call; the
/// next call re-authorizes.
///
/// Keys may not be `keys` or `*`: `/kv/{ds}/keys` lists keys and
/// `/kv/{ds}/*` observes the whole data source.
#[derive(Clone, Debug)]
pub struct KeyValueClient<I, S> {
    executor: Executor<I, S>,
}

impl KeyValueClient<ArbiterClient, NatsStore<async_nats::Client>> {
    /// Connect to the store over NATS and wire up the arbiter client.
    pub async fn connect(config: &StoreConfig) -> std::result::Result<Self, SetupError> {
        let issuer = ArbiterClient::new(
            config.arbiter_endpoint.clone(),
            config.arbiter_credential(),
            config.root_ca_pem(),
            config.request_timeout,
        )?;
        let client = trogon_nats::connect(&config.nats, config.request_timeout).await?;
        let store = NatsStore::new(client, &config.subject_prefix, config.request_timeout);
        let target_host = hrefs::target_host(&config.store_endpoint)?;

        info!(
            store = %config.store_endpoint,
            arbiter = %config.arbiter_endpoint,
            subject = %store.subject(),
            "Key-value client ready"
        );

        let executor = Executor::new(
            issuer,
            store,
            TokenCache::new(),
            config.store_endpoint.clone(),
            target_host,
        )
        .with_retry_policy(config.retry_policy);
        Ok(Self::new(executor))
    }
}

impl<I, S> KeyValueClient<I, S>
where
    I: TokenIssuer,
    S: ReadStore + WriteStore + ObserveStore + ProbeStore,
{
    pub fn new(executor: Executor<I, S>) -> Self {
        Self { executor }
    }

    pub fn cache(&self) -> &TokenCache {
        self.executor.cache()
    }

    #[instrument(skip(self, payload))]
    pub async fn write(
        &self,
        data_source_id: &str,
        key: &str,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        check_segment("data source id", data_source_id)?;
        check_key(key)?;

        let request = StoreRequest::post(value_path(data_source_id, key), payload, ContentFormat::Binary);
        self.executor
            .execute(&request)
            .await
            .map(|_| ())
            .map_err(KvError::Write)
    }

    /// Read the value at `key`. Sent as GET, authorized as POST.
    #[instrument(skip(self))]
    pub async fn read(&self, data_source_id: &str, key: &str) -> Result<Bytes> {
        check_segment("data source id", data_source_id)?;
        check_key(key)?;

        let request = StoreRequest::get(value_path(data_source_id, key), ContentFormat::Binary)
            .authorized_for(Method::Post);
        self.executor.execute(&request).await.map_err(KvError::Read)
    }

    /// Keys registered under `data_source_id`, in store order.
    #[instrument(skip(self))]
    pub async fn list_keys(&self, data_source_id: &str) -> Result<Vec<String>> {
        check_segment("data source id", data_source_id)?;

        let request = StoreRequest::get(keys_path(data_source_id), ContentFormat::Json);
        let body = self
            .executor
            .execute(&request)
            .await
            .map_err(KvError::ListKeys)?;

        serde_json::from_slice::<Vec<String>>(&body).map_err(|e| {
            debug!(error = %e, body_len = body.len(), "Key list did not decode");
            KvError::Decode(DecodeError::KeyList(e.to_string()))
        })
    }

    /// Stream updates to one key.
    pub async fn observe_key(&self, data_source_id: &str, key: &str) -> Result<Subscription> {
        check_segment("data source id", data_source_id)?;
        check_key(key)?;
        self.open_observation(value_path(data_source_id, key), ContentFormat::Binary)
            .await
    }

    /// Stream updates to every key of a data source.
    pub async fn observe(&self, data_source_id: &str) -> Result<Subscription> {
        check_segment("data source id", data_source_id)?;
        self.open_observation(all_keys_path(data_source_id), ContentFormat::Json)
            .await
    }

    #[instrument(skip(self))]
    async fn open_observation(&self, path: String, format: ContentFormat) -> Result<Subscription> {
        let (route, token) = self
            .executor
            .authorize(&path, Method::Get)
            .await
            .map_err(KvError::Observe)?;

        match self.executor.store().observe(&token, &path, format).await {
            Ok(feed) => Ok(spawn_relay(feed, path)),
            Err(source) if source.is_unauthorized() => {
                self.executor.cache().invalidate(&route);
                warn!(%route, error = %source, "Observe token rejected, cache entry dropped");
                Err(KvError::Observe(ExecuteError::StaleCredential { route, source }))
            }
            Err(source) => Err(KvError::Observe(ExecuteError::Transport(source))),
        }
    }

    /// Register a data source in the store's catalogue.
    #[instrument(skip(self, metadata), fields(data_source_id = %metadata.data_source_id))]
    pub async fn register_datasource(&self, metadata: &DataSourceMetadata) -> Result<()> {
        let base = format!("{}/kv/", self.executor.endpoint().trim_end_matches('/'));
        let document = catalog::hypercat_document(metadata, &base)?;

        let request = StoreRequest::post(CATALOG_PATH, document, ContentFormat::Json);
        self.executor
            .execute(&request)
            .await
            .map(|_| ())
            .map_err(KvError::Register)
    }

    /// Probe the store's status path until it answers, up to `attempts`
    /// times with `interval` between probes.
    pub async fn wait_until_ready(&self, attempts: u32, interval: Duration) -> Result<()> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.executor.store().status().await {
                Ok(()) => {
                    debug!(attempt, "Store is ready");
                    return Ok(());
                }
                Err(source) if attempt >= attempts => {
                    warn!(attempts, error = %source, "Store did not become ready");
                    return Err(KvError::StoreUnavailable { attempts, source });
                }
                Err(e) => {
                    debug!(attempt, error = %e, retry_in_ms = interval.as_millis(), "Store not ready");
                    attempt += 1;
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, ErrorKind};
    use crate::mocks::{MockStore, MockTokenIssuer, StoreOp};
    use crate::transport::TransportError;

    const ENDPOINT: &str = "nats://store:4222";

    fn client(issuer: &MockTokenIssuer, store: &MockStore) -> KeyValueClient<MockTokenIssuer, MockStore> {
        KeyValueClient::new(Executor::new(
            issuer.clone(),
            store.clone(),
            TokenCache::new(),
            ENDPOINT,
            "store",
        ))
    }

    #[tokio::test]
    async fn write_posts_binary_value() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        client(&issuer, &store).write("ds1", "temp", "21.5").await.unwrap();

        let call = &store.requests()[0];
        assert_eq!(call.op, StoreOp::Write);
        assert_eq!(call.path, "/kv/ds1/temp");
        assert_eq!(call.format, ContentFormat::Binary);
        assert_eq!(call.payload, Bytes::from("21.5"));
        assert_eq!(issuer.calls()[0].method, Method::Post);
    }

    #[tokio::test]
    async fn read_shares_write_token() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let kv = client(&issuer, &store);

        kv.write("ds1", "temp", "21.5").await.unwrap();
        let value = kv.read("ds1", "temp").await.unwrap();

        assert_eq!(value, Bytes::from("21.5"));
        assert_eq!(issuer.call_count(), 1);
        assert_eq!(store.requests()[1].verb, Method::Get);
    }

    #[tokio::test]
    async fn read_failure_is_read_error() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let err = client(&issuer, &store).read("ds1", "missing").await.unwrap_err();
        assert!(matches!(err, KvError::Read(ExecuteError::Transport(_))));
    }

    #[tokio::test]
    async fn list_keys_authorizes_get_and_decodes() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        store.set("/kv/ds1/keys", r#"["c","a","b"]"#);

        let keys = client(&issuer, &store).list_keys("ds1").await.unwrap();

        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(issuer.calls()[0].method, Method::Get);
        assert_eq!(store.requests()[0].format, ContentFormat::Json);
    }

    #[tokio::test]
    async fn list_keys_decode_failure_is_distinct() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        store.set("/kv/ds1/keys", "not-json");

        let err = client(&issuer, &store).list_keys("ds1").await.unwrap_err();

        assert!(matches!(err, KvError::Decode(DecodeError::KeyList(_))));
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn list_keys_rejection_invalidates_get_route() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        store.set("/kv/ds1/keys", "[]");
        let kv = client(&issuer, &store);
        kv.list_keys("ds1").await.unwrap();

        store.reject_next(1);
        let err = kv.list_keys("ds1").await.unwrap_err();

        assert!(matches!(err, KvError::ListKeys(ExecuteError::StaleCredential { .. })));
        let route = crate::route::RouteKey::new(ENDPOINT, "/kv/ds1/keys", Method::Get);
        assert!(kv.cache().get(&route).is_none());
    }

    #[tokio::test]
    async fn invalid_segments_are_rejected_before_any_request() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let kv = client(&issuer, &store);

        for err in [
            kv.write("", "k", "v").await.unwrap_err(),
            kv.read("ds", "a/b").await.unwrap_err(),
            kv.list_keys("d s").await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(issuer.call_count(), 0);
        assert!(store.requests().is_empty());
    }

    #[tokio::test]
    async fn reserved_keys_collide_with_listing_and_wildcard() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let kv = client(&issuer, &store);

        for err in [
            kv.write("ds", "keys", "v").await.unwrap_err(),
            kv.write("ds", "*", "v").await.unwrap_err(),
            kv.read("ds", "keys").await.unwrap_err(),
            kv.observe_key("ds", "*").await.unwrap_err(),
            kv.list_keys("*").await.unwrap_err(),
        ] {
            assert!(matches!(err, KvError::InvalidInput(_)));
        }
        assert!(store.requests().is_empty());

        kv.write("keys", "temp", "21").await.unwrap();
        assert_eq!(store.value("/kv/keys/temp"), Some(Bytes::from("21")));
    }

    #[tokio::test]
    async fn observe_key_relays_frames() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let feed = store.feed("/kv/ds1/temp");
        feed.unbounded_send(Bytes::from("1 ds1 temp 20.0")).unwrap();
        drop(feed);

        let mut sub = client(&issuer, &store).observe_key("ds1", "temp").await.unwrap();

        let event = sub.next().await.unwrap().unwrap();
        assert_eq!(event.data, Bytes::from("20.0"));
        assert!(sub.next().await.is_none());
        assert_eq!(issuer.calls()[0].method, Method::Get);
        assert_eq!(store.requests()[0].format, ContentFormat::Binary);
    }

    #[tokio::test]
    async fn observe_uses_wildcard_path_and_json() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let _feed = store.feed("/kv/ds1/*");

        let sub = client(&issuer, &store).observe("ds1").await.unwrap();

        assert_eq!(sub.path(), "/kv/ds1/*");
        assert_eq!(store.requests()[0].format, ContentFormat::Json);
    }

    #[tokio::test]
    async fn observe_authorization_failure_opens_nothing() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        issuer.fail_with(|| AuthError::Rejected {
            status: 401,
            body: "no".into(),
        });

        let err = client(&issuer, &store).observe("ds1").await.unwrap_err();

        assert!(matches!(err, KvError::Observe(ExecuteError::Authorization { .. })));
        assert!(store.requests().is_empty());
    }

    #[tokio::test]
    async fn observe_rejection_invalidates_route() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        store.reject_next(1);
        let kv = client(&issuer, &store);

        let err = kv.observe_key("ds1", "temp").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StaleCredential);
        assert!(kv.cache().is_empty());
    }

    #[tokio::test]
    async fn register_datasource_posts_hypercat_to_catalog() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let metadata = DataSourceMetadata {
            description: "Temperature".into(),
            content_type: "text/plain".into(),
            vendor: "acme".into(),
            data_source_type: "temperature".into(),
            data_source_id: "temp-1".into(),
            store_type: "kv".into(),
            ..Default::default()
        };

        client(&issuer, &store).register_datasource(&metadata).await.unwrap();

        let call = &store.requests()[0];
        assert_eq!(call.path, "/cat");
        assert_eq!(call.format, ContentFormat::Json);
        let doc: serde_json::Value = serde_json::from_slice(&call.payload).unwrap();
        assert_eq!(doc["href"], "nats://store:4222/kv/temp-1");
    }

    #[tokio::test]
    async fn register_datasource_validates_before_authorizing() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        let err = client(&issuer, &store)
            .register_datasource(&DataSourceMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidMetadata("description")));
        assert_eq!(issuer.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_ready_retries_probe() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        store.fail_probes(2);

        client(&issuer, &store)
            .wait_until_ready(5, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(store.probe_count(), 3);
        assert_eq!(issuer.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_ready_gives_up() {
        let (issuer, store) = (MockTokenIssuer::new(), MockStore::new());
        store.fail_probes(10);

        let err = client(&issuer, &store)
            .wait_until_ready(3, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            KvError::StoreUnavailable {
                attempts: 3,
                source: TransportError::Request(_)
            }
        ));
    }
}
