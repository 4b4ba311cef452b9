use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;

use super::{GatewayError, ObjectStoreGateway};
use crate::types::ObjectMeta;

/// An in-memory object store for tests and local development. Fault switches let a test stand in for a flaky
/// network: listings can be failed wholesale and individual keys can be made unfetchable. Fetch counts are recorded
/// so tests can assert that the polling engine never fetched an object it should have skipped.
#[derive(Clone)]
pub struct MemoryGateway {
    bucket: String,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    fail_listing: bool,
    failing_keys: HashSet<String>,
    fetch_counts: BTreeMap<String, usize>,
}

struct StoredObject {
    bytes: Vec<u8>,
    meta: ObjectMeta,
}

impl MemoryGateway {
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self { bucket: bucket.into(), inner: Arc::new(Mutex::new(Inner::default())) }
    }

    pub fn put_object<K: Into<String>>(&self, key: K, bytes: Vec<u8>) {
        let key = key.into();
        let meta = ObjectMeta {
            key: key.clone(),
            size: bytes.len() as i64,
            last_modified: Some(Utc::now()),
            etag: Some(format!("\"mem-{}\"", bytes.len())),
        };
        self.inner.lock().unwrap().objects.insert(key, StoredObject { bytes, meta });
    }

    pub fn remove_object(&self, key: &str) {
        self.inner.lock().unwrap().objects.remove(key);
    }

    /// While set, every listing fails with a transport error.
    pub fn set_listing_failure(&self, fail: bool) {
        self.inner.lock().unwrap().fail_listing = fail;
    }

    /// While set, fetching the given key fails with a transport error even though it appears in listings.
    pub fn set_fetch_failure(&self, key: &str, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.failing_keys.insert(key.to_string());
        } else {
            inner.failing_keys.remove(key);
        }
    }

    /// How many times a key has been fetched (successfully or not).
    pub fn fetch_count(&self, key: &str) -> usize {
        self.inner.lock().unwrap().fetch_counts.get(key).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.inner.lock().unwrap().fetch_counts.values().sum()
    }
}

#[async_trait]
impl ObjectStoreGateway for MemoryGateway {
    async fn list_objects(&self) -> Result<Vec<ObjectMeta>, GatewayError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_listing {
            return Err(GatewayError::Transport("simulated listing failure".to_string()));
        }
        Ok(inner.objects.values().map(|o| o.meta.clone()).collect())
    }

    async fn fetch_object(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.fetch_counts.entry(key.to_string()).or_insert(0) += 1;
        if inner.failing_keys.contains(key) {
            return Err(GatewayError::Transport(format!("simulated fetch failure for '{key}'")));
        }
        inner.objects.get(key).map(|o| o.bytes.clone()).ok_or_else(|| GatewayError::NotFound(key.to_string()))
    }

    async fn check_connectivity(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
