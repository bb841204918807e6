use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use crate::traits::CacheClient;
use crate::traits::CacheRouter;
use crate::types::FetchReply;
use crate::types::StoreReply;
use crate::types::HOT_MISS_TOKEN;

#[derive(Debug, Clone)]
struct StoredValue {
    payload: Arc<Vec<u8>>,
    // Duration::ZERO means "never expires", like a memcached exptime of 0.
    ttl:     Duration,
}

struct StoredValueExpiry;

impl Expiry<String, StoredValue> for StoredValueExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        if value.ttl == Duration::ZERO {
            None
        }
        else {
            Some(value.ttl)
        }
    }
}

/// In-memory cache client with memcached lease semantics.
///
/// Values live in a `moka` cache with per-entry TTL. Leases are tracked per
/// key: the first `lease_get` miss mints a token, every later miss sees the
/// hot-miss sentinel until the token holder writes (or the lease is dropped),
/// and a `lease_set` with a token that no longer names the current lease is
/// refused.
pub struct MemoryClient {
    store:      Cache<String, StoredValue>,
    leases:     Mutex<HashMap<String, u64>>,
    next_token: AtomicU64,
}

impl MemoryClient {
    pub fn new(max_capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            store:      Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(StoredValueExpiry)
                .build(),
            leases:     Mutex::new(HashMap::new()),
            // Token 1 is reserved for the hot-miss sentinel.
            next_token: AtomicU64::new(HOT_MISS_TOKEN + 1),
        })
    }

    /// Drop an outstanding lease, releasing the key to the next requester.
    pub fn drop_lease(&self, key: &str) {
        self.leases.lock().unwrap().remove(key);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    fn ttl_duration(ttl: i32) -> Duration {
        Duration::from_secs(ttl.max(0) as u64)
    }
}

#[async_trait]
impl CacheClient for MemoryClient {
    type Error = Infallible;

    async fn get(&self, key: &str) -> Result<FetchReply, Infallible> {
        Ok(match self.store.get(key).await {
            Some(value) => FetchReply::hit(value.payload.as_ref().clone()),
            None => FetchReply::miss(),
        })
    }

    async fn lease_get(&self, key: &str) -> Result<FetchReply, Infallible> {
        if let Some(value) = self.store.get(key).await {
            return Ok(FetchReply::hit(value.payload.as_ref().clone()));
        }

        let mut leases = self.leases.lock().unwrap();
        Ok(if leases.contains_key(key) {
            FetchReply::lease_miss(HOT_MISS_TOKEN)
        }
        else {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            leases.insert(key.to_string(), token);
            FetchReply::lease_miss(token)
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: i32) -> Result<StoreReply, Infallible> {
        self.store
            .insert(
                key.to_string(),
                StoredValue {
                    payload: Arc::new(value),
                    ttl:     Self::ttl_duration(ttl),
                },
            )
            .await;
        // An unconditional store supersedes whatever lease was outstanding.
        self.leases.lock().unwrap().remove(key);
        Ok(StoreReply { stored: true })
    }

    async fn lease_set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: i32,
        lease_token: u64,
    ) -> Result<StoreReply, Infallible> {
        {
            let mut leases = self.leases.lock().unwrap();
            match leases.get(key) {
                Some(&token) if token == lease_token => {
                    leases.remove(key);
                }
                // The token no longer names the current lease: refuse the
                // write instead of clobbering a newer value.
                _ => return Ok(StoreReply { stored: false }),
            }
        }

        self.store
            .insert(
                key.to_string(),
                StoredValue {
                    payload: Arc::new(value),
                    ttl:     Self::ttl_duration(ttl),
                },
            )
            .await;
        Ok(StoreReply { stored: true })
    }
}

/// Router handing out one shared [`MemoryClient`], so sibling routes of one
/// flavor see the same cache.
pub struct MemoryRouter {
    client: Arc<MemoryClient>,
}

impl MemoryRouter {
    pub fn new(max_capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            client: MemoryClient::new(max_capacity),
        })
    }

    pub fn client(&self) -> Arc<MemoryClient> {
        Arc::clone(&self.client)
    }
}

impl CacheRouter for MemoryRouter {
    type Client = MemoryClient;
    type Error = Infallible;

    fn create_client(&self) -> Result<Arc<MemoryClient>, Infallible> {
        Ok(Arc::clone(&self.client))
    }
}
