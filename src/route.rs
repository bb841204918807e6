use async_trait::async_trait;
use fieldx_plus::fx_plus;
use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::runtime::RuntimeFlavor;
use tracing::instrument;

use crate::traits::CacheClient;
use crate::traits::CacheRouter;
use crate::traits::LaHelper;
use crate::traits::ReplyCodec;
use crate::traits::RouteHandle;
use crate::traits::RouteHandlePtr;
use crate::traits::RouteTraverser;
use crate::types::FetchReply;
use crate::types::LeaseSettings;
use crate::types::HOT_MISS_TOKEN;
use crate::types::NO_LEASE_TOKEN;

// Outcome of the lookaside read path.
pub(crate) enum CacheLookup<P> {
    /// The cache had a deserializable reply; the tree below is not consulted.
    Hit(P),
    /// No cached reply. `lease_token` authorizes the subsequent write when
    /// nonzero; zero means the write goes out without a lease.
    Miss { lease_token: u64 },
    /// Hot-miss retries exhausted without obtaining a token: another
    /// requester still holds the lease. The child reply must not be written
    /// back at all.
    Contended,
}

/// The lookaside caching route handle.
///
/// Sits as an interior node of a routing tree and stores replies in a
/// memcache-style cache under a key derived by the user-supplied
/// [`LaHelper`]. Replies found in the cache are returned directly, without
/// traversing further into the tree; on a miss the child's reply is stored
/// back with a best-effort detached write.
///
/// ```ignore
/// let route = LaRoute::builder()
///     .child(child)
///     .router(router)
///     .cache_client(client)
///     .codec(Arc::new(PostcardCodec))
///     .helper(helper)
///     .key_prefix("reg:")
///     .ttl(10)
///     .build()?;
/// ```
///
/// Instances are immutable after construction and shared across workers; the
/// request path takes no locks. Contention on one key is coordinated by the
/// cache itself through leases (see [`LeaseSettings`]) — without them,
/// concurrent misses on the same key are allowed to recompute and the last
/// writer wins.
#[fx_plus(
    parent,
    new(off),
    // Need explicit `default(off)` because the field defaults are for the builder type only.
    default(off),
    sync,
    builder(
        doc("Builder object of [`LaRoute`].", "", "See [`LaRoute::builder()`] method."),
        method_doc("Implement builder pattern for [`LaRoute`]."),
    )
)]
pub struct LaRoute<H, R, S, E>
where
    H: LaHelper,
    R: CacheRouter,
    S: ReplyCodec<H::Reply>,
    E: Display + Debug + Send + Sync + 'static,
{
    /// The downstream route consulted on a cache miss.
    #[fieldx(builder(required), get(clone))]
    child: RouteHandlePtr<H::Request, H::Reply, E>,

    /// The router this route was built against. Held to keep the shared
    /// router alive across reconfigurations; never consulted on the request
    /// path.
    #[fieldx(builder(required, into), get(clone))]
    router: Arc<R>,

    #[fieldx(builder(required, into), get(clone))]
    cache_client: Arc<R::Client>,

    #[fieldx(builder(required, into), get(clone))]
    codec: Arc<S>,

    #[fieldx(builder(required), get)]
    helper: H,

    /// Prefix prepended to every key built by the helper.
    #[fieldx(builder(into), default(String::new()), get)]
    key_prefix: String,

    /// How many distinct cache keys one logical request is spread over.
    #[fieldx(get(copy), default(1))]
    key_split_size: u32,

    // Pure function of `key_split_size` and `host_id`; computed once.
    #[fieldx(lazy, builder(off), get(clone))]
    key_suffix: String,

    /// TTL of cache writes, in seconds.
    #[fieldx(builder(required), get(copy))]
    ttl: i32,

    #[fieldx(get(copy), default)]
    lease_settings: LeaseSettings,

    /// Host identity feeding the key-split suffix. Defaults to the process
    /// host id; overridable for tests.
    #[fieldx(get(copy), default(crate::host::host_id()))]
    host_id: u64,
}

impl<H, R, S, E> LaRoute<H, R, S, E>
where
    H: LaHelper,
    R: CacheRouter,
    S: ReplyCodec<H::Reply>,
    E: Display + Debug + Send + Sync + 'static,
{
    fn build_key_suffix(&self) -> String {
        let split = self.key_split_size();
        if split <= 1 {
            return String::new();
        }
        format!(":ks{}", self.host_id() % u64::from(split))
    }

    // Final cache key: prefix || helper key || split suffix. The same key is
    // used for the read and for the write of one `route()` call.
    pub(crate) fn compose_key(&self, req: &H::Request) -> String {
        format!(
            "{}{}{}",
            self.key_prefix(),
            self.helper().build_key(req),
            self.key_suffix()
        )
    }

    async fn lookaside_get(&self, key: &str) -> CacheLookup<H::Reply> {
        if self.lease_settings().enable_leases {
            self.lookaside_lease_get(key).await
        }
        else {
            self.lookaside_plain_get(key).await
        }
    }

    // Plain GET. Whatever is not a deserializable hit counts as a miss and
    // falls through to the child.
    #[instrument(level = "trace", skip(self))]
    async fn lookaside_plain_get(&self, key: &str) -> CacheLookup<H::Reply> {
        match self.cache_client().get(key).await {
            Ok(reply) if reply.class.is_hit() => {
                if let Some(decoded) = self.decode_payload(key, &reply) {
                    return CacheLookup::Hit(decoded);
                }
                CacheLookup::Miss {
                    lease_token: NO_LEASE_TOKEN,
                }
            }
            Ok(_) => CacheLookup::Miss {
                lease_token: NO_LEASE_TOKEN,
            },
            Err(error) => {
                tracing::debug!(key, %error, "cache fetch failed");
                CacheLookup::Miss {
                    lease_token: NO_LEASE_TOKEN,
                }
            }
        }
    }

    // LEASE-GET with retry on the hot-miss token. Resolves to a cached reply,
    // or to a miss carrying the token that makes this caller the designated
    // writer.
    #[instrument(level = "trace", skip(self))]
    async fn lookaside_lease_get(&self, key: &str) -> CacheLookup<H::Reply> {
        let settings = self.lease_settings();
        let mut wait = Duration::from_millis(settings.initial_wait_ms.max(0) as u64);
        let max_wait = Duration::from_millis(settings.max_wait_ms.max(0) as u64);

        for attempt in 0..=settings.num_retries {
            if attempt > 0 {
                tokio::time::sleep(wait).await;
                wait = (wait * 2).min(max_wait);
            }

            let reply = match self.cache_client().lease_get(key).await {
                Ok(reply) => reply,
                Err(error) => {
                    // Read failure: proceed to the child and write without a
                    // lease.
                    tracing::debug!(key, %error, "cache lease fetch failed");
                    return CacheLookup::Miss {
                        lease_token: NO_LEASE_TOKEN,
                    };
                }
            };

            if reply.class.is_hit() {
                if let Some(decoded) = self.decode_payload(key, &reply) {
                    return CacheLookup::Hit(decoded);
                }
                return CacheLookup::Miss {
                    lease_token: NO_LEASE_TOKEN,
                };
            }
            if !reply.class.is_miss() {
                return CacheLookup::Miss {
                    lease_token: NO_LEASE_TOKEN,
                };
            }
            // A hot miss means another requester is already computing this
            // key: back off and retry instead of piling on. Any other token
            // makes this caller the designated writer.
            if reply.lease_token != HOT_MISS_TOKEN {
                return CacheLookup::Miss {
                    lease_token: reply.lease_token,
                };
            }
        }

        // The key stayed hot through every retry. Proceed to the child, but
        // leave the write to the lease holder.
        CacheLookup::Contended
    }

    fn decode_payload(&self, key: &str, reply: &FetchReply) -> Option<H::Reply> {
        let payload = reply.value.as_deref()?;
        match self.codec().decode(payload) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                tracing::warn!(key, %error, "cannot decode cached reply, treating as a miss");
                None
            }
        }
    }

    // Serialize the reply on the OS thread's main stack. The codec may
    // allocate large contiguous buffers, which must not happen on a small
    // cooperative-task stack; on a multi-thread runtime the call is moved out
    // of the task context, elsewhere it degrades to a synchronous call.
    fn encode_in_main_context(&self, reply: &H::Reply) -> Result<Vec<u8>, S::Error> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.codec().encode(reply))
            }
            _ => self.codec().encode(reply),
        }
    }

    // Dispatch a detached, best-effort store of the reply. `route()` returns
    // to its caller without awaiting the write; the task owns its key and
    // payload plus a strong handle to the route.
    fn dispatch_store(&self, key: String, reply: &H::Reply, lease_token: u64) {
        let value = match self.encode_in_main_context(reply) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%key, %error, "cannot encode reply, skipping cache write");
                return;
            }
        };

        let myself = self.myself().unwrap();
        tokio::spawn(async move {
            myself.store_value(key, value, lease_token).await;
        });
    }

    #[instrument(level = "trace", skip(self, value))]
    async fn store_value(&self, key: String, value: Vec<u8>, lease_token: u64) {
        let result = if self.lease_settings().enable_leases && lease_token != NO_LEASE_TOKEN {
            self.cache_client()
                .lease_set(&key, value, self.ttl(), lease_token)
                .await
        }
        else {
            self.cache_client().set(&key, value, self.ttl()).await
        };

        match result {
            Ok(reply) if !reply.stored => {
                // Lost the lease or raced an eviction. Best effort, drop it.
                tracing::debug!(%key, "cache write not stored");
            }
            Err(error) => {
                tracing::debug!(%key, %error, "cache write failed");
            }
            Ok(_) => (),
        }
    }
}

#[async_trait]
impl<H, R, S, E> RouteHandle for LaRoute<H, R, S, E>
where
    H: LaHelper,
    R: CacheRouter,
    S: ReplyCodec<H::Reply>,
    E: Display + Debug + Send + Sync + 'static,
{
    type Request = H::Request;
    type Reply = H::Reply;
    type Error = E;

    fn route_name(&self) -> String {
        format!(
            "lookaside-cache|name={}|ttl={}s|leases={}",
            self.helper().name(),
            self.ttl(),
            self.lease_settings().enable_leases
        )
    }

    async fn route(&self, req: Self::Request) -> Result<Self::Reply, Self::Error> {
        // Some((key, token)) exactly when the child reply should be written
        // back under that key.
        let mut store_plan = None;

        if self.helper().cache_candidate(&req) {
            let key = self.compose_key(&req);
            match self.lookaside_get(&key).await {
                CacheLookup::Hit(reply) => return Ok(reply),
                CacheLookup::Miss { lease_token } => store_plan = Some((key, lease_token)),
                CacheLookup::Contended => (),
            }
        }

        // A failing child propagates unchanged; its reply is never cached.
        let reply = self.child().route(req).await?;

        if let Some((key, lease_token)) = store_plan {
            self.dispatch_store(key, &reply, lease_token);
        }

        Ok(reply)
    }

    fn traverse(
        &self,
        req: &Self::Request,
        traverser: &mut dyn RouteTraverser<Self::Request, Self::Reply, Self::Error>,
    ) {
        // The lookaside node is invisible to diagnostic walks: visitors see
        // the underlying route.
        traverser.visit(&*self.child(), req);
    }
}

impl<H, R, S, E> Debug for LaRoute<H, R, S, E>
where
    H: LaHelper,
    R: CacheRouter,
    S: ReplyCodec<H::Reply>,
    E: Display + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaRoute")
            .field("helper", &self.helper().name())
            .field("key_prefix", self.key_prefix())
            .field("key_split_size", &self.key_split_size())
            .field("ttl", &self.ttl())
            .field("lease_settings", &self.lease_settings())
            .finish()
    }
}
