use async_trait::async_trait;
use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::types::FetchReply;
use crate::types::StoreReply;

/// A node of the request-routing tree.
///
/// Handles are composed into a tree by an external framework; each node either
/// produces a reply itself or delegates to the handles below it. A tree is
/// monomorphic in its request/reply/error types, which makes handles
/// object-safe and shareable as [`RouteHandlePtr`].
#[async_trait]
pub trait RouteHandle: Send + Sync + 'static {
    type Request: Send + Sync + 'static;
    type Reply: Send + Sync + 'static;
    type Error: Display + Debug + Send + Sync + 'static;

    /// Human-readable identification of the node for diagnostics.
    fn route_name(&self) -> String;

    /// Dispatch a request down the tree, producing its reply.
    async fn route(&self, req: Self::Request) -> Result<Self::Reply, Self::Error>;

    /// Apply `traverser` to the nodes this handle exposes to diagnostic
    /// walks. Leaf handles do nothing.
    fn traverse(
        &self,
        req: &Self::Request,
        traverser: &mut dyn RouteTraverser<Self::Request, Self::Reply, Self::Error>,
    );
}

/// Object-safe form of [`RouteHandle`].
pub type DynRouteHandle<Q, P, E> = dyn RouteHandle<Request = Q, Reply = P, Error = E>;

/// Shared handle to a routing tree node.
pub type RouteHandlePtr<Q, P, E> = Arc<DynRouteHandle<Q, P, E>>;

/// Visitor of diagnostic walks over a routing tree.
///
/// Any `FnMut(&DynRouteHandle<..>, &Q)` closure is a traverser.
pub trait RouteTraverser<Q, P, E> {
    fn visit(&mut self, route: &DynRouteHandle<Q, P, E>, req: &Q);
}

impl<Q, P, E, F> RouteTraverser<Q, P, E> for F
where
    F: FnMut(&DynRouteHandle<Q, P, E>, &Q),
{
    fn visit(&mut self, route: &DynRouteHandle<Q, P, E>, req: &Q) {
        self(route, req)
    }
}

/// External factory producing route handles from raw JSON route specs.
///
/// The lookaside factory uses it to build its child; what a spec looks like
/// and how it maps to a handle is entirely the framework's business.
pub trait RouteFactory<Q, P, E> {
    fn create(&mut self, spec: &serde_json::Value) -> Result<RouteHandlePtr<Q, P, E>, ConfigError>;
}

/// The user-supplied policy behind a lookaside route.
///
/// The helper decides which requests may be cached and under which logical
/// key. Use of [`LaRoute`](crate::route::LaRoute) starts with implementing
/// this trait for the request/reply pair of the routing tree it will live in.
///
/// Helpers are invoked concurrently from many workers without any locking by
/// the route; implementations must be stateless or internally synchronized,
/// and cheap — both queries run on every request.
pub trait LaHelper: Send + Sync + 'static {
    type Request: Send + Sync + 'static;
    type Reply: Send + Sync + 'static;

    /// Construct the helper from the raw `helper_config` object of the route
    /// configuration; `None` when the key is absent.
    fn from_config(config: Option<&serde_json::Value>) -> Result<Self, ConfigError>
    where
        Self: Sized;

    /// Diagnostic label, shown in the route name.
    fn name(&self) -> &str;

    /// May this request be served from, and stored into, the cache?
    fn cache_candidate(&self, req: &Self::Request) -> bool;

    /// The logical cache key of the request, without prefix or split suffix.
    fn build_key(&self, req: &Self::Request) -> String;
}

/// Wire-level client of the memcache-style cache.
///
/// Transport concerns (connection pooling, multiplexing, command encoding)
/// live behind this trait. Every operation resolves to a reply with a
/// result-class discriminant; transport failures surface as the associated
/// error and are contained by the route, never propagated to its caller.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    async fn get(&self, key: &str) -> Result<FetchReply, Self::Error>;

    /// Like [`get`](Self::get), but a miss mints a lease token — or returns
    /// the hot-miss sentinel when another requester already holds the lease.
    async fn lease_get(&self, key: &str) -> Result<FetchReply, Self::Error>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: i32) -> Result<StoreReply, Self::Error>;

    /// Conditional store: accepted only while `lease_token` still names the
    /// current lease of `key`.
    async fn lease_set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: i32,
        lease_token: u64,
    ) -> Result<StoreReply, Self::Error>;
}

/// Source of cache clients for one flavor.
///
/// Routers are shared between sibling routes through
/// [`RouterRegistry`](crate::router::RouterRegistry); each route keeps an
/// `Arc` to the router it was built against, so the router stays usable for
/// as long as any route needs it and is torn down when the last one goes.
pub trait CacheRouter: Send + Sync + 'static {
    type Client: CacheClient;
    type Error: Display + Debug + Send + Sync + 'static;

    fn create_client(&self) -> Result<Arc<Self::Client>, Self::Error>;
}

/// Binary codec of the replies stored in the cache.
///
/// Encoding may allocate large contiguous buffers, so the route always calls
/// it from main-stack context (see [`LaRoute`](crate::route::LaRoute)).
pub trait ReplyCodec<P>: Send + Sync + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    fn encode(&self, reply: &P) -> Result<Vec<u8>, Self::Error>;
    fn decode(&self, payload: &[u8]) -> Result<P, Self::Error>;
}
