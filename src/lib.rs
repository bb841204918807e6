//! # la-route
//!
//! `la-route` implements a *lookaside* caching route: an interior node of a
//! request-routing tree that stores replies in a memcache-style cache under a
//! user-defined key. Replies found in the cache are returned directly,
//! without having to traverse further into the tree. Which replies are worth
//! caching — and under what key — is decided by a user-supplied helper, so
//! the node itself stays agnostic of the request shape.
//!
//! The crate is designed for asynchronous contexts on top of
//! [`tokio`](https://crates.io/crates/tokio).
//!
//! ## Vocabulary
//!
//! - **Helper**: the policy plug-in behind a route. Implements
//!   [`LaHelper`](crate::traits::LaHelper): candidate test, key builder,
//!   diagnostic name.
//! - **Lease**: token-based coordination primitive of the cache. On a miss
//!   the cache hands the first requester a token authorizing the subsequent
//!   write; everyone else sees the *hot-miss* sentinel and backs off instead
//!   of recomputing the same reply.
//! - **Key splitting**: mapping one logical key to several physical cache
//!   keys (a per-host suffix), smearing hot-key load across cache shards
//!   without cross-host coordination.
//!
//! ## Basic Principles
//!
//! `la-route` is not a cache, and not a cache client. It operates strictly as
//! a tree node: policy check, cache read, fall through to the child, detached
//! write-back. The cache transport lives behind the
//! [`CacheClient`](crate::traits::CacheClient) trait, the routing framework
//! behind [`RouteHandle`](crate::traits::RouteHandle), and reply
//! serialization behind [`ReplyCodec`](crate::traits::ReplyCodec) (the
//! bundled [`PostcardCodec`](crate::codec::PostcardCodec) covers any serde
//! type).
//!
//! Writes are best-effort: `route()` returns the child's reply without
//! awaiting the store, and a write that never lands is acceptable —
//! correctness never depends on any particular write being observed.
//!
//! ## Architecture
//!
//! The central part is the [`LaRoute`](crate::route::LaRoute) object, built
//! exclusively through its builder, usually by the configuration factory
//! [`make_lookaside_route`](crate::config::make_lookaside_route). The factory
//! parses the JSON route spec, obtains a shared cache router from the
//! [`RouterRegistry`](crate::router::RouterRegistry) (one router per flavor,
//! kept alive by the routes holding it), and wires the child produced by the
//! external route factory. If the router or its client cannot be created the
//! factory returns the bare child instead: the tree degrades to a
//! pass-through rather than failing to load.
//!
//! ## Caveats
//!
//! With leases disabled, concurrent misses on one key all reach the child
//! and all write back; the last writer wins at the cache. This is a
//! deliberate simplicity/latency trade-off. Reply serialization is always
//! performed in main-stack context (outside the cooperative task when the
//! runtime allows it), since codecs may allocate large contiguous buffers.

pub mod codec;
pub mod config;
pub mod host;
pub mod route;
pub mod router;
pub mod traits;
pub mod types;


pub use route::LaRoute;

pub mod prelude {
    pub use crate::codec::PostcardCodec;
    pub use crate::config::make_lookaside_route;
    pub use crate::config::ConfigError;
    pub use crate::config::LaRouteConfig;
    pub use crate::route::LaRoute;
    pub use crate::router::client_persistence_id;
    pub use crate::router::RouterRegistry;
    pub use crate::traits::*;
    pub use crate::types::*;
}
