use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use crate::traits::CacheRouter;

/// Prefix of the persistence ids under which lookaside cache routers are
/// registered.
pub const PERSISTENCE_ID_PREFIX: &str = "CarbonLookasideClient:";

/// Persistence id of the shared cache router for `flavor`.
pub fn client_persistence_id(flavor: &str) -> String {
    format!("{PERSISTENCE_ID_PREFIX}{flavor}")
}

type MakeRouter<R> = Box<dyn Fn(&str) -> Result<Arc<R>, <R as CacheRouter>::Error> + Send + Sync>;

/// Registry of cache routers, keyed by persistence id.
///
/// Lookaside routes sharing a flavor share one underlying router. The
/// registry only keeps `Weak` references: a router lives exactly as long as
/// at least one route holds the `Arc` returned from
/// [`router_for`](Self::router_for) — it survives reconfigurations that keep
/// any such route alive, and is rebuilt on the first request after the last
/// holder dropped it.
pub struct RouterRegistry<R>
where
    R: CacheRouter,
{
    make:    MakeRouter<R>,
    routers: Mutex<HashMap<String, Weak<R>>>,
}

impl<R> RouterRegistry<R>
where
    R: CacheRouter,
{
    /// `make` receives the flavor and produces a fresh router for it.
    pub fn new<F>(make: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<R>, R::Error> + Send + Sync + 'static,
    {
        Self {
            make:    Box::new(make),
            routers: Mutex::new(HashMap::new()),
        }
    }

    /// The live router registered under `persistence_id`, creating one for
    /// `flavor` if none exists or the previous one was torn down.
    pub fn router_for(&self, persistence_id: &str, flavor: &str) -> Result<Arc<R>, R::Error> {
        let mut routers = self.routers.lock().expect("router registry lock poisoned");

        if let Some(router) = routers.get(persistence_id).and_then(Weak::upgrade) {
            return Ok(router);
        }

        let router = (self.make)(flavor)?;
        tracing::debug!(persistence_id, flavor, "created lookaside cache router");
        routers.insert(persistence_id.to_string(), Arc::downgrade(&router));
        Ok(router)
    }
}
