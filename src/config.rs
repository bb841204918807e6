use garde::Validate;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

use crate::route::LaRoute;
use crate::router::client_persistence_id;
use crate::router::RouterRegistry;
use crate::traits::CacheRouter;
use crate::traits::LaHelper;
use crate::traits::ReplyCodec;
use crate::traits::RouteFactory;
use crate::traits::RouteHandlePtr;
use crate::types::LeaseSettings;

/// A configuration failure that prevents route construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The route spec does not match the schema: missing key, wrong type.
    #[error("invalid lookaside route config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The route spec is well-formed but carries invalid values.
    #[error("invalid lookaside route config: {0}")]
    Invalid(#[from] garde::Report),

    /// The helper rejected its `helper_config` object.
    #[error("helper config rejected: {0}")]
    Helper(String),

    /// A child route spec could not be turned into a route handle.
    #[error("cannot create child route: {0}")]
    Child(String),

    /// Assembling the route object failed.
    #[error("cannot construct lookaside route: {0}")]
    Construction(String),
}

fn default_flavor() -> String {
    "web".to_string()
}

fn default_key_split_size() -> u32 {
    1
}

/// Configuration schema of a lookaside route.
///
/// ```json
/// {
///   "child": "PoolRoute|A",
///   "ttl": 10,
///   "prefix": "reg",
///   "flavor": "web",
///   "key_split_size": 3,
///   "helper_config": {},
///   "lease_settings": { "enable_leases": true }
/// }
/// ```
///
/// Unrecognized keys are ignored; wrong types and invalid values are
/// [`ConfigError`]s.
#[derive(Debug, Deserialize, Validate)]
pub struct LaRouteConfig {
    /// Spec of the downstream route, forwarded verbatim to the route factory.
    #[garde(skip)]
    pub child: Value,

    /// TTL of cache writes, seconds.
    #[garde(range(min = 0))]
    pub ttl: i32,

    /// Prefix prepended to every generated key.
    #[serde(default)]
    #[garde(skip)]
    pub prefix: String,

    /// Selector of the cache router profile.
    #[serde(default = "default_flavor")]
    #[garde(skip)]
    pub flavor: String,

    /// Number of distinct cache keys per logical request; 1 disables
    /// splitting.
    #[serde(default = "default_key_split_size")]
    #[garde(range(min = 1))]
    pub key_split_size: u32,

    /// Passed verbatim to the helper constructor.
    #[serde(default)]
    #[garde(skip)]
    pub helper_config: Option<Value>,

    #[serde(default)]
    #[garde(dive)]
    pub lease_settings: LeaseSettings,
}

impl LaRouteConfig {
    /// Parse and validate a raw JSON route spec.
    pub fn from_value(spec: &Value) -> Result<Self, ConfigError> {
        let config: LaRouteConfig = serde_json::from_value(spec.clone())?;
        config.validate()?;
        Ok(config)
    }
}

/// Create a lookaside route from its JSON spec.
///
/// The child route is produced by `routes`; the cache router is taken from
/// (or created in) `registry` under the persistence id of the configured
/// flavor, so routes sharing a flavor share one router.
///
/// When the router or its client cannot be created, the factory degrades
/// instead of failing: it logs the problem and returns the bare child, and
/// the routing tree loads as a pass-through.
pub fn make_lookaside_route<H, R, S, E>(
    routes: &mut dyn RouteFactory<H::Request, H::Reply, E>,
    spec: &Value,
    registry: &RouterRegistry<R>,
    codec: Arc<S>,
) -> Result<RouteHandlePtr<H::Request, H::Reply, E>, ConfigError>
where
    H: LaHelper,
    R: CacheRouter,
    S: ReplyCodec<H::Reply>,
    E: Display + Debug + Send + Sync + 'static,
{
    let config = LaRouteConfig::from_value(spec)?;

    let child = routes.create(&config.child)?;
    let helper = H::from_config(config.helper_config.as_ref())?;

    let persistence_id = client_persistence_id(&config.flavor);
    let router = match registry.router_for(&persistence_id, &config.flavor) {
        Ok(router) => router,
        Err(error) => {
            tracing::error!(
                flavor = %config.flavor, %error,
                "cannot create cache router, loading the bare child route"
            );
            return Ok(child);
        }
    };

    let client = match router.create_client() {
        Ok(client) => client,
        Err(error) => {
            tracing::error!(
                flavor = %config.flavor, %error,
                "cannot create cache client, loading the bare child route"
            );
            return Ok(child);
        }
    };

    let route = LaRoute::<H, R, S, E>::builder()
        .child(child)
        .router(router)
        .cache_client(client)
        .codec(codec)
        .helper(helper)
        .key_prefix(config.prefix)
        .key_split_size(config.key_split_size)
        .ttl(config.ttl)
        .lease_settings(config.lease_settings)
        .build()
        .map_err(|error| ConfigError::Construction(error.to_string()))?;

    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = LaRouteConfig::from_value(&json!({
            "child": "echo",
            "ttl": 10,
        }))
        .unwrap();

        assert_eq!(config.ttl, 10);
        assert_eq!(config.prefix, "");
        assert_eq!(config.flavor, "web");
        assert_eq!(config.key_split_size, 1);
        assert!(config.helper_config.is_none());
        assert_eq!(config.lease_settings, LeaseSettings::default());
    }

    #[test]
    fn child_is_required() {
        assert!(LaRouteConfig::from_value(&json!({ "ttl": 10 })).is_err());
    }

    #[test]
    fn ttl_is_required_and_typed() {
        assert!(LaRouteConfig::from_value(&json!({ "child": "echo" })).is_err());
        assert!(LaRouteConfig::from_value(&json!({ "child": "echo", "ttl": "ten" })).is_err());
        assert!(LaRouteConfig::from_value(&json!({ "child": "echo", "ttl": -1 })).is_err());
    }

    #[test]
    fn key_split_size_must_be_positive() {
        assert!(
            LaRouteConfig::from_value(&json!({ "child": "echo", "ttl": 10, "key_split_size": 0 }))
                .is_err()
        );
    }

    #[test]
    fn prefix_must_be_a_string() {
        assert!(LaRouteConfig::from_value(&json!({ "child": "echo", "ttl": 10, "prefix": 3 })).is_err());
    }

    #[test]
    fn lease_settings_are_validated() {
        let spec = json!({
            "child": "echo",
            "ttl": 10,
            "lease_settings": { "enable_leases": true, "initial_wait_ms": 50, "max_wait_ms": 8 },
        });
        assert!(LaRouteConfig::from_value(&spec).is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = LaRouteConfig::from_value(&json!({
            "child": "echo",
            "ttl": 10,
            "comment": "route of record",
        }))
        .unwrap();
        assert_eq!(config.ttl, 10);
    }

    #[test]
    fn lease_settings_partial_object_fills_defaults() {
        let config = LaRouteConfig::from_value(&json!({
            "child": "echo",
            "ttl": 10,
            "lease_settings": { "enable_leases": true },
        }))
        .unwrap();

        assert!(config.lease_settings.enable_leases);
        assert_eq!(config.lease_settings.initial_wait_ms, 2);
        assert_eq!(config.lease_settings.max_wait_ms, 500);
        assert_eq!(config.lease_settings.num_retries, 10);
    }
}
