//! A minimal tour of a lookaside route over the in-memory backend: a cold
//! miss reaches the child and populates the cache, the next request is served
//! from the cache, and a broken cache profile degrades to a pass-through.

use std::sync::Arc;
use std::time::Duration;

use la_route::prelude::*;
use la_route::test::memory::MemoryRouter;
use la_route::test::mock::EchoRouteFactory;
use la_route::test::types::EchoError;
use la_route::test::types::EchoHelper;
use la_route::test::types::EchoRequest;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let registry = RouterRegistry::new(|_flavor| Ok(MemoryRouter::new(10_000)));
    let mut routes = EchoRouteFactory::default();

    let spec = serde_json::json!({
        "child": "echo",
        "ttl": 30,
        "prefix": "hello:",
        "lease_settings": { "enable_leases": true },
    });
    let route = make_lookaside_route::<EchoHelper, MemoryRouter, PostcardCodec, EchoError>(
        &mut routes,
        &spec,
        &registry,
        Arc::new(PostcardCodec),
    )?;

    println!("route: {}", route.route_name());

    let first = route.route(EchoRequest::new("world")).await?;
    println!("first  (from the child): {}", first.body);

    // Give the detached write a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = route.route(EchoRequest::new("world")).await?;
    println!("second (from the cache): {}", second.body);
    println!("child calls: {}", routes.children[0].call_count());

    Ok(())
}
