//! Rebinder Tests - Publishing Through a Remote Directory
//!
//! A TestOrb object is published through a directory service running in a
//! separate runtime, then the directory is restarted, leases are left to
//! expire, and the publishing side is shut down.

mod common;

use common::*;
use nameserv::{
    DirectoryRebinder, NameServerClient, NameServerConfig, RebinderConfig, EXTRA_COUNT,
};
use orb::{expand_host_token, ObjectId, OrbRuntime};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn fast_config() -> RebinderConfig {
    RebinderConfig {
        interval: Duration::from_millis(100),
        renewal_period: Duration::from_millis(400),
        ping_interval: Duration::from_millis(300),
        max_errors: 5,
    }
}

fn extras(first: &str) -> [String; EXTRA_COUNT] {
    [first.to_string(), String::new(), String::new(), String::new()]
}

async fn lookup(runtime: &OrbRuntime, ns: &NameServerFixture, path: &str) -> Option<ObjectId> {
    let client = NameServerClient::connect(runtime, &ns.endpoint).await.unwrap();
    client.lookup(path).await.unwrap()
}

/// Test: A registered object shows up in the directory and can be called
/// through the id found there
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_and_lookup() {
    init_logging();

    let ns = NameServerFixture::start(NameServerConfig::default()).await;
    let app = TestOrbFixture::start().await;

    let rebinder = DirectoryRebinder::remote(Arc::clone(&app.runtime), ns.endpoint.clone(), fast_config());
    let path = rebinder
        .register("/Local/TestOrb/%(h)", app.object_id.clone(), "Loopback object", extras("v1"))
        .unwrap();
    assert_eq!(path, expand_host_token("/Local/TestOrb/%(h)"));
    rebinder.start();

    assert!(wait_for(WAIT, || ns.server.binding_exists(&path).unwrap_or(false)).await);
    assert!(wait_for(WAIT, || rebinder.is_bound(&path) == Some(true)).await);

    let found = lookup(&app.runtime, &ns, &path).await.expect("binding missing");
    assert_eq!(found, app.object_id);
    let client = TestOrbClient::connect(&app.runtime, &found).await.unwrap();
    assert_eq!(client.bump_it(99).await.unwrap(), 100);

    rebinder.update_extra(&path, 0, "v2").unwrap();
    assert!(
        wait_for(WAIT, || {
            ns.server
                .binding_info(&path)
                .ok()
                .flatten()
                .map_or(false, |b| b.extras[0] == "v2")
        })
        .await
    );

    rebinder.shutdown().await;
    assert!(!ns.server.binding_exists(&path).unwrap());

    app.runtime.shutdown().await.unwrap();
    ns.stop().await;
}

/// Test: Bindings are republished after the directory restarts and
/// loses its contents
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_republish_after_directory_restart() {
    init_logging();

    let ns = NameServerFixture::start(NameServerConfig::default()).await;
    let addr = ns.addr();
    let first_cookie = ns.server.cookie();
    let app = TestOrbFixture::start().await;

    let rebinder = DirectoryRebinder::remote(Arc::clone(&app.runtime), ns.endpoint.clone(), fast_config());
    let path = rebinder
        .register("/Local/Restart/Obj", app.object_id.clone(), "Survives restarts", Default::default())
        .unwrap();
    rebinder.start();
    assert!(wait_for(WAIT, || ns.server.binding_exists(&path).unwrap_or(false)).await);

    ns.stop().await;
    let ns = NameServerFixture::start_on(addr, NameServerConfig::default()).await;
    assert_ne!(ns.server.cookie(), first_cookie);
    assert!(!ns.server.binding_exists(&path).unwrap());

    assert!(
        wait_for(WAIT, || ns.server.binding_exists(&path).unwrap_or(false)).await,
        "binding was not republished"
    );
    assert_eq!(lookup(&app.runtime, &ns, &path).await, Some(app.object_id.clone()));

    rebinder.shutdown().await;
    app.runtime.shutdown().await.unwrap();
    ns.stop().await;
}

/// Test: Renewed bindings outlive their lease while an orphan expires
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leases() {
    init_logging();

    let ns = NameServerFixture::start(NameServerConfig {
        lease_duration: Some(Duration::from_millis(1500)),
        landlord_interval: Duration::from_millis(200),
    })
    .await;
    let app = TestOrbFixture::start().await;

    let rebinder = DirectoryRebinder::remote(Arc::clone(&app.runtime), ns.endpoint.clone(), fast_config());
    let kept = rebinder
        .register("/Leased/Kept", app.object_id.clone(), "Renewed", Default::default())
        .unwrap();
    rebinder.start();
    assert!(wait_for(WAIT, || ns.server.binding_exists(&kept).unwrap_or(false)).await);

    let client = NameServerClient::connect(&app.runtime, &ns.endpoint).await.unwrap();
    client
        .bind(
            "/Leased/Orphan",
            &nameserv::BindingInfo::new(app.object_id.clone(), "Nobody renews this"),
        )
        .await
        .unwrap();
    assert!(client.binding_exists("/Leased/Orphan").await.unwrap());

    assert!(wait_for(WAIT, || !ns.server.binding_exists("/Leased/Orphan").unwrap_or(true)).await);
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(ns.server.binding_exists(&kept).unwrap());

    rebinder.shutdown().await;
    app.runtime.shutdown().await.unwrap();
    ns.stop().await;
}

/// Test: A path that is already a scope in the directory is given up
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scope_in_the_way() {
    init_logging();

    let ns = NameServerFixture::start(NameServerConfig::default()).await;
    ns.server.create_scope_path("/Local/Taken").unwrap();
    let app = TestOrbFixture::start().await;

    let rebinder = DirectoryRebinder::remote(Arc::clone(&app.runtime), ns.endpoint.clone(), fast_config());
    rebinder
        .register("/Local/Taken", app.object_id.clone(), "Collides", Default::default())
        .unwrap();
    let ok = rebinder
        .register("/Local/Free", app.object_id.clone(), "Fine", Default::default())
        .unwrap();
    rebinder.start();

    assert!(wait_for(WAIT, || rebinder.paths() == vec![ok.clone()]).await);
    assert!(ns.server.scope_exists("/Local/Taken").unwrap());
    assert!(wait_for(WAIT, || ns.server.binding_exists(&ok).unwrap_or(false)).await);

    rebinder.shutdown().await;
    app.runtime.shutdown().await.unwrap();
    ns.stop().await;
}

/// Test: Registration works with no directory running, and the binding
/// appears once one starts
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_directory_starts_late() {
    init_logging();

    let probe = NameServerFixture::start(NameServerConfig::default()).await;
    let addr = probe.addr();
    let endpoint = probe.endpoint.clone();
    probe.stop().await;

    let app = TestOrbFixture::start().await;
    let rebinder = DirectoryRebinder::remote(Arc::clone(&app.runtime), endpoint, fast_config());
    let path = rebinder
        .register("/Late/Obj", app.object_id.clone(), "Waits", Default::default())
        .unwrap();
    rebinder.start();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(rebinder.is_bound(&path), Some(false));

    let ns = NameServerFixture::start_on(addr, NameServerConfig::default()).await;
    assert!(wait_for(WAIT, || ns.server.binding_exists(&path).unwrap_or(false)).await);

    rebinder.shutdown().await;
    app.runtime.shutdown().await.unwrap();
    ns.stop().await;
}
