//! Store Service Tests - The Configuration Store Over the Broker
//!
//! The store is opened on a temporary repository, published through a
//! runtime, found through the directory service and exercised remotely.

mod common;

use common::*;
use futures::future::join_all;
use nameserv::{DirectoryRebinder, NameServerClient, NameServerConfig, RebinderConfig};
use objstore::{
    publish_store, CfgStoreClient, ReadResult, StoreError, StoreFlags, VersionedObjectStore,
};
use orb::OrbRuntime;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct StoreFixture {
    runtime: Arc<OrbRuntime>,
    store: Arc<VersionedObjectStore>,
    client: CfgStoreClient,
    _dir: TempDir,
}

impl StoreFixture {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VersionedObjectStore::new());
        assert!(store
            .initialize(dir.path(), "CfgSrv", StoreFlags::default())
            .unwrap());

        let runtime = start_runtime().await;
        let id = publish_store(&runtime, Arc::clone(&store)).await.unwrap();
        let client = CfgStoreClient::connect(&runtime, &id).await.unwrap();
        Self {
            runtime,
            store,
            client,
            _dir: dir,
        }
    }

    async fn stop(self) {
        self.runtime.shutdown().await.unwrap();
        self.store.close().unwrap();
    }
}

/// Test: Versions start at 1 and grow by one per write
#[tokio::test]
async fn test_version_sequence() {
    init_logging();
    let fixture = StoreFixture::start().await;
    let client = &fixture.client;

    client.add_object("/Cfg/Version", b"1", 0).await.unwrap();
    assert_eq!(client.key_exists_with_version("/Cfg/Version").await.unwrap(), Some(1));
    assert_eq!(client.add_or_update("/Cfg/Version", b"2", 0).await.unwrap(), (false, 2));
    assert_eq!(client.update_object("/Cfg/Version", b"3").await.unwrap(), 3);
    assert_eq!(client.add_or_update("/Cfg/Fresh", b"1", 64).await.unwrap(), (true, 1));

    assert_eq!(client.read_object("/Cfg/Version", 3, true).await.unwrap(), ReadResult::NoNewData);
    match client.read_object("/Cfg/Version", 1, true).await.unwrap() {
        ReadResult::NewData { version, payload } => {
            assert_eq!(version, 3);
            assert_eq!(&payload[..], b"3");
        }
        other => panic!("expected new data, got {:?}", other),
    }
    assert_eq!(client.read_object("/Cfg/None", 0, false).await.unwrap(), ReadResult::NotFound);

    fixture.stop().await;
}

/// Test: Scope queries and recursive scope deletion
#[tokio::test]
async fn test_scopes() {
    init_logging();
    let fixture = StoreFixture::start().await;
    let client = &fixture.client;

    for key in ["/A/B/one", "/A/B/two", "/A/B/C/three", "/A/D/four", "/A/top"] {
        client.add_object(key, key.as_bytes(), 0).await.unwrap();
    }
    assert_eq!(client.query_objects_in_scope("/A").await.unwrap(), vec!["top"]);
    assert_eq!(client.query_keys_in_scope("/A/B").await.unwrap(), vec!["/A/B/one", "/A/B/two"]);
    assert_eq!(client.query_sub_scopes("/A").await.unwrap(), vec!["B", "D"]);
    assert_eq!(client.all_objects_under("/a/b").await.unwrap().len(), 3);
    assert_eq!(
        client.find_name_under("THREE", "/A").await.unwrap(),
        vec!["/A/B/C/three"]
    );

    assert_eq!(client.delete_scope("/A/B").await.unwrap(), 3);
    assert!(client.query_objects_in_scope("/A/B").await.unwrap().is_empty());
    assert!(client.query_sub_scopes("/A/B").await.unwrap().is_empty());
    assert_eq!(client.query_all_keys().await.unwrap(), vec!["/A/D/four", "/A/top"]);
    assert_eq!(client.objects_in_store().await.unwrap(), 2);

    fixture.stop().await;
}

/// Test: Only one of several writers holding the same version wins
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_compare_and_swap_race() {
    init_logging();
    let fixture = StoreFixture::start().await;
    fixture.client.add_object("/Race/Counter", b"0", 0).await.unwrap();
    let id = fixture.client.object_id().clone();

    let writers = (0..8).map(|n| {
        let runtime = Arc::clone(&fixture.runtime);
        let id = id.clone();
        tokio::spawn(async move {
            let client = CfgStoreClient::connect(&runtime, &id).await.unwrap();
            client
                .compare_and_swap("/Race/Counter", 1, format!("{}", n).as_bytes())
                .await
        })
    });

    let mut winners = 0;
    for result in join_all(writers).await {
        match result.unwrap() {
            Ok(version) => {
                assert_eq!(version, 2);
                winners += 1;
            }
            Err(StoreError::VersionConflict { expected, actual, .. }) => {
                assert_eq!((expected, actual), (1, 2));
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);

    fixture.stop().await;
}

/// Test: Store errors come back as their own variants
#[tokio::test]
async fn test_remote_errors() {
    init_logging();
    let fixture = StoreFixture::start().await;
    let client = &fixture.client;

    assert!(matches!(client.add_object("/Bad/", b"", 0).await, Err(StoreError::BadKey(_))));
    assert!(matches!(client.update_object("/No/Such", b"").await, Err(StoreError::NotFound(_))));
    assert!(matches!(client.delete_object("/No/Such").await, Err(StoreError::NotFound(_))));
    assert!(!client.delete_object_if_exists("/No/Such").await.unwrap());

    client.add_object("/Leaf", b"", 0).await.unwrap();
    assert!(matches!(
        client.add_object("/Leaf/Child", b"", 0).await,
        Err(StoreError::PathConflict(_))
    ));

    fixture.store.close().unwrap();
    assert!(matches!(client.key_exists("/Leaf").await, Err(StoreError::NotReady)));
    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Flushed data survives a restart of the hosting side
#[tokio::test]
async fn test_persistence_across_restart() {
    init_logging();
    let dir = TempDir::new().unwrap();

    {
        let store = Arc::new(VersionedObjectStore::new());
        store.initialize(dir.path(), "Persist", StoreFlags::default()).unwrap();
        let runtime = start_runtime().await;
        let id = publish_store(&runtime, Arc::clone(&store)).await.unwrap();
        let client = CfgStoreClient::connect(&runtime, &id).await.unwrap();

        client.add_object("/Saved/Value", b"first", 0).await.unwrap();
        client.update_object("/Saved/Value", b"second").await.unwrap();
        client.flush().await.unwrap();
        assert!(client.backup().await.unwrap().ends_with("Persist.cfgstore.bak"));

        runtime.shutdown().await.unwrap();
        store.close().unwrap();
    }

    let store = Arc::new(VersionedObjectStore::new());
    assert!(!store.initialize(dir.path(), "Persist", StoreFlags::default()).unwrap());
    let runtime = start_runtime().await;
    let id = publish_store(&runtime, Arc::clone(&store)).await.unwrap();
    let client = CfgStoreClient::connect(&runtime, &id).await.unwrap();

    assert_eq!(
        client.read_object("/Saved/Value", 0, true).await.unwrap(),
        ReadResult::NewData {
            version: 2,
            payload: bytes::Bytes::from_static(b"second"),
        }
    );
    client.validate().await.unwrap();

    runtime.shutdown().await.unwrap();
    store.close().unwrap();
}

/// Test: A client finds the store through the directory, the way the
/// hosting process publishes it
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_found_through_directory() {
    init_logging();
    let ns = NameServerFixture::start(NameServerConfig::default()).await;
    let fixture = StoreFixture::start().await;

    let rebinder = DirectoryRebinder::remote(
        Arc::clone(&fixture.runtime),
        ns.endpoint.clone(),
        RebinderConfig {
            interval: Duration::from_millis(100),
            ..Default::default()
        },
    );
    let path = rebinder
        .register(
            "/Local/CfgSrv/%(h)",
            fixture.client.object_id().clone(),
            "Configuration store",
            Default::default(),
        )
        .unwrap();
    rebinder.start();
    assert!(wait_for(Duration::from_secs(10), || ns.server.binding_exists(&path).unwrap_or(false)).await);

    let other = start_runtime().await;
    let directory = NameServerClient::connect(&other, &ns.endpoint).await.unwrap();
    let id = directory.lookup(&path).await.unwrap().expect("store not published");
    assert_eq!(id.proxy_type(), objstore::CFG_STORE_PROXY_TYPE);

    let client = CfgStoreClient::connect(&other, &id).await.unwrap();
    client.add_object("/Via/Directory", b"found", 0).await.unwrap();
    assert!(fixture.client.key_exists("/Via/Directory").await.unwrap());

    rebinder.shutdown().await;
    assert!(matches!(directory.lookup(&path).await, Ok(None)));

    other.shutdown().await.unwrap();
    fixture.stop().await;
    ns.stop().await;
}
