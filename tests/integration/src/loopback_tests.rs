//! Loopback Tests - Client and Server in One Process
//!
//! These tests drive the TestOrb object through a real TCP connection:
//! - Repeated calls on one connection
//! - Parameter passing of every basic type, including in/out values
//! - Outputs that are only sent when the server has something new
//! - Server-raised errors and their propagation
//! - Dispatch through a derived interface to its parent
//! - Call deadlines

mod common;

use common::*;
use futures::future::join_all;
use orb::{orb_code, ClientProxy, OrbError, ORB_FACILITY};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Test: Bump a counter through 2048 sequential calls
#[tokio::test]
async fn test_bump_it() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await;

    let mut value = 0u32;
    while value < 2048 {
        let next = client.bump_it(value).await.unwrap();
        assert_eq!(next, value + 1, "bump did not bump");
        value = next;
    }
    assert_eq!(fixture.server.calls(), 2048);

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Every basic parameter type in both directions
#[tokio::test]
async fn test_param_passing() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await;

    let outputs = client
        .param_test(10, 3.11, "Test string in", "Test string in", false)
        .await
        .unwrap()
        .expect("server rejected the inputs");
    assert_eq!(
        outputs,
        ParamOutputs {
            card: 11,
            float: 3.12,
            text_out: "Test string out".into(),
            text_inout: "Test string out".into(),
            flag: true,
        }
    );

    let rejected = client
        .param_test(10, 3.11, "Wrong string", "Test string in", false)
        .await
        .unwrap();
    assert!(rejected.unwrap_err().contains("text"));

    let values: Vec<String> = (1..=4).map(|i| format!("This is a {}", i)).collect();
    let updated = client.vector_param_test(&values).await.unwrap().unwrap();
    assert_eq!(updated[0], "This is a test 1");
    assert_eq!(updated[3], "This is a test 4");
    assert!(client.vector_param_test(&values[..2]).await.unwrap().is_none());

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Poll data is only returned when it changed
#[tokio::test]
async fn test_poll_data() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await;

    let (serial, area) = client.poll_data(0).await.unwrap();
    assert_eq!(area, Some(Area::new(1, 2, 3, 4)));

    let (same, area) = client.poll_data(serial).await.unwrap();
    assert_eq!(same, serial);
    assert!(area.is_none(), "unchanged data was streamed back");

    client.set_data(&Area::new(10, 120, 28, 277)).await.unwrap();
    let (newer, area) = client.poll_data(serial).await.unwrap();
    assert_ne!(newer, serial);
    assert_eq!(area, Some(Area::new(10, 120, 28, 277)));

    let (_, area) = client.poll_data(newer).await.unwrap();
    assert!(area.is_none());

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Large buffers come back with every byte flipped
#[tokio::test]
async fn test_bulk_transfer() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await;

    for size in [0usize, 1, 255, 64 * 1024, 1024 * 1024] {
        let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let flipped = client.bulk_test(&data).await.unwrap();
        assert_eq!(flipped.len(), size);
        assert!(flipped
            .iter()
            .enumerate()
            .all(|(i, b)| *b == (i as u8) ^ 0xFF));
    }

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Server errors arrive with the same facility and code every time,
/// without disturbing the connection
#[tokio::test]
async fn test_server_errors() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await;

    for index in 0..512u32 {
        let result = if index & 1 == 1 {
            client.except_test().await
        } else {
            client.except_test_with_arg(1).await
        };
        let err = result.expect_err("expected a server error");
        let code = if index & 1 == 1 {
            test_code::NOT_WHEN_RUNNING
        } else {
            test_code::BAD_SEQ_REPLY
        };
        assert!(is_remote(&err, TEST_FACILITY, code), "call {} gave {}", index, err);
    }

    assert_eq!(client.bump_it(41).await.unwrap(), 42);

    let stats = fixture.runtime.stats();
    assert_eq!(stats.connections_accepted, 1);
    assert_eq!(stats.connections_active, 1);
    assert!(stats.requests_failed >= 512);

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Base methods are reached through the derived interface, and
/// methods nobody implements are reported
#[tokio::test]
async fn test_interface_chain() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await;

    assert_eq!(client.describe().await.unwrap(), "TestOrb loopback");

    let err = client.missing_method().await.unwrap_err();
    assert!(is_remote(&err, ORB_FACILITY, orb_code::UNKNOWN_METHOD));

    // The object is keyed by its most derived interface
    let connection = Arc::clone(client.proxy().client());
    let wrong = ClientProxy::new(
        fixture.object_id.clone(),
        &TEST_BASE_INTERFACE_ID,
        connection,
    );
    assert!(matches!(wrong, Err(OrbError::WrongInterface { .. })));

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: A slow call times out on the client, and the connection keeps
/// working once the late reply has been discarded
#[tokio::test]
async fn test_call_timeout() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await.with_timeout(Duration::from_millis(100));

    let start = Instant::now();
    let err = client.slow_call(500).await.unwrap_err();
    assert!(matches!(err, OrbError::Timeout));
    assert!(start.elapsed() < Duration::from_millis(450));

    let client = client.with_timeout(Duration::from_secs(5));
    assert_eq!(client.bump_it(7).await.unwrap(), 8);
    assert_eq!(client.slow_call(10).await.unwrap(), 10);

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Objects that were deregistered are no longer reachable
#[tokio::test]
async fn test_deregistered_object() {
    init_logging();

    let fixture = TestOrbFixture::start().await;
    let client = fixture.client().await;
    assert_eq!(client.bump_it(1).await.unwrap(), 2);

    fixture
        .runtime
        .deregister_object(fixture.object_id.key())
        .await
        .unwrap();
    let err = client.bump_it(1).await.unwrap_err();
    assert!(is_remote(&err, ORB_FACILITY, orb_code::OBJECT_NOT_FOUND));

    fixture.runtime.shutdown().await.unwrap();
}

/// Test: Many clients bumping concurrently, each on its own connection
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients() {
    init_logging();

    const NUM_CLIENTS: usize = 16;
    const CALLS_PER_CLIENT: u32 = 100;

    let fixture = Arc::new(TestOrbFixture::start().await);
    let stats = Arc::new(ConcurrentStats::new());

    let tasks = (0..NUM_CLIENTS).map(|_| {
        let fixture = Arc::clone(&fixture);
        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            let client = fixture.client().await;
            for value in 0..CALLS_PER_CLIENT {
                let start = Instant::now();
                match client.bump_it(value).await {
                    Ok(next) if next == value + 1 => stats.record_success(start.elapsed()),
                    _ => stats.record_failure(),
                }
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    println!(
        "Concurrent bumps: {} ok, {} failed, avg latency {:?}",
        stats.success_count(),
        stats.failure_count(),
        stats.avg_latency()
    );
    assert_eq!(stats.success_count(), NUM_CLIENTS as u64 * CALLS_PER_CLIENT as u64);
    assert_eq!(fixture.runtime.stats().connections_accepted, NUM_CLIENTS as u64);

    fixture.runtime.shutdown().await.unwrap();
}
