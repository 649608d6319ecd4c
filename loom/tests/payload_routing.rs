//! Value/reference routing across the fabric, at and over the auto-promote
//! threshold.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use loom::codec;
use loom::{MessagePayload, ReferenceStore};

const THRESHOLD: usize = 10 * 1024;

/// **Scenario**: a tool_result of exactly 10240 bytes arrives as a VALUE
/// payload; 10241 bytes arrives as a REFERENCE whose resolution returns the
/// original bytes with a matching checksum.
#[tokio::test]
async fn auto_promote_boundary_over_the_bus() {
    let (_dir, fabric) = common::test_fabric();
    let mut sub = fabric.subscribe("results.*", Vec::new()).unwrap();

    let at_threshold = vec![7u8; THRESHOLD];
    fabric
        .publish("results.a", "worker", "tool_result", &at_threshold, HashMap::new())
        .await
        .unwrap();
    let msg = sub.receive(Duration::from_millis(200)).await.unwrap();
    assert!(matches!(msg.payload, MessagePayload::Value { .. }));
    assert_eq!(fabric.open_payload(&msg.payload).await.unwrap(), at_threshold);

    let over_threshold = vec![8u8; THRESHOLD + 1];
    fabric
        .publish("results.b", "worker", "tool_result", &over_threshold, HashMap::new())
        .await
        .unwrap();
    let msg = sub.receive(Duration::from_millis(200)).await.unwrap();
    let MessagePayload::Reference { ref_id } = &msg.payload else {
        panic!("expected a reference payload");
    };

    let resolved = fabric.references().resolve(ref_id).await.unwrap();
    assert_eq!(resolved, over_threshold);

    let stored = fabric
        .references()
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|r| &r.id == ref_id)
        .unwrap();
    assert_eq!(codec::checksum_hex(&resolved), stored.checksum);
}

/// **Scenario**: session_state always routes by reference regardless of size.
#[tokio::test]
async fn session_state_always_reference() {
    let (_dir, fabric) = common::test_fabric();
    let payload = fabric
        .make_payload("session_state", b"tiny", "application/json")
        .await
        .unwrap();
    assert!(payload.is_reference());
    assert_eq!(fabric.open_payload(&payload).await.unwrap(), b"tiny");
}

/// **Scenario**: round-trip through the queue preserves reference payloads.
#[tokio::test]
async fn queue_carries_references() {
    let (_dir, fabric) = common::test_fabric();
    let big = vec![3u8; THRESHOLD * 2];
    fabric.send_to("a", "b", "tool_result", &big).await.unwrap();

    let msg = fabric
        .receive_from_queue("b", None, Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    assert!(msg.payload.is_reference());
    assert_eq!(fabric.open_payload(&msg.payload).await.unwrap(), big);
}
