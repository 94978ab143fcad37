//! Session lifecycle integration tests

mod common;

use common::*;
use std::time::Duration;
use voicebridge::domain::session::{CloseReason, SessionState};
use voicebridge::domain::shared::CallId;
use voicebridge::infrastructure::transport::memory;
use voicebridge::BridgeError;

#[tokio::test]
async fn test_settings_sent_before_any_audio() {
    let harness = HarnessBuilder::new().registry(register_sleeper).build();
    let (transport, caller) = memory::pair(8);
    caller.send_text(start_event("CA200")).await.unwrap();
    caller.send_text(media_event("CA200", &[1, 2, 3])).await.unwrap();

    let handle = harness.manager.on_inbound_connection(transport).await.unwrap();
    let (call_id, mut agent, settings) = harness.agents.next().await;

    assert_eq!(call_id, CallId::new("CA200"));
    assert_eq!(handle.call_id(), &call_id);
    assert_eq!(settings["type"], "Settings");
    assert_eq!(settings["audio"]["input"]["encoding"], "mulaw");
    assert_eq!(settings["audio"]["input"]["sample_rate"], 8000);
    assert_eq!(settings["agent"]["think"]["functions"][0]["name"], "sleep_echo");

    let audio = agent.recv_timeout(WAIT).await.expect("audio after settings");
    assert!(audio.is_binary());
}

#[tokio::test]
async fn test_duplicate_call_id_is_rejected() {
    let harness = HarnessBuilder::new().build();
    let (first, _caller, _agent) = open_call(&harness, "CA201").await;

    let (transport, mut second) = memory::pair(8);
    second.send_text(start_event("CA201")).await.unwrap();
    let err = harness
        .manager
        .on_inbound_connection(transport)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::DuplicateCallId(ref id) if id.as_str() == "CA201"));
    let envelope = parse(second.recv_timeout(WAIT).await.expect("error event"));
    assert_eq!(envelope["event"], "error");
    assert!(second.closed_within(WAIT).await);

    // The original session is untouched
    assert_eq!(first.state(), SessionState::Active);
    assert_eq!(harness.manager.active_count(), 1);
}

#[tokio::test]
async fn test_refused_agent_rejects_call() {
    let harness = HarnessBuilder::new().refuse_agent().build();
    let (transport, mut caller) = memory::pair(8);
    caller.send_text(start_event("CA202")).await.unwrap();

    let err = harness
        .manager
        .on_inbound_connection(transport)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::AgentConnect(_)));
    let envelope = parse(caller.recv_timeout(WAIT).await.expect("error event"));
    assert_eq!(envelope["event"], "error");
    assert_eq!(envelope["streamSid"], stream_sid("CA202"));
    assert!(caller.closed_within(WAIT).await);
    assert_eq!(harness.manager.active_count(), 0);
}

#[tokio::test]
async fn test_caller_closing_before_start_is_handshake_error() {
    let harness = HarnessBuilder::new().build();
    let (transport, mut caller) = memory::pair(8);
    caller.send_text(r#"{"event":"connected","protocol":"Call"}"#).await.unwrap();
    caller.hang_up();

    let err = harness
        .manager
        .on_inbound_connection(transport)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Handshake(_)));
    assert_eq!(harness.manager.active_count(), 0);
}

#[tokio::test]
async fn test_registry_tracks_sessions() {
    let harness = HarnessBuilder::new().build();
    let (b, _caller_b, _agent_b) = open_call(&harness, "CA204").await;
    let (a, caller_a, _agent_a) = open_call(&harness, "CA203").await;

    assert_eq!(harness.manager.active_count(), 2);
    assert_eq!(
        harness.manager.active_call_ids(),
        vec![CallId::new("CA203"), CallId::new("CA204")]
    );
    let found = harness.manager.lookup(&CallId::new("CA204")).expect("registered");
    assert_eq!(found.call_id(), b.call_id());

    caller_a.send_text(stop_event("CA203")).await.unwrap();
    let outcome = tokio::time::timeout(WAIT, a.wait()).await.unwrap();
    assert_eq!(outcome.reason, CloseReason::CallEnded);

    assert_eq!(harness.manager.active_call_ids(), vec![CallId::new("CA204")]);
    assert!(harness.manager.lookup(&CallId::new("CA203")).is_none());
}

#[tokio::test]
async fn test_terminate_closes_both_sides() {
    let harness = HarnessBuilder::new().build();
    let (handle, mut caller, mut agent) = open_call(&harness, "CA205").await;

    handle.terminate();
    let outcome = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();

    assert_eq!(outcome.reason, CloseReason::Terminated);
    assert_eq!(handle.state(), SessionState::Closed);
    assert!(caller.closed_within(WAIT).await);
    assert!(agent.closed_within(WAIT).await);
    assert_eq!(harness.manager.active_count(), 0);
}

#[tokio::test]
async fn test_shutdown_drains_all_sessions() {
    let harness = HarnessBuilder::new().build();
    let mut handles = Vec::new();
    let mut peers = Vec::new();
    for sid in ["CA206", "CA207", "CA208"] {
        let (handle, caller, agent) = open_call(&harness, sid).await;
        handles.push(handle);
        peers.push((caller, agent));
    }

    let forced = harness.manager.shutdown(Duration::from_secs(2)).await;

    assert_eq!(forced, 0);
    assert_eq!(harness.manager.active_count(), 0);
    for handle in &handles {
        assert_eq!(handle.state(), SessionState::Closed);
        assert_eq!(handle.wait().await.reason, CloseReason::Terminated);
    }
}

#[tokio::test]
async fn test_shutdown_with_no_sessions() {
    let harness = HarnessBuilder::new().build();
    assert_eq!(harness.manager.shutdown(Duration::from_millis(100)).await, 0);
}
