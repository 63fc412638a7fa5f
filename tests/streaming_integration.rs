//! Streaming (SSE) invocation tests over a real HTTP connection, covering
//! the full parse path from wire frames to merged results.

mod common;

use common::start_test_server;
use serde_json::{json, Map};
use superagent::a2a::{A2aClient, InvocationEvent};
use superagent::config::{A2aConfig, ServerConfig};

#[tokio::test]
async fn streaming_invocation_merges_partial_results() {
    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;
    let client = A2aClient::new(&base_url, A2aConfig::default()).unwrap();

    let merged = client
        .invoke_skill_streaming("chunks", &Map::new())
        .await
        .unwrap();

    // Both partial completions land; the later one's status wins.
    assert_eq!(merged.get("part"), Some(&json!(2)));
    assert_eq!(merged.get("status"), Some(&json!("completed")));
}

#[tokio::test]
async fn any_error_event_fails_the_whole_invocation() {
    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;
    let client = A2aClient::new(&base_url, A2aConfig::default()).unwrap();

    let err = client
        .invoke_skill_streaming("boom", &Map::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stream blew up"));
}

#[tokio::test]
async fn raw_event_stream_yields_typed_events_in_order() {
    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;
    let client = A2aClient::new(&base_url, A2aConfig::default()).unwrap();

    let mut stream = client.open_stream("chunks", &Map::new()).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(
        first,
        InvocationEvent::Start {
            status: "running".to_string()
        }
    );

    let second = stream.next().await.unwrap().unwrap();
    assert!(matches!(second, InvocationEvent::Complete { .. }));

    let third = stream.next().await.unwrap().unwrap();
    match third {
        InvocationEvent::Complete { status, result } => {
            assert_eq!(status.as_deref(), Some("completed"));
            assert_eq!(result, Some(json!({ "part": 2 })));
        }
        other => panic!("expected a completion, got {other:?}"),
    }

    assert!(stream.next().await.is_none(), "stream should end");
}

#[tokio::test]
async fn event_stream_adapts_to_a_futures_stream() {
    use futures::StreamExt;

    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;
    let client = A2aClient::new(&base_url, A2aConfig::default()).unwrap();

    let stream = client.open_stream("chunks", &Map::new()).await.unwrap();
    let events: Vec<_> = stream
        .into_stream()
        .filter_map(|event| async { event.ok() })
        .collect()
        .await;

    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], InvocationEvent::Start { .. }));
    assert!(matches!(events[2], InvocationEvent::Complete { .. }));
}

#[tokio::test]
async fn streaming_unknown_skill_is_rejected_up_front() {
    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;
    let client = A2aClient::new(&base_url, A2aConfig::default()).unwrap();

    let err = client
        .invoke_skill_streaming("nope", &Map::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert!(err.to_string().contains("echo"));
}
