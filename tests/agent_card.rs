//! Integration tests for the /.well-known/agent.json discovery endpoint.

mod common;

use common::start_test_server;
use superagent::a2a::AgentCard;
use superagent::config::ServerConfig;

#[tokio::test]
async fn discovery_endpoint_returns_json() {
    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base_url}/.well-known/agent.json"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("application/json"));
}

#[tokio::test]
async fn card_uses_camel_case_wire_keys() {
    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;

    let json: serde_json::Value = reqwest::Client::new()
        .get(format!("{base_url}/.well-known/agent.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["name"], "test-agent");
    assert!(json.get("serviceEndpointURL").is_some());
    assert!(json.get("supportedModalities").is_some());
    assert!(json.get("service_endpoint_url").is_none());
}

#[tokio::test]
async fn served_card_round_trips_through_the_model() {
    let (base_url, _handle) = start_test_server(ServerConfig::default()).await;

    let body = reqwest::Client::new()
        .get(format!("{base_url}/.well-known/agent.json"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let card = AgentCard::from_json(&body).unwrap();
    assert!(card.validate().is_ok());
    assert!(card.supports_skill("echo"));
    assert!(card.supports_skill("chunks"));
    assert!(!card.supports_skill("translate"));
}
