//! End-to-end auth-challenge and attempt-cap scenarios.

mod common;

use std::time::Duration;

use mcp_stdio_proxy::config::{AuthSettings, Config, Mode};
use mcp_stdio_proxy::pipeline::Orchestrator;
use tokio::io::AsyncWriteExt;

use common::{FakeServer, PostReply, SharedWriter};

fn discovery_body() -> String {
    serde_json::json!({
        "authorization_endpoint": "https://auth.example.com/auth",
        "token_endpoint": "https://auth.example.com/token",
        "issuer": "https://auth.example.com",
    })
    .to_string()
}

fn http_config(host: &str, auth: AuthSettings) -> Config {
    Config::build(
        host,
        Mode::Http,
        "/sse".to_string(),
        "/mcp".to_string(),
        "test-client".to_string(),
        "test-secret".to_string(),
        auth,
    )
    .unwrap()
}

#[tokio::test]
async fn unauthorized_response_yields_a_synthesized_challenge_line() {
    let server = FakeServer::start("/sse", Vec::new()).await;
    server.set_discovery_body(discovery_body());
    server.queue_post_reply(PostReply::unauthorized(
        r#"Bearer realm="mcp", scope="openid profile""#,
    ));

    let auth = AuthSettings {
        listen_port: 18381,
        ..AuthSettings::default()
    };
    let orchestrator = Orchestrator::new(http_config(&server.uri(), auth)).unwrap();

    let (mut input_tx, input_rx) = tokio::io::duplex(4096);
    let output = SharedWriter::new();
    let run_handle = tokio::spawn(orchestrator.run(input_rx, output.clone()));

    input_tx.write_all(b"{\"id\":7,\"method\":\"x\"}\n").await.unwrap();
    common::wait_for(&output, Duration::from_secs(2), |s| !s.is_empty()).await;

    let line = output.contents();
    let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(value["id"], 7);
    assert_eq!(value["result"]["isError"], true);
    assert!(value["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("https://auth.example.com/auth"));
    assert!(line.ends_with('\n'));

    drop(input_tx);
    tokio::time::timeout(Duration::from_secs(1), run_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn attempt_cap_denies_within_cooldown_then_recovers() {
    let server = FakeServer::start("/sse", Vec::new()).await;
    server.set_discovery_body(discovery_body());
    for _ in 0..3 {
        server.queue_post_reply(PostReply::unauthorized(r#"Bearer realm="mcp""#));
    }

    let auth = AuthSettings {
        listen_port: 18382,
        max_attempts: 1,
        cooldown: Duration::from_millis(200),
        ..AuthSettings::default()
    };
    let orchestrator = Orchestrator::new(http_config(&server.uri(), auth)).unwrap();

    let (mut input_tx, input_rx) = tokio::io::duplex(4096);
    let output = SharedWriter::new();
    let run_handle = tokio::spawn(orchestrator.run(input_rx, output.clone()));

    input_tx.write_all(b"{\"id\":1,\"method\":\"x\"}\n").await.unwrap();
    common::wait_for(&output, Duration::from_secs(2), |s| s.lines().count() >= 1).await;

    // Sent immediately after: the admission check is still within the
    // cooldown window opened by the first attempt, so this one is denied
    // and produces no additional output.
    input_tx.write_all(b"{\"id\":2,\"method\":\"x\"}\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(output.contents().lines().count(), 1, "second attempt must be denied silently");

    // Past the cooldown window, admission is granted again.
    tokio::time::sleep(Duration::from_millis(200)).await;
    input_tx.write_all(b"{\"id\":3,\"method\":\"x\"}\n").await.unwrap();
    common::wait_for(&output, Duration::from_secs(2), |s| s.lines().count() >= 2).await;

    let lines: Vec<&str> = output.contents().lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(first["id"], 1);
    assert_eq!(second["id"], 3);

    drop(input_tx);
    tokio::time::timeout(Duration::from_secs(1), run_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
